use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(Self::Owner),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

/// A participant bound to exactly one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Member {
    pub member_id: Uuid,
    pub project_id: Uuid,
    /// Identity issued by the identity provider.
    pub external_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub wallet_address: Option<String>,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    /// Whether a git author string refers to this member. E-mail authors match
    /// on their local part.
    pub fn matches_author(&self, author: &str) -> bool {
        let author = author.trim().to_lowercase();
        let local = author.split('@').next().unwrap_or_default();
        let identity = self.external_id.to_lowercase();
        identity == author || identity == local
    }
}

/// Caller identity as asserted by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    pub external_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl Identity {
    pub fn new(external_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            display_name: display_name.into(),
            avatar_url: None,
        }
    }

    /// The member of `members` this identity belongs to.
    pub fn resolve<'a>(&self, members: &'a [Member]) -> Option<&'a Member> {
        members
            .iter()
            .find(|m| m.external_id.eq_ignore_ascii_case(&self.external_id))
    }
}

const ADDRESS_LEN: usize = 58;
const PUBLIC_KEY_LEN: usize = 32;
const CHECKSUM_LEN: usize = 4;

/// Validates an Algorand account address: base32 (no padding) over a 32-byte
/// public key followed by the last 4 bytes of its SHA-512/256 digest.
pub fn validate_wallet_address(address: &str) -> Result<(), String> {
    if address.len() != ADDRESS_LEN {
        return Err(format!(
            "wallet address must be {} characters, got {}",
            ADDRESS_LEN,
            address.len()
        ));
    }

    let bytes = decode_base32(address)
        .ok_or_else(|| "wallet address is not valid base32".to_string())?;
    if bytes.len() != PUBLIC_KEY_LEN + CHECKSUM_LEN {
        return Err("wallet address has the wrong decoded length".to_string());
    }

    let (public_key, checksum) = bytes.split_at(PUBLIC_KEY_LEN);
    let digest = Sha512_256::digest(public_key);
    if &digest[digest.len() - CHECKSUM_LEN..] != checksum {
        return Err("wallet address checksum mismatch".to_string());
    }

    Ok(())
}

fn decode_base32(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for c in input.bytes() {
        let value = match c {
            b'A'..=b'Z' => c - b'A',
            b'2'..=b'7' => c - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | u32::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    // trailing bits are padding and must be zero
    if buffer != 0 {
        return None;
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_ADDRESS: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAY5HFKQ";

    fn member(external_id: &str) -> Member {
        Member {
            member_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            display_name: external_id.to_string(),
            avatar_url: None,
            wallet_address: None,
            role: MemberRole::Member,
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn test_zero_address_is_valid() {
        assert!(validate_wallet_address(ZERO_ADDRESS).is_ok());
    }

    #[test]
    fn test_checksum_mismatch_rejected() {
        let tampered = format!("{}A", &ZERO_ADDRESS[..ADDRESS_LEN - 1]);
        assert!(validate_wallet_address(&tampered).is_err());
    }

    #[test]
    fn test_wrong_length_and_alphabet_rejected() {
        assert!(validate_wallet_address("ABC").is_err());
        let lowercase = ZERO_ADDRESS.to_lowercase();
        assert!(validate_wallet_address(&lowercase).is_err());
    }

    #[test]
    fn test_author_matching() {
        let alice = member("Alice");
        assert!(alice.matches_author("alice"));
        assert!(alice.matches_author("alice@example.com"));
        assert!(!alice.matches_author("bob@example.com"));
    }
}
