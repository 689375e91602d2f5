use std::sync::Arc;

use scoring::ProjectLifecycle;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<ProjectLifecycle>,
}

impl AppState {
    pub fn new(lifecycle: ProjectLifecycle) -> Self {
        Self {
            lifecycle: Arc::new(lifecycle),
        }
    }
}
