use std::sync::Arc;

use application::PresenceRegistry;

#[derive(Clone)]
pub struct AppState {
    pub presence: Arc<dyn PresenceRegistry>,
}

impl AppState {
    pub fn new(presence: Arc<dyn PresenceRegistry>) -> Self {
        Self { presence }
    }
}
