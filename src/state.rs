use std::sync::Arc;

use crate::config::Config;
use crate::outbox::Processor;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub processor: Arc<Processor>,
}
