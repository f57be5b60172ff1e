use std::sync::Arc;

use crate::orchestrator::Orchestrator;

pub mod hook;
pub mod stream;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}
