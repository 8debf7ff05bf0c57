use std::sync::Arc;

use crate::config::Config;
use crate::engine::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, config: Arc<Config>) -> Self {
        AppState { engine, config }
    }
}
