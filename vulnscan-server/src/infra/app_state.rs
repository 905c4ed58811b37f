use std::{fmt, sync::Arc};

use vulnscan_config::Config;
use vulnscan_core::{Dispatcher, ScanStore};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<Config>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, config: Arc<Config>) -> Self {
        Self { dispatcher, config }
    }

    pub fn store(&self) -> &Arc<dyn ScanStore> {
        self.dispatcher.store()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
