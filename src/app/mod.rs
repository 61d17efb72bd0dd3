//! HTTP surface served by `trialdigest-app`.

pub mod error;
pub mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use crate::completion::{ClientSettings, LazyCompletion};
use crate::config::AppConfig;
use crate::path_guard::AllowList;

pub use routes::router;

#[derive(Clone)]
pub struct AppState {
    pub base_path: PathBuf,
    pub guard: Arc<AllowList>,
    pub sections: Arc<Vec<String>>,
    pub completion: LazyCompletion,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_path: config.base_path.clone(),
            guard: Arc::new(config.allow_list()),
            sections: Arc::new(config.sections.clone()),
            completion: LazyCompletion::new(ClientSettings::from(config)),
        }
    }

    pub fn with_completion(mut self, completion: LazyCompletion) -> Self {
        self.completion = completion;
        self
    }
}
