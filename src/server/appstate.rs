use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::core::Core;

/// Cheaply cloneable handle axum hands to every route; the single
/// `Mutex<Core>` is the one logical writer the whole gateway shares
/// (spec §5), mirroring the teacher's `Arc<Mutex<Resources>>`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub core: Arc<Mutex<Core>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let core = Core::new(config.tuning);
        Self {
            config: Arc::new(config),
            core: Arc::new(Mutex::new(core)),
        }
    }
}
