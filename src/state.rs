use crate::config::GatewayConfig;
use crate::services::bucket::Bucket;
use std::sync::Arc;

/// Shared, read-only state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub bucket: Arc<dyn Bucket>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(bucket: Arc<dyn Bucket>, config: GatewayConfig) -> Self {
        Self {
            bucket,
            config: Arc::new(config),
        }
    }
}
