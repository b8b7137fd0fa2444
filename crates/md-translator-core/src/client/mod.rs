mod http;
mod traits;

pub use http::HttpJobClient;
pub use traits::{ClientInfo, DeltaSink, JobClient, JobKind, JobRequest};

use crate::config::ClientConfig;
use std::sync::Arc;

/// Create a job client from configuration.
pub fn create_client(config: &ClientConfig) -> Arc<dyn JobClient> {
    Arc::new(HttpJobClient::new(config.clone()))
}
