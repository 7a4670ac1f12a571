use std::sync::Arc;

use crate::config::AppConfig;
use crate::devices::PrinterTransport;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    /// Shared connection pool for printers and the remote mirror.
    pub client: reqwest::Client,
    pub transport: Arc<dyn PrinterTransport>,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        client: reqwest::Client,
        transport: Arc<dyn PrinterTransport>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            client,
            transport,
        }
    }
}
