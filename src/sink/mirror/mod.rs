mod sheets;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{AppConfig, MirrorType};
use crate::error::MirrorError;

pub use sheets::{GoogleSheetsMirror, SheetCredentials};

/// Secondary, best-effort copy of the job log (a spreadsheet, etc.)
#[async_trait]
pub trait RemoteMirror: Send + Sync {
    /// Append `rows` after the last populated row.
    async fn append_rows(&self, rows: Vec<Vec<Value>>) -> Result<(), MirrorError>;
}

/// Factory function to create a mirror based on config
pub fn create_mirror(config: &AppConfig, client: reqwest::Client) -> Option<Arc<dyn RemoteMirror>> {
    match config.mirror {
        MirrorType::None => None,
        MirrorType::GoogleSheets => Some(Arc::new(GoogleSheetsMirror::new(
            client,
            config.credentials_path.clone(),
            config.sheet_name.clone(),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_none_disables_mirroring() {
        let config = AppConfig {
            mirror: MirrorType::None,
            ..Default::default()
        };
        assert!(create_mirror(&config, reqwest::Client::new()).is_none());
    }

    #[test]
    fn google_sheets_is_the_default_mirror() {
        let config = AppConfig::default();
        assert!(create_mirror(&config, reqwest::Client::new()).is_some());
    }
}
