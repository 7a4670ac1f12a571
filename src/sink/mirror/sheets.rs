use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use super::RemoteMirror;
use crate::error::MirrorError;

const SHEETS_API: &str = "https://sheets.googleapis.com";

/// Pre-provisioned credential handle for the spreadsheet.
#[derive(Debug, Clone, Deserialize)]
pub struct SheetCredentials {
    pub spreadsheet_id: String,
    pub access_token: String,
}

/// Appends rows to one tab of a Google spreadsheet through the Sheets v4
/// `values:append` endpoint.
pub struct GoogleSheetsMirror {
    client: reqwest::Client,
    api_base: String,
    credentials_path: PathBuf,
    credentials: OnceCell<SheetCredentials>,
    sheet_name: String,
}

impl GoogleSheetsMirror {
    pub fn new(client: reqwest::Client, credentials_path: PathBuf, sheet_name: String) -> Self {
        Self {
            client,
            api_base: SHEETS_API.to_string(),
            credentials_path,
            credentials: OnceCell::new(),
            sheet_name,
        }
    }

    async fn credentials(&self) -> Result<&SheetCredentials, MirrorError> {
        self.credentials
            .get_or_try_init(|| async {
                let path = self.credentials_path.display().to_string();
                let content = tokio::fs::read_to_string(&self.credentials_path)
                    .await
                    .map_err(|e| MirrorError::Credentials {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                serde_json::from_str(&content).map_err(|e| MirrorError::Credentials {
                    path,
                    message: e.to_string(),
                })
            })
            .await
    }

    fn append_url(&self, spreadsheet_id: &str) -> Result<reqwest::Url, MirrorError> {
        let mut url = reqwest::Url::parse(&self.api_base)
            .map_err(|e| MirrorError::InvalidUrl(format!("{}: {}", self.api_base, e)))?;
        let range = format!("{}:append", a1_range(&self.sheet_name));

        url.path_segments_mut()
            .map_err(|_| MirrorError::InvalidUrl(self.api_base.clone()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", spreadsheet_id, "values", range.as_str()]);

        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        Ok(url)
    }
}

/// A1 range anchored at the top of `sheet`. The tab name is always quoted,
/// with embedded quotes doubled, so names with spaces or punctuation parse.
fn a1_range(sheet: &str) -> String {
    format!("'{}'!A1", sheet.replace('\'', "''"))
}

#[async_trait]
impl RemoteMirror for GoogleSheetsMirror {
    async fn append_rows(&self, rows: Vec<Vec<Value>>) -> Result<(), MirrorError> {
        let credentials = self.credentials().await?;
        let url = self.append_url(&credentials.spreadsheet_id)?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&credentials.access_token)
            .json(&json!({ "values": rows }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(url: &reqwest::Url) -> String {
        url.as_str().replace("%20", " ").replace("%27", "'")
    }

    #[test]
    fn builds_append_url_for_tab() {
        let mirror = GoogleSheetsMirror::new(
            reqwest::Client::new(),
            PathBuf::from("/dev/null"),
            "Print Jobs".to_string(),
        );
        let url = mirror.append_url("sheet-123").unwrap();
        assert_eq!(
            decoded(&url),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-123/values/'Print Jobs'!A1:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS"
        );
    }

    #[test]
    fn quotes_tab_names() {
        assert_eq!(a1_range("Sheet1"), "'Sheet1'!A1");
        assert_eq!(
            a1_range("Makerspace 3D Printer Stats"),
            "'Makerspace 3D Printer Stats'!A1"
        );
        assert_eq!(a1_range("Bob's Jobs"), "'Bob''s Jobs'!A1");
    }

    #[test]
    fn cells_are_written_verbatim() {
        let mirror = GoogleSheetsMirror::new(
            reqwest::Client::new(),
            PathBuf::from("/dev/null"),
            "Sheet1".to_string(),
        );
        let url = mirror.append_url("id").unwrap();
        let input: Vec<_> = url
            .query_pairs()
            .filter(|(key, _)| key == "valueInputOption")
            .map(|(_, value)| value.into_owned())
            .collect();
        assert_eq!(input, vec!["RAW"]);
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_request() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = GoogleSheetsMirror::new(
            reqwest::Client::new(),
            dir.path().join("credentials.json"),
            "Sheet1".to_string(),
        );
        let err = mirror.append_rows(vec![vec![json!("a")]]).await.unwrap_err();
        assert!(matches!(err, MirrorError::Credentials { .. }));
    }

    #[tokio::test]
    async fn malformed_credentials_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"type": "service_account"}"#).unwrap();

        let mirror = GoogleSheetsMirror::new(reqwest::Client::new(), path, "Sheet1".to_string());
        let err = mirror.append_rows(vec![vec![json!("a")]]).await.unwrap_err();
        assert!(matches!(err, MirrorError::Credentials { .. }));
    }
}
