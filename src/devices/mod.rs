mod http;
pub mod material;
mod retry;
mod simulated;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, warn};

use crate::error::DeviceError;

pub use http::HttpTransport;
pub use material::UNKNOWN_MATERIAL;
pub use retry::{RetryPolicy, retry_with_backoff};
pub use simulated::{SimulatedFleet, SimulatedPrinter};

/// Body of a successful printer response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    /// Anything that is not JSON, e.g. an XML material document.
    Text(String),
}

impl Payload {
    pub fn from_body(body: String) -> Self {
        match serde_json::from_str(&body) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Text(body),
        }
    }
}

/// Raw access to a printer's `/api/v1` surface.
#[async_trait]
pub trait PrinterTransport: Send + Sync {
    /// GET `/api/v1/{endpoint}` on the printer at `address`. Implementations
    /// apply their own timeout and retry policy before returning an error.
    async fn get(&self, address: &str, endpoint: &str) -> Result<Payload, DeviceError>;
}

/// Client for one printer.
///
/// Never fails outward: transport and shape problems are logged and degrade
/// to a fallback name, an empty page or `"Unknown"`.
pub struct Printer {
    address: String,
    name: OnceCell<String>,
    materials: RwLock<HashMap<String, String>>,
    transport: Arc<dyn PrinterTransport>,
}

impl Printer {
    pub fn new(address: impl Into<String>, transport: Arc<dyn PrinterTransport>) -> Self {
        Self {
            address: address.into(),
            name: OnceCell::new(),
            materials: RwLock::new(HashMap::new()),
            transport,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Name used when the printer cannot tell us its own.
    pub fn fallback_name(&self) -> String {
        format!("Printer-{}", self.address)
    }

    /// Display name reported by `/system`, resolved once and cached for the
    /// lifetime of this client.
    pub async fn name(&self) -> &str {
        self.name.get_or_init(|| self.resolve_name()).await
    }

    async fn resolve_name(&self) -> String {
        match self.transport.get(&self.address, "system").await {
            Ok(Payload::Json(Value::Object(fields))) => match fields.get("name") {
                Some(Value::String(name)) => name.clone(),
                _ => {
                    warn!(address = %self.address, "System info has no name field");
                    self.fallback_name()
                }
            },
            Ok(_) => {
                warn!(address = %self.address, "Unexpected system info payload");
                self.fallback_name()
            }
            Err(e) => {
                warn!(address = %self.address, error = %e, "Failed to fetch system info");
                self.fallback_name()
            }
        }
    }

    /// Fetch one page of print history. Entries are returned as-is; an empty
    /// vector means the printer had nothing more, or could not be reached.
    pub async fn fetch_job_page(&self, offset: usize, count: usize) -> Vec<Value> {
        let endpoint = format!("history/print_jobs?offset={}&count={}", offset, count);
        match self.transport.get(&self.address, &endpoint).await {
            Ok(Payload::Json(Value::Array(entries))) => entries,
            Ok(other) => {
                warn!(
                    address = %self.address,
                    offset,
                    payload = payload_kind(&other),
                    "Unexpected print history response"
                );
                Vec::new()
            }
            Err(e) => {
                warn!(address = %self.address, offset, error = %e, "Failed to fetch print history");
                Vec::new()
            }
        }
    }

    /// Display name for a material GUID. Empty GUIDs resolve to `"Unknown"`
    /// without a request; successful lookups are cached per printer.
    pub async fn material_name(&self, guid: &str) -> String {
        if guid.is_empty() {
            return UNKNOWN_MATERIAL.to_string();
        }

        if let Some(name) = self.materials.read().await.get(guid) {
            return name.clone();
        }

        let endpoint = format!("materials/{}", guid);
        let resolved = match self.transport.get(&self.address, &endpoint).await {
            Ok(payload) => material::material_name(&payload),
            Err(e) => {
                warn!(address = %self.address, guid, error = %e, "Failed to fetch material");
                return UNKNOWN_MATERIAL.to_string();
            }
        };

        match resolved {
            Some(name) => {
                self.materials
                    .write()
                    .await
                    .insert(guid.to_string(), name.clone());
                name
            }
            None => {
                warn!(address = %self.address, guid, "Could not read material name");
                UNKNOWN_MATERIAL.to_string()
            }
        }
    }
}

fn payload_kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::Json(Value::Null) => "null",
        Payload::Json(Value::Bool(_)) => "bool",
        Payload::Json(Value::Number(_)) => "number",
        Payload::Json(Value::String(_)) => "string",
        Payload::Json(Value::Array(_)) => "array",
        Payload::Json(Value::Object(_)) => "object",
        Payload::Text(_) => "text",
    }
}

/// Read printer addresses, one per line. Blank lines and `#` comments are
/// skipped. A missing file is an error.
pub fn load_printer_addresses(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Printer list '{}' could not be read", path.display()))?;

    let addresses: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();

    debug!(count = addresses.len(), path = %path.display(), "Loaded printer list");
    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fleet_with(printer: SimulatedPrinter) -> Arc<SimulatedFleet> {
        let fleet = SimulatedFleet::new();
        fleet.insert("10.0.0.5", printer);
        Arc::new(fleet)
    }

    #[test]
    fn loads_addresses_skipping_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printers.txt");
        std::fs::write(&path, "# lab\n10.0.0.5\n\n  10.0.0.6  \n#10.0.0.7\n").unwrap();

        let addresses = load_printer_addresses(&path).unwrap();
        assert_eq!(addresses, vec!["10.0.0.5", "10.0.0.6"]);
    }

    #[test]
    fn missing_printer_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_printer_addresses(&dir.path().join("nope.txt")).is_err());
    }

    #[tokio::test]
    async fn name_is_resolved_once() {
        let fleet = fleet_with(SimulatedPrinter::named("Ultimaker S5 #2"));
        let printer = Printer::new("10.0.0.5", fleet.clone());

        assert_eq!(printer.name().await, "Ultimaker S5 #2");
        assert_eq!(printer.name().await, "Ultimaker S5 #2");
        assert_eq!(fleet.requests_matching("10.0.0.5", "system"), 1);
    }

    #[tokio::test]
    async fn name_falls_back_when_system_request_times_out() {
        let fleet = fleet_with(SimulatedPrinter::named("S3").timing_out());
        let printer = Printer::new("10.0.0.5", fleet.clone());

        assert_eq!(printer.name().await, "Printer-10.0.0.5");
        assert_eq!(printer.name().await, "Printer-10.0.0.5");
        assert_eq!(fleet.requests_matching("10.0.0.5", "system"), 1);
    }

    #[tokio::test]
    async fn name_falls_back_when_field_missing() {
        let fleet = fleet_with(SimulatedPrinter::default().with_system(json!({ "firmware": "5.2" })));
        let printer = Printer::new("10.0.0.5", fleet);
        assert_eq!(printer.name().await, "Printer-10.0.0.5");
    }

    #[tokio::test]
    async fn non_array_history_is_an_empty_page() {
        let fleet = fleet_with(SimulatedPrinter::named("S5").with_history_override(json!({ "message": "busy" })));
        let printer = Printer::new("10.0.0.5", fleet);
        assert!(printer.fetch_job_page(0, 50).await.is_empty());
    }

    #[tokio::test]
    async fn empty_guid_skips_material_request() {
        let fleet = fleet_with(SimulatedPrinter::named("S5"));
        let printer = Printer::new("10.0.0.5", fleet.clone());

        assert_eq!(printer.material_name("").await, UNKNOWN_MATERIAL);
        assert_eq!(fleet.requests_matching("10.0.0.5", "materials/"), 0);
    }

    #[tokio::test]
    async fn material_names_are_cached_after_success() {
        let fleet = fleet_with(
            SimulatedPrinter::named("S5")
                .with_material("guid-pla", Payload::Json(json!({ "name": "PLA" }))),
        );
        let printer = Printer::new("10.0.0.5", fleet.clone());

        assert_eq!(printer.material_name("guid-pla").await, "PLA");
        assert_eq!(printer.material_name("guid-pla").await, "PLA");
        assert_eq!(fleet.requests_matching("10.0.0.5", "materials/guid-pla"), 1);
    }

    #[tokio::test]
    async fn unknown_material_is_not_cached() {
        let fleet = fleet_with(SimulatedPrinter::named("S5"));
        let printer = Printer::new("10.0.0.5", fleet.clone());

        assert_eq!(printer.material_name("guid-missing").await, UNKNOWN_MATERIAL);
        assert_eq!(printer.material_name("guid-missing").await, UNKNOWN_MATERIAL);
        assert_eq!(fleet.requests_matching("10.0.0.5", "materials/guid-missing"), 2);
    }
}
