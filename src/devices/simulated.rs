use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Payload, PrinterTransport};
use crate::error::DeviceError;

const DEMO_RESULTS: [&str; 4] = ["Finished", "Finished", "Aborted", "Printing"];

/// One printer served by a [`SimulatedFleet`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedPrinter {
    system: Option<Value>,
    jobs: Vec<Value>,
    history_override: Option<Value>,
    endless_pages: Option<usize>,
    materials: HashMap<String, Payload>,
    timing_out: bool,
}

impl SimulatedPrinter {
    pub fn named(name: &str) -> Self {
        Self::default().with_system(json!({ "name": name }))
    }

    pub fn with_system(mut self, system: Value) -> Self {
        self.system = Some(system);
        self
    }

    pub fn with_jobs(mut self, jobs: Vec<Value>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Answer every history request with `value` instead of a page of jobs.
    pub fn with_history_override(mut self, value: Value) -> Self {
        self.history_override = Some(value);
        self
    }

    /// Serve a completely full page for the first `pages` history requests,
    /// then an empty one.
    pub fn with_endless_history(mut self, pages: usize) -> Self {
        self.endless_pages = Some(pages);
        self
    }

    pub fn with_material(mut self, guid: &str, payload: Payload) -> Self {
        self.materials.insert(guid.to_string(), payload);
        self
    }

    /// Every request to this printer fails with a timeout.
    pub fn timing_out(mut self) -> Self {
        self.timing_out = true;
        self
    }

    fn history_page(&self, address: &str, offset: usize, count: usize) -> Value {
        if let Some(value) = &self.history_override {
            return value.clone();
        }

        if let Some(pages) = self.endless_pages {
            if offset >= pages * count {
                return Value::Array(Vec::new());
            }
            let jobs = (offset..offset + count)
                .map(|i| {
                    demo_job(
                        &format!("{}-endless-{}", address, i),
                        "Finished",
                        i,
                    )
                })
                .collect();
            return Value::Array(jobs);
        }

        let jobs = self.jobs.iter().skip(offset).take(count).cloned().collect();
        Value::Array(jobs)
    }
}

/// In-memory stand-in for a fleet of printers. Records every request so
/// callers can assert on traffic.
#[derive(Default)]
pub struct SimulatedFleet {
    printers: Mutex<HashMap<String, SimulatedPrinter>>,
    requests: Mutex<Vec<(String, String)>>,
}

impl SimulatedFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small deterministic fleet, one printer per address, with a mix of
    /// finished, aborted and in-progress jobs.
    pub fn demo(addresses: &[String]) -> Self {
        let fleet = Self::new();
        for (p, address) in addresses.iter().enumerate() {
            let jobs = (0..7)
                .map(|i| {
                    let result = DEMO_RESULTS[(p + i) % DEMO_RESULTS.len()];
                    demo_job(&format!("{}-job-{}", address, i), result, i)
                })
                .collect();

            let printer = SimulatedPrinter::named(&format!("Simulated S5 {}", p + 1))
                .with_jobs(jobs)
                .with_material("guid-pla", Payload::Json(json!({ "name": "PLA" })))
                .with_material(
                    "guid-tough-pla",
                    Payload::Text(
                        r#"<fdmmaterial xmlns="http://www.ultimaker.com/material"><metadata><name><material>Tough PLA</material></name></metadata></fdmmaterial>"#
                            .to_string(),
                    ),
                );
            fleet.insert(address, printer);
        }
        fleet
    }

    pub fn insert(&self, address: &str, printer: SimulatedPrinter) {
        self.printers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.to_string(), printer);
    }

    /// Endpoints requested from `address`, in order.
    pub fn requests(&self, address: &str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(a, _)| a == address)
            .map(|(_, endpoint)| endpoint.clone())
            .collect()
    }

    pub fn requests_matching(&self, address: &str, prefix: &str) -> usize {
        self.requests(address)
            .iter()
            .filter(|endpoint| endpoint.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl PrinterTransport for SimulatedFleet {
    async fn get(&self, address: &str, endpoint: &str) -> Result<Payload, DeviceError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((address.to_string(), endpoint.to_string()));

        let url = format!("sim://{}/api/v1/{}", address, endpoint);
        let printers = self.printers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(printer) = printers.get(address) else {
            return Err(DeviceError::Connect {
                url,
                message: "no such simulated printer".to_string(),
            });
        };

        if printer.timing_out {
            return Err(DeviceError::Timeout { url });
        }

        let not_found = || DeviceError::Status {
            url: url.clone(),
            status: 404,
        };

        if endpoint == "system" {
            return printer.system.clone().map(Payload::Json).ok_or_else(not_found);
        }

        if let Some(query) = endpoint.strip_prefix("history/print_jobs?") {
            let (offset, count) = parse_page_query(query);
            return Ok(Payload::Json(printer.history_page(address, offset, count)));
        }

        if let Some(guid) = endpoint.strip_prefix("materials/") {
            return printer.materials.get(guid).cloned().ok_or_else(not_found);
        }

        Err(not_found())
    }
}

fn parse_page_query(query: &str) -> (usize, usize) {
    let mut offset = 0;
    let mut count = 0;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("offset", v)) => offset = v.parse().unwrap_or(0),
            Some(("count", v)) => count = v.parse().unwrap_or(0),
            _ => {}
        }
    }
    (offset, count)
}

fn demo_job(uuid: &str, result: &str, index: usize) -> Value {
    let hour = index % 20;
    json!({
        "uuid": uuid,
        "name": format!("part_{}.ufp", index),
        "result": result,
        "datetime_started": format!("2024-03-{:02}T{:02}:15:00.000Z", 1 + index % 28, hour),
        "datetime_finished": format!("2024-03-{:02}T{:02}:45:00.000Z", 1 + index % 28, hour + 2),
        "time_total": 9000,
        "material_0_amount": 1250.5,
        "material_1_amount": if index % 3 == 0 { -0.4 } else { 0.0 },
        "material_0_guid": "guid-pla",
        "material_1_guid": if index % 2 == 0 { "guid-tough-pla" } else { "" },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_page_query() {
        assert_eq!(parse_page_query("offset=100&count=50"), (100, 50));
        assert_eq!(parse_page_query("count=5"), (0, 5));
    }

    #[tokio::test]
    async fn demo_fleet_serves_every_address() {
        let addresses = vec!["a".to_string(), "b".to_string()];
        let fleet = SimulatedFleet::demo(&addresses);

        for address in &addresses {
            let page = fleet
                .get(address, "history/print_jobs?offset=0&count=50")
                .await
                .unwrap();
            match page {
                Payload::Json(Value::Array(jobs)) => assert_eq!(jobs.len(), 7),
                other => panic!("unexpected payload {other:?}"),
            }
        }
        assert!(fleet.get("c", "system").await.is_err());
    }

    #[tokio::test]
    async fn endless_history_stops_after_cap() {
        let fleet = SimulatedFleet::new();
        fleet.insert("a", SimulatedPrinter::named("A").with_endless_history(2));

        let page = fleet.get("a", "history/print_jobs?offset=50&count=50").await.unwrap();
        assert!(matches!(page, Payload::Json(Value::Array(ref jobs)) if jobs.len() == 50));

        let page = fleet.get("a", "history/print_jobs?offset=100&count=50").await.unwrap();
        assert!(matches!(page, Payload::Json(Value::Array(ref jobs)) if jobs.is_empty()));
    }
}
