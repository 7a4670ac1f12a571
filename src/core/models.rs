use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Value, json};

/// Job results that mean the printer is done with the job.
pub const TERMINAL_RESULTS: [&str; 2] = ["Finished", "Aborted"];

/// Column order of the job log and of mirrored spreadsheet rows.
pub const LOG_FIELDS: [&str; 12] = [
    "uuid",
    "printer_name",
    "date",
    "datetime_started",
    "datetime_finished",
    "name",
    "result",
    "time_total",
    "material_0_amount",
    "material_1_amount",
    "material_0_name",
    "material_1_name",
];

/// A print job as reported by `/history/print_jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJobRecord {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub datetime_started: Option<String>,
    #[serde(default)]
    pub datetime_finished: Option<String>,
    #[serde(default)]
    pub time_total: Option<f64>,
    /// Firmware occasionally reports small negative amounts.
    #[serde(default)]
    pub material_0_amount: f64,
    #[serde(default)]
    pub material_1_amount: f64,
    #[serde(default)]
    pub material_0_guid: Option<String>,
    #[serde(default)]
    pub material_1_guid: Option<String>,
}

impl RawJobRecord {
    pub fn is_terminal(&self) -> bool {
        self.result
            .as_deref()
            .is_some_and(|result| TERMINAL_RESULTS.contains(&result))
    }
}

/// One row of the job log. Identified by `uuid`; never changed once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub uuid: String,
    pub printer_name: String,
    /// Calendar date of the UTC start time, `YYYY-MM-DD`.
    pub date: String,
    pub datetime_started: String,
    pub datetime_finished: String,
    pub name: String,
    pub result: String,
    #[serde(serialize_with = "plain_optional_number")]
    pub time_total: Option<f64>,
    #[serde(serialize_with = "plain_number")]
    pub material_0_amount: f64,
    #[serde(serialize_with = "plain_number")]
    pub material_1_amount: f64,
    pub material_0_name: String,
    pub material_1_name: String,
}

impl JobRecord {
    /// Spreadsheet row in [`LOG_FIELDS`] order.
    pub fn to_row(&self) -> Vec<Value> {
        vec![
            json!(self.uuid),
            json!(self.printer_name),
            json!(self.date),
            json!(self.datetime_started),
            json!(self.datetime_finished),
            json!(self.name),
            json!(self.result),
            self.time_total.map_or_else(|| json!(""), |t| json!(t)),
            json!(self.material_0_amount),
            json!(self.material_1_amount),
            json!(self.material_0_name),
            json!(self.material_1_name),
        ]
    }
}

// Whole numbers are written without a trailing `.0`.
fn plain_number<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

fn plain_optional_number<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => serializer.collect_str(value),
        None => serializer.serialize_none(),
    }
}
