use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::debug;

use super::models::{JobRecord, RawJobRecord};
use crate::devices::Printer;

/// Turns raw history entries into log rows.
pub struct Normalizer {
    timezone: Tz,
}

impl Normalizer {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Canonical record for `entry`, or `None` if the job is still running,
    /// unidentifiable, or malformed.
    pub async fn normalize(&self, printer: &Printer, entry: &Value) -> Option<JobRecord> {
        if !entry.is_object() {
            debug!(address = printer.address(), "Skipping non-object history entry");
            return None;
        }

        let raw: RawJobRecord = match serde_json::from_value(entry.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(address = printer.address(), error = %e, job = %entry, "Skipping malformed job");
                return None;
            }
        };

        if !raw.is_terminal() {
            return None;
        }

        let uuid = raw.uuid.clone().unwrap_or_default();
        if uuid.is_empty() {
            debug!(address = printer.address(), job = %entry, "Skipping job without uuid");
            return None;
        }

        let started = raw.datetime_started.as_deref().unwrap_or_default();
        let date = if started.is_empty() {
            String::new()
        } else {
            match parse_utc(started) {
                Ok(start) => start.date_naive().to_string(),
                Err(e) => {
                    debug!(uuid = %uuid, started, error = %e, "Skipping job with bad start time");
                    return None;
                }
            }
        };

        let datetime_started = self.localize(started);
        let datetime_finished = self.localize(raw.datetime_finished.as_deref().unwrap_or_default());

        let material_0_name = printer
            .material_name(raw.material_0_guid.as_deref().unwrap_or_default())
            .await;
        let material_1_name = printer
            .material_name(raw.material_1_guid.as_deref().unwrap_or_default())
            .await;

        Some(JobRecord {
            uuid,
            printer_name: printer.name().await.to_string(),
            date,
            datetime_started,
            datetime_finished,
            name: raw.name.unwrap_or_default(),
            result: raw.result.unwrap_or_default(),
            time_total: raw.time_total,
            material_0_amount: clamp_amount(raw.material_0_amount),
            material_1_amount: clamp_amount(raw.material_1_amount),
            material_0_name,
            material_1_name,
        })
    }

    /// Convert a UTC timestamp to the configured zone. Empty or unparseable
    /// input yields an empty string.
    pub fn localize(&self, timestamp: &str) -> String {
        if timestamp.is_empty() {
            return String::new();
        }
        match parse_utc(timestamp) {
            Ok(utc) => utc
                .with_timezone(&self.timezone)
                .to_rfc3339_opts(SecondsFormat::AutoSi, false),
            Err(e) => {
                debug!(timestamp, error = %e, "Could not localize timestamp");
                String::new()
            }
        }
    }
}

/// Parse an ISO-8601 timestamp reported in UTC. A `Z` suffix or explicit
/// offset is honoured; a bare timestamp is taken as UTC. The result is always
/// in UTC, so a job's `date` is the UTC calendar day even for offset input.
pub fn parse_utc(timestamp: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let trimmed = timestamp.trim();
    match DateTime::parse_from_rfc3339(trimmed) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| rfc_err),
    }
}

fn clamp_amount(amount: f64) -> f64 {
    if amount > 0.0 { amount } else { 0.0 }
}
