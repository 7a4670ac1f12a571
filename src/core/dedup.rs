use std::collections::HashSet;

use tracing::debug;

use super::models::JobRecord;

/// Collects the records of one run that are not yet in the job log.
///
/// Seeded with the ids already logged at startup; every accepted record's id
/// joins the seen set, so a job reported twice in one sweep is kept once.
#[derive(Debug, Default)]
pub struct DedupEngine {
    seen: HashSet<String>,
    accepted: Vec<JobRecord>,
    duplicates: usize,
}

impl DedupEngine {
    pub fn new(known_ids: HashSet<String>) -> Self {
        Self {
            seen: known_ids,
            accepted: Vec::new(),
            duplicates: 0,
        }
    }

    /// Accept `record` unless its id has been seen. Returns whether it was
    /// accepted.
    pub fn offer(&mut self, record: JobRecord) -> bool {
        if self.seen.contains(&record.uuid) {
            debug!(uuid = %record.uuid, "Skipping already recorded job");
            self.duplicates += 1;
            return false;
        }
        self.seen.insert(record.uuid.clone());
        self.accepted.push(record);
        true
    }

    pub fn pending(&self) -> usize {
        self.accepted.len()
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// New records in the order they were offered.
    pub fn into_records(self) -> Vec<JobRecord> {
        self.accepted
    }
}
