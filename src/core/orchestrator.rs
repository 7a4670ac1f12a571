use std::collections::HashSet;

use anyhow::{Context, Result};
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use super::dedup::DedupEngine;
use super::normalizer::Normalizer;
use crate::context::AppContext;
use crate::devices::Printer;
use crate::sink::{CsvLog, SaveOutcome, Sink, create_mirror};

/// Totals for one collection run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub printers: usize,
    /// History entries returned across every page of every printer.
    pub entries_seen: usize,
    pub new_records: usize,
    pub duplicates: usize,
    pub outcome: SaveOutcome,
}

/// Drives a full sweep: every printer, every history page, then one save.
pub struct Orchestrator {
    printers: Vec<Printer>,
    normalizer: Normalizer,
    sink: Sink,
    page_size: usize,
}

#[derive(Debug, Default)]
struct SweepTotals {
    pages: usize,
    entries: usize,
}

impl Orchestrator {
    pub fn new(ctx: &AppContext, addresses: &[String]) -> Result<Self> {
        let config = &ctx.config;
        let printers = addresses
            .iter()
            .map(|address| Printer::new(address.clone(), ctx.transport.clone()))
            .collect();
        let sink = Sink::new(
            CsvLog::new(config.log_path.clone()),
            create_mirror(config, ctx.client.clone()),
            config.remote_batch_size,
            config.mirror_pacing(),
        );

        Ok(Self::from_parts(
            printers,
            Normalizer::new(config.tz()?),
            sink,
            config.page_size,
        ))
    }

    pub fn from_parts(
        printers: Vec<Printer>,
        normalizer: Normalizer,
        sink: Sink,
        page_size: usize,
    ) -> Self {
        Self {
            printers,
            normalizer,
            sink,
            page_size: page_size.max(1),
        }
    }

    /// Load the ids already logged, sweep every printer and save whatever is
    /// new. Only a failure to read or append the local log is an error.
    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::now_v7().to_string();
        let span = info_span!("run", run_id = %run_id);

        async {
            let known_ids = self
                .sink
                .log()
                .load_known_ids()
                .await
                .context("Failed to read existing job log")?;

            let (engine, entries_seen) = self.collect(known_ids).await;
            let duplicates = engine.duplicates();
            let records = engine.into_records();
            let new_records = records.len();

            let outcome = if records.is_empty() {
                info!("No new print jobs");
                SaveOutcome::Nothing
            } else {
                self.sink
                    .save(records)
                    .await
                    .context("Failed to save new print jobs")?
            };

            Ok::<_, anyhow::Error>(RunSummary {
                run_id: run_id.clone(),
                printers: self.printers.len(),
                entries_seen,
                new_records,
                duplicates,
                outcome,
            })
        }
        .instrument(span)
        .await
    }

    /// Sweep every printer in order, feeding normalized records through a
    /// dedup engine seeded with `known_ids`. Returns the engine and the
    /// number of raw entries seen.
    pub async fn collect(&self, known_ids: HashSet<String>) -> (DedupEngine, usize) {
        let mut engine = DedupEngine::new(known_ids);
        let mut entries = 0;

        for printer in &self.printers {
            let span = info_span!("printer", address = %printer.address());
            let totals = self.sweep_printer(printer, &mut engine).instrument(span).await;
            entries += totals.entries;
        }

        (engine, entries)
    }

    async fn sweep_printer(&self, printer: &Printer, engine: &mut DedupEngine) -> SweepTotals {
        info!("Connecting to printer");
        let name = printer.name().await;
        info!(printer_name = %name, "Printer name resolved");

        let before = engine.pending();
        let mut totals = SweepTotals::default();
        let mut offset = 0;

        loop {
            let page = printer.fetch_job_page(offset, self.page_size).await;
            totals.pages += 1;
            totals.entries += page.len();

            for entry in &page {
                if let Some(record) = self.normalizer.normalize(printer, entry).await {
                    engine.offer(record);
                }
            }

            // A short page, including an empty or failed one, is the last.
            if page.len() < self.page_size {
                break;
            }
            offset += self.page_size;
            debug!(offset, "Fetching next history page");
        }

        info!(
            pages = totals.pages,
            entries = totals.entries,
            new = engine.pending() - before,
            "Printer sweep complete"
        );
        totals
    }
}
