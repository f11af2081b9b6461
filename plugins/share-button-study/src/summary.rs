//! End-of-study summary.
//!
//! On uninstall or disable the whole ping log is folded into one outbound
//! record, after which the log is cleared and closed.

use std::collections::BTreeMap;

use studykit_host::{PingRecord, TelemetrySink};
use tracing::{info, warn};

use crate::dispatcher::COPY_EVENT;
use crate::error::Result;
use crate::ping_log::PingLog;

/// Whether the element was present in any surface at teardown.
pub const HAS_ELEMENT_FIELD: &str = "hasShareButton";
/// Number of copy events in the log.
pub const COPIES_FIELD: &str = "numberOfTimesCopied";
/// JSON array of every logged record, in append order.
pub const SUMMARY_FIELD: &str = "summary";

/// Build the summary record.
///
/// Host counters are added as stringified fields under their own names. A
/// counter named like one of the study's own fields is dropped.
pub fn build_summary(
    had_element: bool,
    counters: &BTreeMap<String, i64>,
    records: &[PingRecord],
) -> Result<PingRecord> {
    let copies = records.iter().filter(|r| r.is_event(COPY_EVENT)).count();

    let mut summary = PingRecord::new();
    for (name, value) in counters {
        if [HAS_ELEMENT_FIELD, COPIES_FIELD, SUMMARY_FIELD].contains(&name.as_str()) {
            warn!(counter = %name, "Dropping host counter that shadows a summary field");
            continue;
        }
        summary.insert(name.clone(), value.to_string());
    }
    summary.insert(HAS_ELEMENT_FIELD, had_element.to_string());
    summary.insert(COPIES_FIELD, copies.to_string());
    summary.insert(SUMMARY_FIELD, serde_json::to_string(records)?);
    Ok(summary)
}

/// Drains a ping log into one summary record.
pub struct SummaryReporter<'a> {
    telemetry: &'a dyn TelemetrySink,
    log: &'a dyn PingLog,
}

impl<'a> SummaryReporter<'a> {
    pub fn new(telemetry: &'a dyn TelemetrySink, log: &'a dyn PingLog) -> Self {
        Self { telemetry, log }
    }

    /// Build and send the summary, then clear and close the log.
    ///
    /// The log is closed even when sending or clearing fails; the first
    /// error is returned.
    pub async fn report(
        &self,
        had_element: bool,
        counters: &BTreeMap<String, i64>,
    ) -> Result<PingRecord> {
        let result = self.send(had_element, counters).await;

        if let Err(e) = self.log.close().await {
            warn!(error = %e, "Failed to close ping log");
            if result.is_ok() {
                return Err(e);
            }
        }
        result
    }

    async fn send(
        &self,
        had_element: bool,
        counters: &BTreeMap<String, i64>,
    ) -> Result<PingRecord> {
        let records = self.log.all().await?;
        let summary = build_summary(had_element, counters, &records)?;
        self.telemetry.send(&summary).await?;
        self.log.clear().await?;
        info!(records = records.len(), had_element, "Sent study summary");
        Ok(summary)
    }
}
