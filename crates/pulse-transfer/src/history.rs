//! Transfer history records.
//!
//! The engine emits one [`HistoryEntry`] per completed file into a
//! [`HistorySink`]. Persistence is up to the sink; the engine never reads
//! history back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pulse_core::message::Metadata;

use crate::stats::TransferStats;

/// Status recorded for a file that arrived intact.
pub const STATUS_OK: &str = "ok";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Send,
    Receive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub time: DateTime<Utc>,
    pub direction: TransferDirection,
    pub filename: String,
    pub size: u64,
    pub duration_ms: u64,
    /// Bytes per second.
    pub speed: f64,
    pub status: String,
    #[serde(default)]
    pub checksum: String,
}

impl HistoryEntry {
    pub fn completed(direction: TransferDirection, meta: &Metadata, stats: &TransferStats) -> Self {
        Self {
            time: Utc::now(),
            direction,
            filename: meta.filename.clone(),
            size: meta.size,
            duration_ms: u64::try_from(stats.duration.as_millis()).unwrap_or(u64::MAX),
            speed: stats.average_speed,
            status: STATUS_OK.to_string(),
            checksum: meta.checksum.clone(),
        }
    }
}

/// Append-only destination for history records.
pub trait HistorySink: Send {
    fn record(&mut self, entry: HistoryEntry) -> std::io::Result<()>;
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHistory;

impl HistorySink for NoHistory {
    fn record(&mut self, _entry: HistoryEntry) -> std::io::Result<()> {
        Ok(())
    }
}

impl HistorySink for Vec<HistoryEntry> {
    fn record(&mut self, entry: HistoryEntry) -> std::io::Result<()> {
        self.push(entry);
        Ok(())
    }
}

/// Record `entry`, logging instead of failing the transfer.
pub(crate) fn record(sink: &mut dyn HistorySink, entry: HistoryEntry) {
    let filename = entry.filename.clone();
    if let Err(e) = sink.record(entry) {
        tracing::warn!(filename, error = %e, "failed to record history entry");
    }
}
