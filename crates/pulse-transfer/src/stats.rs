//! Per-file transfer statistics and progress reporting.

use std::time::Duration;

/// Computed once for each completed file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferStats {
    pub duration: Duration,
    pub bytes_transferred: u64,
    /// Bytes per second. Zero when the transfer took no measurable time.
    pub average_speed: f64,
}

impl TransferStats {
    pub fn new(duration: Duration, bytes_transferred: u64) -> Self {
        let secs = duration.as_secs_f64();
        let average_speed = if secs > 0.0 {
            bytes_transferred as f64 / secs
        } else {
            0.0
        };
        Self {
            duration,
            bytes_transferred,
            average_speed,
        }
    }
}

/// Progress of one file within a batch.
#[derive(Debug, Clone, Copy)]
pub struct FileProgress<'a> {
    pub filename: &'a str,
    /// Zero-based position in the batch.
    pub index: u32,
    pub batch_total: u32,
    pub done: u64,
    pub size: u64,
}

/// Human-readable byte count: `512 B`, `1.5 KB`, `3.2 MB`, `1.1 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if bytes < 1024 {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else if b < KB * KB * KB {
        format!("{:.1} MB", b / (KB * KB))
    } else {
        format!("{:.1} GB", b / (KB * KB * KB))
    }
}
