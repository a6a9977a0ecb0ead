//! Terminal output: banners, progress bars and summaries.

use std::io::Write;
use std::time::{Duration, Instant};

use pulse_transfer::stats::format_bytes;
use pulse_transfer::FileProgress;

const BAR_WIDTH: usize = 40;

pub fn banner(title: &str) {
    println!();
    println!("═══════════════════════════════════════");
    println!("  Pulse - {title}");
    println!("═══════════════════════════════════════");
}

/// `[████░░░░…]  42%` for `done` of `total` bytes.
pub fn render_bar(done: u64, total: u64) -> String {
    let fraction = if total == 0 {
        1.0
    } else {
        (done as f64 / total as f64).min(1.0)
    };
    let filled = (fraction * BAR_WIDTH as f64) as usize;
    format!(
        "[{}{}] {:>3.0}%",
        "█".repeat(filled),
        "░".repeat(BAR_WIDTH - filled),
        fraction * 100.0
    )
}

/// `850ms`, `12.4s`, `3.5m`.
pub fn format_duration(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else if d < Duration::from_secs(60) {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{:.1}m", d.as_secs_f64() / 60.0)
    }
}

pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec.max(0.0) as u64))
}

/// Redraws one progress line per file, starting a new line whenever the
/// batch moves on to the next file.
pub struct ProgressBar {
    current: Option<u32>,
    started: Instant,
}

impl ProgressBar {
    pub fn new() -> Self {
        Self {
            current: None,
            started: Instant::now(),
        }
    }

    pub fn update(&mut self, progress: &FileProgress<'_>) {
        if self.current != Some(progress.index) {
            if self.current.is_some() {
                println!();
            }
            self.current = Some(progress.index);
            self.started = Instant::now();
            if progress.batch_total > 1 {
                println!(
                    "  [{}/{}] {}",
                    progress.index + 1,
                    progress.batch_total,
                    progress.filename
                );
            }
        }

        let secs = self.started.elapsed().as_secs_f64();
        let speed = if secs > 0.0 {
            progress.done as f64 / secs
        } else {
            0.0
        };
        print!(
            "\r  {} | {}",
            render_bar(progress.done, progress.size),
            format_speed(speed)
        );
        let _ = std::io::stdout().flush();
    }

    pub fn finish(&mut self) {
        if self.current.take().is_some() {
            println!();
        }
    }
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self::new()
    }
}
