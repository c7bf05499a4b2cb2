//! Byte-level progress tracking for chunked uploads.
//!
//! The Drive client feeds one update per transferred chunk; the tracker turns
//! that into percentages, speeds and ETAs for the debug log.

use std::time::{Duration, Instant};

/// Snapshot of a single object's transfer
#[derive(Debug, Clone, PartialEq)]
pub struct UploadProgress {
    /// Total bytes of the object being uploaded
    pub total_bytes: u64,

    /// Bytes acknowledged by the remote so far
    pub transferred_bytes: u64,

    /// Speed over the last chunk in bytes/second
    pub bytes_per_second: u64,

    /// Estimated time remaining (seconds)
    pub eta_seconds: u64,

    /// Percentage complete (0-100)
    pub percent_complete: f64,
}

impl UploadProgress {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            transferred_bytes: 0,
            bytes_per_second: 0,
            eta_seconds: 0,
            percent_complete: if total_bytes == 0 { 100.0 } else { 0.0 },
        }
    }

    pub fn is_complete(&self) -> bool {
        self.transferred_bytes >= self.total_bytes
    }
}

/// Progress tracker with time-based speed calculation
pub struct ProgressTracker {
    start_time: Instant,
    last_update_time: Instant,
    progress: UploadProgress,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64) -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_update_time: now,
            progress: UploadProgress::new(total_bytes),
        }
    }

    /// Record the absolute number of bytes transferred so far.
    pub fn update(&mut self, transferred_bytes: u64) -> &UploadProgress {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update_time).as_secs_f64();
        let previous = self.progress.transferred_bytes;

        if elapsed > 0.0 {
            let bytes_diff = transferred_bytes.saturating_sub(previous);
            self.progress.bytes_per_second = (bytes_diff as f64 / elapsed) as u64;
        }

        if self.progress.bytes_per_second > 0 {
            let remaining = self.progress.total_bytes.saturating_sub(transferred_bytes);
            self.progress.eta_seconds = remaining / self.progress.bytes_per_second;
        }

        self.progress.transferred_bytes = transferred_bytes;
        self.progress.percent_complete = if self.progress.total_bytes > 0 {
            ((transferred_bytes as f64 / self.progress.total_bytes as f64) * 100.0).min(100.0)
        } else {
            100.0
        };
        self.last_update_time = now;

        &self.progress
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average speed since start
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.progress.transferred_bytes as f64 / elapsed) as u64
        } else {
            0
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
