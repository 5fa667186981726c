//! Text progress display for downloads.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use swup_engine::{ProgressCallback, ProgressEvent};

/// A callback printing a single, continuously rewritten progress line.
pub fn stdout_progress() -> ProgressCallback {
    let total = Arc::new(AtomicU64::new(0));
    Arc::new(move |event: ProgressEvent| match event {
        ProgressEvent::Started { url, total: size } => {
            total.store(size, Ordering::Relaxed);
            println!("Downloading {url}");
        }
        ProgressEvent::Progress { downloaded, speed } => {
            print_progress(downloaded, total.load(Ordering::Relaxed), speed);
        }
        ProgressEvent::Retrying {
            attempt,
            max_attempts,
            delay_ms,
        } => {
            println!();
            #[allow(clippy::cast_precision_loss)]
            let delay_secs = delay_ms as f64 / 1000.0;
            println!("Retrying in {delay_secs:.1}s (attempt {attempt} of {max_attempts})...");
        }
        ProgressEvent::Completed => {
            println!();
            println!("Download verified.");
        }
        ProgressEvent::Failed { error } => {
            println!();
            eprintln!("Download failed: {error}");
        }
    })
}

#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn print_progress(downloaded: u64, total: u64, speed: u64) {
    let percent = if total > 0 {
        (downloaded as f64 / total as f64 * 100.0).min(100.0) as u8
    } else {
        0
    };
    let downloaded_str = format_bytes(downloaded);
    let total_str = format_bytes(total);
    let speed_str = format_speed(speed);

    print!("\r{downloaded_str}/{total_str} ({percent}%) {speed_str}     ");
    let _ = std::io::stdout().flush();
}

/// Formats bytes into a human-readable string (KB, MB, GB).
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;

    if bytes_f >= GB {
        format!("{:.2} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.2} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.2} KB", bytes_f / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Formats bytes per second.
fn format_speed(speed: u64) -> String {
    format!("{}/s", format_bytes(speed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_use_binary_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 + 512 * 1024), "5.50 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn speed_is_per_second() {
        assert_eq!(format_speed(1536), "1.50 KB/s");
        assert_eq!(format_speed(0), "0 B/s");
    }
}
