//! # Utility Functions
//!
//! Formatters for human-readable log output and the parser for client-count
//! lists given on the command line.
//!
//! ## Usage Examples
//!
//! ```rust
//! use opcua_server_benchmark::utils::*;
//! use std::time::Duration;
//!
//! assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
//! assert_eq!(format_rate(1048576.0), "1.00 MB/s");
//! assert_eq!(parse_client_counts("1,10,50").unwrap(), vec![1, 10, 50]);
//! ```

use crate::error::{BenchError, Result};
use std::collections::HashSet;
use std::time::Duration;

/// Format a duration in a human-readable way
///
/// Selects the unit from the magnitude:
///
/// - **Nanoseconds**: < 1,000 ns (e.g., "500ns")
/// - **Microseconds**: < 1,000,000 ns (e.g., "1.50μs")
/// - **Milliseconds**: < 1,000,000,000 ns (e.g., "25.75ms")
/// - **Seconds**: < 60 seconds (e.g., "5.25s")
/// - **Minutes and Hours**: For longer durations (e.g., "5m 30s", "2h 15m 30s")
///
/// ## Examples
///
/// ```rust
/// # use opcua_server_benchmark::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_nanos(750)), "750ns");
/// assert_eq!(format_duration(Duration::from_nanos(1250)), "1.25μs");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

/// Format a duration given in (fractional) seconds.
///
/// Negative or non-finite input is shown as zero.
pub fn format_duration_secs(seconds: f64) -> String {
    format_duration(Duration::try_from_secs_f64(seconds).unwrap_or_default())
}

/// Format a byte count with binary units ("500 B", "1.50 KB", ...).
pub fn format_bytes(bytes: f64) -> String {
    if bytes < 1024.0 {
        format!("{:.0} B", bytes)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a throughput in bytes per second.
pub fn format_rate(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Parse a comma-separated list of client counts, e.g. `"1,10,50"`.
///
/// The list must be non-empty, every count at least 1, and no count may
/// repeat (a repeated count would write two fanouts into the same artifact
/// family).
pub fn parse_client_counts(list: &str) -> Result<Vec<usize>> {
    let counts = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|e| BenchError::config(format!("invalid client count '{}': {}", s, e)))
        })
        .collect::<Result<Vec<_>>>()?;

    validate_client_counts(&counts)?;
    Ok(counts)
}

pub fn validate_client_counts(counts: &[usize]) -> Result<()> {
    if counts.is_empty() {
        return Err(BenchError::config("client count list is empty"));
    }
    let mut seen = HashSet::new();
    for &count in counts {
        if count == 0 {
            return Err(BenchError::config("client count must be at least 1"));
        }
        if !seen.insert(count) {
            return Err(BenchError::config(format!(
                "client count {} appears more than once",
                count
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
        assert_eq!(format_duration(Duration::from_nanos(1500)), "1.50μs");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_format_duration_secs() {
        assert_eq!(format_duration_secs(0.010), "10.00ms");
        assert_eq!(format_duration_secs(-1.0), "0ns");
        assert_eq!(format_duration_secs(f64::NAN), "0ns");
    }

    /// Test rate formatting for throughput display
    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(500.0), "500 B/s");
        assert_eq!(format_rate(1024.0), "1.00 KB/s");
        assert_eq!(format_rate(1048576.0), "1.00 MB/s");
    }

    #[test]
    fn test_parse_client_counts() {
        assert_eq!(parse_client_counts("1,3,5,10").unwrap(), vec![1, 3, 5, 10]);
        assert_eq!(parse_client_counts(" 50 , 1 ").unwrap(), vec![50, 1]);
        assert!(parse_client_counts("").is_err());
        assert!(parse_client_counts("1,0").is_err());
        assert!(parse_client_counts("1,x").is_err());
        assert!(parse_client_counts("5,5").is_err());
    }
}
