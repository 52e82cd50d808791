//! Measurement formatting for the console.

use super::runner::MeasurementReport;
use super::{BandwidthSample, Direction};

/// "9.41 Gbps" at or above 1000 Mbps, otherwise "245.3 Mbps".
pub fn format_rate(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.2} Gbps", mbps / 1000.0)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}

/// One line per sample, printed while the run is in progress.
pub fn format_sample(sample: &BandwidthSample) -> String {
    let size = match sample.direction {
        Direction::Download => format!("{0}x{0}px", sample.requested_size),
        Direction::Upload => format!("{} B", sample.requested_size),
    };
    format!(
        "  {:<8} {:>12} {:>10} bytes in {:.3}s -> {}",
        sample.direction,
        size,
        sample.payload_bytes,
        sample.elapsed_secs,
        format_rate(sample.mbps),
    )
}

/// Closing summary: one line per direction plus any failed probes.
pub fn format_summary(report: &MeasurementReport) -> String {
    let mut summary = format!("Endpoint: {}\n", report.endpoint);

    for (direction, samples, average) in [
        (Direction::Download, &report.download_samples, report.download_average_mbps),
        (Direction::Upload, &report.upload_samples, report.upload_average_mbps),
    ] {
        let line = match average {
            Some(avg) => format!(
                "{:<8} average: {} ({} sample{})\n",
                direction,
                format_rate(avg),
                samples.len(),
                if samples.len() == 1 { "" } else { "s" },
            ),
            None => format!("{:<8} average: n/a\n", direction),
        };
        summary.push_str(&line);
    }

    if !report.failures.is_empty() {
        summary.push_str(&format!("{} probe(s) failed:\n", report.failures.len()));
        for f in &report.failures {
            summary.push_str(&format!("  {} {}: {}\n", f.direction, f.size, f.error));
        }
    }

    summary
}
