//! Result types returned by a compression run.

use crate::error::SegmentError;
use crate::pipeline::classify::{Classification, ContainerFamily, MediaKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Final document plus everything known about how it was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionOutput {
    /// Reassembled document text.
    pub document: String,
    /// Suggested file name for the output (same as the input's).
    pub file_name: String,
    /// Generation of the run that produced this output.
    pub generation: u64,
    /// One report per candidate segment, in document order.
    pub segments: Vec<SegmentReport>,
    pub stats: CompressionStats,
}

/// What happened to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentOutcome {
    /// Re-encoded and strictly smaller; the replacement was kept.
    Replaced,
    /// Re-encoded but not smaller; the original was kept.
    NotSmaller,
    /// Transcoder chose not to touch it (already-animated container).
    PassThrough,
    /// Codec failure, worker failure or timeout; the original was kept.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub index: usize,
    pub classification: Option<Classification>,
    pub original_len: usize,
    pub output_len: usize,
    pub outcome: SegmentOutcome,
    pub error: Option<SegmentError>,
    pub duration_ms: u64,
}

impl SegmentReport {
    /// Bytes saved by this segment (zero unless replaced).
    pub fn saved_bytes(&self) -> usize {
        self.original_len.saturating_sub(self.output_len)
    }
}

/// Run-level metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionStats {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub total_segments: usize,
    pub candidates: usize,
    pub replaced: usize,
    pub not_smaller: usize,
    pub passed_through: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl CompressionStats {
    /// Tally per-segment outcomes into run totals.
    pub fn tally(&mut self, reports: &[SegmentReport]) {
        for r in reports {
            match r.outcome {
                SegmentOutcome::Replaced => self.replaced += 1,
                SegmentOutcome::NotSmaller => self.not_smaller += 1,
                SegmentOutcome::PassThrough => self.passed_through += 1,
                SegmentOutcome::Failed => self.failed += 1,
            }
        }
        self.candidates = reports.len();
    }

    pub fn input_size(&self) -> String {
        format_size(self.input_bytes)
    }

    pub fn output_size(&self) -> String {
        format_size(self.output_bytes)
    }

    pub fn elapsed(&self) -> String {
        format_elapsed(Duration::from_millis(self.elapsed_ms))
    }

    /// Output size as a percentage of input size.
    pub fn ratio_percent(&self) -> f64 {
        if self.input_bytes == 0 {
            100.0
        } else {
            self.output_bytes as f64 * 100.0 / self.input_bytes as f64
        }
    }
}

/// Candidate listing produced by [`crate::inspect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub file_name: String,
    pub input_bytes: u64,
    pub total_segments: usize,
    pub candidates: Vec<CandidateInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateInfo {
    pub index: usize,
    /// Mime as declared in the data URL.
    pub declared_mime: String,
    pub family: ContainerFamily,
    pub kind: MediaKind,
    pub encoded_len: usize,
}

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Human-readable size with binary prefixes, two decimals above one KiB.
pub fn format_size(bytes: u64) -> String {
    if bytes < KIB {
        format!("{bytes} Bytes")
    } else if bytes < MIB {
        format!("{:.2} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    }
}

/// `HH:MM:SS.mmm`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_ms = elapsed.as_millis();
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3600;
    format!("{hours:02}:{mins:02}:{secs:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(0), "0 Bytes");
        assert_eq!(format_size(1023), "1023 Bytes");
        assert_eq!(format_size(1024), "1.00 KiB");
        assert_eq!(format_size(1536), "1.50 KiB");
        assert_eq!(format_size(1_048_575), "1024.00 KiB");
        assert_eq!(format_size(1_048_576), "1.00 MiB");
        assert_eq!(format_size(5 * 1_048_576 + 262_144), "5.25 MiB");
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_millis(0)), "00:00:00.000");
        assert_eq!(format_elapsed(Duration::from_millis(1_234)), "00:00:01.234");
        assert_eq!(
            format_elapsed(Duration::from_millis(3_723_045)),
            "01:02:03.045"
        );
    }

    #[test]
    fn tally_counts_outcomes() {
        let mk = |index, outcome| SegmentReport {
            index,
            classification: None,
            original_len: 100,
            output_len: if outcome == SegmentOutcome::Replaced { 40 } else { 100 },
            outcome,
            error: None,
            duration_ms: 0,
        };
        let reports = vec![
            mk(1, SegmentOutcome::Replaced),
            mk(3, SegmentOutcome::NotSmaller),
            mk(5, SegmentOutcome::Failed),
            mk(7, SegmentOutcome::Replaced),
        ];
        let mut stats = CompressionStats::default();
        stats.tally(&reports);
        assert_eq!(stats.candidates, 4);
        assert_eq!(stats.replaced, 2);
        assert_eq!(stats.not_smaller, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(reports[0].saved_bytes(), 60);
        assert_eq!(reports[1].saved_bytes(), 0);
    }

    #[test]
    fn ratio_handles_empty_input() {
        let stats = CompressionStats::default();
        assert_eq!(stats.ratio_percent(), 100.0);
    }
}
