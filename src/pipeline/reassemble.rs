//! Reassembly: restore document order and concatenate.
//!
//! Results arrive in completion order. Segment indices are dense from 0, so
//! sorting by index and joining gives back the document with each candidate
//! replaced in place.

use crate::output::SegmentReport;
use crate::pipeline::dispatch::JobResult;
use crate::pipeline::extract::Segment;

/// Split dispatcher results into segments and candidate reports, both sorted
/// by index.
pub fn collect(results: Vec<JobResult>) -> (Vec<Segment>, Vec<SegmentReport>) {
    let mut segments = Vec::with_capacity(results.len());
    let mut reports = Vec::new();
    for r in results {
        if let Some(report) = r.report {
            reports.push(report);
        }
        segments.push(r.segment);
    }
    segments.sort_by_key(|s| s.index);
    reports.sort_by_key(|r| r.index);
    (segments, reports)
}

/// Concatenate segments in index order.
pub fn reassemble(mut segments: Vec<Segment>) -> String {
    segments.sort_by_key(|s| s.index);
    let len = segments.iter().map(|s| s.content.len()).sum();
    let mut document = String::with_capacity(len);
    for s in &segments {
        document.push_str(&s.content);
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract::extract;

    #[test]
    fn order_of_arrival_does_not_matter() {
        let doc = "one \"data:image/png;base64,QUJD\" two 'data:image/gif;base64,REVG' three";
        let mut segments = extract(doc);
        segments.reverse();
        segments.swap(0, 2);
        assert_eq!(reassemble(segments), doc);
    }

    #[test]
    fn empty_input() {
        assert_eq!(reassemble(Vec::new()), "");
        assert_eq!(reassemble(extract("")), "");
    }

    #[test]
    fn replacements_land_in_place() {
        let segments = vec![
            Segment::new(2, "C"),
            Segment::new(0, "A"),
            Segment::new(1, "\"data:image/avif;base64,eA==\""),
        ];
        assert_eq!(reassemble(segments), "A\"data:image/avif;base64,eA==\"C");
    }
}
