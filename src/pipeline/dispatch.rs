//! Dispatcher: fan candidate segments out to the worker pool and collect them
//! back in completion order.
//!
//! Literal text never reaches the pool. Every candidate becomes exactly one
//! job; the job receives its own copy of the segment and the dispatcher keeps
//! the original, so a timeout or worker failure can always fall back to it.
//!
//! The size-regression guard lives in [`execute_job`]: a replacement is kept
//! only if its byte length is strictly smaller than the original segment's.

use crate::config::CompressionConfig;
use crate::error::{CompressError, SegmentError};
use crate::output::{SegmentOutcome, SegmentReport};
use crate::pipeline::extract::{count_candidates, Segment};
use crate::pipeline::pool::WorkerPool;
use crate::pipeline::transcode::{SegmentTranscoder, Transcoded};
use futures::stream::{self, StreamExt};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A finished segment: final content plus, for candidates, what happened.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub segment: Segment,
    /// `None` for literal text that bypassed the pool.
    pub report: Option<SegmentReport>,
}

impl JobResult {
    fn literal(segment: Segment) -> Self {
        Self {
            segment,
            report: None,
        }
    }

    fn fallback(original: Segment, error: SegmentError, started: Instant) -> Self {
        let len = original.content.len();
        Self {
            report: Some(SegmentReport {
                index: original.index,
                classification: None,
                original_len: len,
                output_len: len,
                outcome: SegmentOutcome::Failed,
                error: Some(error),
                duration_ms: started.elapsed().as_millis() as u64,
            }),
            segment: original,
        }
    }
}

/// Transcode one candidate and apply the size-regression guard.
///
/// Runs on a worker thread. Never fails: codec errors and codec panics keep the
/// original content.
pub fn execute_job(transcoder: &dyn SegmentTranscoder, segment: Segment, quality: u8) -> JobResult {
    let started = Instant::now();
    let index = segment.index;
    let original_len = segment.content.len();

    let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
        transcoder.transcode(&segment.content, quality)
    }));

    let (replacement, classification, outcome, error) = match attempt {
        Ok(Ok(Transcoded::Replacement {
            content,
            classification,
        })) => {
            if content.len() < original_len {
                debug!(
                    "Segment {}: {} → {} bytes",
                    index,
                    original_len,
                    content.len()
                );
                (Some(content), classification, SegmentOutcome::Replaced, None)
            } else {
                debug!(
                    "Segment {}: replacement not smaller ({} ≥ {}), keeping original",
                    index,
                    content.len(),
                    original_len
                );
                (None, classification, SegmentOutcome::NotSmaller, None)
            }
        }
        Ok(Ok(Transcoded::PassThrough { classification })) => {
            (None, classification, SegmentOutcome::PassThrough, None)
        }
        Ok(Err(e)) => {
            warn!("Segment {}: {}, keeping original", index, e);
            (
                None,
                None,
                SegmentOutcome::Failed,
                Some(SegmentError::from_codec(index, &e)),
            )
        }
        Err(_) => {
            warn!("Segment {}: codec panicked, keeping original", index);
            (
                None,
                None,
                SegmentOutcome::Failed,
                Some(SegmentError::WorkerFailed {
                    index,
                    detail: "codec panicked".to_string(),
                }),
            )
        }
    };

    let segment = match replacement {
        Some(content) => Segment { content, ..segment },
        None => segment,
    };

    JobResult {
        report: Some(SegmentReport {
            index,
            classification,
            original_len,
            output_len: segment.content.len(),
            outcome,
            error,
            duration_ms: started.elapsed().as_millis() as u64,
        }),
        segment,
    }
}

/// Run every candidate through the pool; literals pass straight through.
///
/// The returned results are in no particular order.
pub async fn dispatch(
    pool: &WorkerPool,
    transcoder: &Arc<dyn SegmentTranscoder>,
    segments: Vec<Segment>,
    config: &CompressionConfig,
) -> Result<Vec<JobResult>, CompressError> {
    let total = count_candidates(&segments);
    let (candidates, literals): (Vec<Segment>, Vec<Segment>) =
        segments.into_iter().partition(|s| s.is_candidate);

    let mut results: Vec<JobResult> = Vec::with_capacity(candidates.len() + literals.len());
    results.extend(literals.into_iter().map(JobResult::literal));

    debug!(
        "Dispatching {} candidates to {} workers",
        total,
        pool.capacity()
    );

    let mut completed = stream::iter(
        candidates
            .into_iter()
            .map(|segment| run_candidate(pool, transcoder, segment, config)),
    )
    .buffer_unordered(pool.capacity());

    let mut done = 0;
    while let Some(result) = completed.next().await {
        let result = result?;
        done += 1;
        if let (Some(cb), Some(report)) = (&config.progress_callback, &result.report) {
            cb.on_segment_complete(done, total, report);
        }
        results.push(result);
    }

    Ok(results)
}

async fn run_candidate(
    pool: &WorkerPool,
    transcoder: &Arc<dyn SegmentTranscoder>,
    segment: Segment,
    config: &CompressionConfig,
) -> Result<JobResult, CompressError> {
    let started = Instant::now();
    let index = segment.index;
    let quality = config.quality;
    let original = segment.clone();

    let transcoder = Arc::clone(transcoder);
    let handle = pool
        .submit(move || execute_job(transcoder.as_ref(), segment, quality))
        .await?;
    let slot = handle.slot();

    let joined = match config.job_timeout_secs {
        Some(secs) => {
            match tokio::time::timeout(Duration::from_secs(secs), handle.join()).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The job keeps running; worker #slot stays busy until it returns.
                    warn!(
                        "Segment {}: timed out after {}s on worker #{}, keeping original",
                        index, secs, slot
                    );
                    return Ok(JobResult::fallback(
                        original,
                        SegmentError::Timeout { index, secs },
                        started,
                    ));
                }
            }
        }
        None => handle.join().await,
    };

    Ok(joined.unwrap_or_else(|e| {
        warn!("Segment {}: {}, keeping original", index, e);
        JobResult::fallback(
            original,
            SegmentError::WorkerFailed {
                index,
                detail: e.to_string(),
            },
            started,
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::pipeline::extract::extract;

    struct Fixed(Result<String, ()>);

    fn fixed(s: &str) -> Fixed {
        Fixed(Ok(s.to_string()))
    }

    impl SegmentTranscoder for Fixed {
        fn transcode(&self, _candidate: &str, _quality: u8) -> Result<Transcoded, CodecError> {
            match &self.0 {
                Ok(s) => Ok(Transcoded::Replacement {
                    content: s.clone(),
                    classification: None,
                }),
                Err(()) => Err(CodecError::Unsupported("stub".into())),
            }
        }
    }

    struct Panics;

    impl SegmentTranscoder for Panics {
        fn transcode(&self, _candidate: &str, _quality: u8) -> Result<Transcoded, CodecError> {
            panic!("decoder bug")
        }
    }

    struct Sleeps(u64);

    impl SegmentTranscoder for Sleeps {
        fn transcode(&self, _candidate: &str, _quality: u8) -> Result<Transcoded, CodecError> {
            std::thread::sleep(Duration::from_millis(self.0));
            Ok(Transcoded::Replacement {
                content: "\"x\"".to_string(),
                classification: None,
            })
        }
    }

    fn candidate() -> Segment {
        Segment::new(1, "\"data:image/png;base64,Zm9vYmFy\"")
    }

    #[test]
    fn smaller_replacement_is_kept() {
        let r = execute_job(&fixed("\"x\""), candidate(), 33);
        assert_eq!(r.segment.content, "\"x\"");
        let report = r.report.unwrap();
        assert_eq!(report.outcome, SegmentOutcome::Replaced);
        assert_eq!(report.output_len, 3);
    }

    #[test]
    fn equal_or_larger_replacement_is_discarded() {
        let original = candidate();
        let same = "x".repeat(original.content.len());
        let r = execute_job(&fixed(&same), original.clone(), 33);
        assert_eq!(r.segment, original);
        assert_eq!(r.report.unwrap().outcome, SegmentOutcome::NotSmaller);

        let longer = format!("{}!!", original.content);
        let r = execute_job(&fixed(&longer), original.clone(), 33);
        assert_eq!(r.segment, original);
    }

    #[test]
    fn codec_error_keeps_original() {
        let original = candidate();
        let r = execute_job(&Fixed(Err(())), original.clone(), 33);
        assert_eq!(r.segment, original);
        let report = r.report.unwrap();
        assert_eq!(report.outcome, SegmentOutcome::Failed);
        assert!(matches!(report.error, Some(SegmentError::Decode { index: 1, .. })));
    }

    #[test]
    fn codec_panic_keeps_original() {
        let original = candidate();
        let r = execute_job(&Panics, original.clone(), 33);
        assert_eq!(r.segment, original);
        assert!(matches!(
            r.report.unwrap().error,
            Some(SegmentError::WorkerFailed { .. })
        ));
    }

    #[tokio::test]
    async fn literals_bypass_the_pool() {
        let pool = WorkerPool::new(2).unwrap();
        let transcoder: Arc<dyn SegmentTranscoder> = Arc::new(fixed("\"x\""));
        let config = CompressionConfig::default();

        let segments = extract("no images here");
        let results = dispatch(&pool, &transcoder, segments, &config).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].report.is_none());
        assert_eq!(pool.stats().completed, 0);
    }

    #[tokio::test]
    async fn one_job_per_candidate() {
        let pool = WorkerPool::new(2).unwrap();
        let transcoder: Arc<dyn SegmentTranscoder> = Arc::new(fixed("\"x\""));
        let config = CompressionConfig::default();

        let doc = "a 'data:image/png;base64,QUJD' b 'data:image/gif;base64,REVG' c";
        let results = dispatch(&pool, &transcoder, extract(doc), &config)
            .await
            .unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results.iter().filter(|r| r.report.is_some()).count(), 2);
        assert_eq!(pool.stats().completed, 2);
    }

    #[tokio::test]
    async fn slow_job_times_out_and_keeps_original() {
        let pool = WorkerPool::new(1).unwrap();
        let transcoder: Arc<dyn SegmentTranscoder> = Arc::new(Sleeps(3_000));
        let config = CompressionConfig::builder()
            .workers(1)
            .job_timeout_secs(1)
            .build()
            .unwrap();

        let doc = "a 'data:image/png;base64,QUJDREVG' b";
        let started = Instant::now();
        let results = dispatch(&pool, &transcoder, extract(doc), &config)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(2_500));

        let timed_out = results.iter().find(|r| r.report.is_some()).unwrap();
        assert_eq!(timed_out.segment.content, "'data:image/png;base64,QUJDREVG'");
        let report = timed_out.report.as_ref().unwrap();
        assert_eq!(report.outcome, SegmentOutcome::Failed);
        assert_eq!(report.error, Some(SegmentError::Timeout { index: 1, secs: 1 }));

        // The abandoned job still occupies its worker.
        assert_eq!(pool.stats().busy, 1);
    }
}
