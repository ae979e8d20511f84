//! Compression session and top-level entry points.
//!
//! ## Why a session?
//!
//! Spawning worker threads per run would dominate small documents, and the
//! interactive use case re-submits documents repeatedly. [`Compressor`] owns
//! one pool for its lifetime, numbers every run, and keeps only the newest
//! run's output: when a user re-submits before the previous run finished, the
//! older run completes its work but is refused at publish time.
//!
//! The free functions ([`compress`], [`compress_to_file`], ...) build a
//! one-shot session for callers that process a single document.

use crate::artifact::{write_atomic, Artifact, ArtifactInfo};
use crate::config::CompressionConfig;
use crate::error::CompressError;
use crate::output::{CandidateInfo, CompressionOutput, CompressionStats, DocumentSummary};
use crate::pipeline::classify::classify;
use crate::pipeline::codec::{AvifStillEncoder, GifAnimationTranscoder};
use crate::pipeline::dispatch::dispatch;
use crate::pipeline::extract::{count_candidates, extract, DataUrl};
use crate::pipeline::input::{self, FALLBACK_FILE_NAME};
use crate::pipeline::pool::{PoolStats, WorkerPool};
use crate::pipeline::reassemble::{collect, reassemble};
use crate::pipeline::transcode::{MediaTranscoder, SegmentTranscoder};
use crate::run::{Generations, ProcessingRun, RunState};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Long-lived compression session.
///
/// # Example
/// ```rust,no_run
/// use cyoa_compressor::{CompressionConfig, Compressor};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Compressor::new(CompressionConfig::default())?;
/// let output = session.compress("project.json").await?;
/// eprintln!("{} → {}", output.stats.input_size(), output.stats.output_size());
/// session.persist_artifact("project.min.json").await?;
/// # Ok(())
/// # }
/// ```
pub struct Compressor {
    config: CompressionConfig,
    pool: WorkerPool,
    transcoder: Arc<dyn SegmentTranscoder>,
    generations: Generations,
    artifact: Mutex<Option<Artifact>>,
}

impl Compressor {
    /// Start the worker pool and wire up the transcoder.
    pub fn new(config: CompressionConfig) -> Result<Self, CompressError> {
        let pool = WorkerPool::new(config.workers)?;
        let transcoder = build_transcoder(&config);
        Ok(Self {
            config,
            pool,
            transcoder,
            generations: Generations::default(),
            artifact: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Generation of the most recently started run (0 before the first).
    pub fn current_generation(&self) -> u64 {
        self.generations.current()
    }

    /// Load `input` (path or URL) and compress it.
    pub async fn compress(&self, input: impl AsRef<str>) -> Result<CompressionOutput, CompressError> {
        let doc = input::load_document(input.as_ref(), self.config.download_timeout_secs).await?;
        debug!("Loaded {} ({} bytes)", doc.origin, doc.text.len());
        self.compress_document(&doc.text, &doc.file_name).await
    }

    /// Compress an in-memory document.
    ///
    /// Starting a run releases the previously published artifact. If another
    /// run starts before this one publishes, this one returns
    /// [`CompressError::Superseded`] and publishes nothing.
    pub async fn compress_document(
        &self,
        document: &str,
        file_name: &str,
    ) -> Result<CompressionOutput, CompressError> {
        let generation = self.generations.next();
        let mut run = ProcessingRun::new(generation);

        if self.artifact.lock().await.take().is_some() {
            debug!("Run #{}: released previous artifact", generation);
        }
        info!(
            "Run #{}: compressing {} ({} bytes)",
            generation,
            file_name,
            document.len()
        );

        // ── Split ────────────────────────────────────────────────────────
        run.advance(RunState::Splitting);
        let segments = extract(document);
        run.total_segments = segments.len();
        run.candidates = count_candidates(&segments);
        debug!(
            "Run #{}: {} segments, {} candidates",
            generation, run.total_segments, run.candidates
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_start(run.candidates);
        }

        // ── Dispatch and collect ─────────────────────────────────────────
        run.advance(RunState::Dispatching);
        let results = dispatch(&self.pool, &self.transcoder, segments, &self.config).await?;
        run.advance(RunState::Collecting);
        let (segments, reports) = collect(results);

        // ── Reassemble ───────────────────────────────────────────────────
        run.advance(RunState::Reassembling);
        let output_document = reassemble(segments);

        let mut stats = CompressionStats {
            input_bytes: document.len() as u64,
            output_bytes: output_document.len() as u64,
            total_segments: run.total_segments,
            ..Default::default()
        };
        stats.tally(&reports);
        stats.elapsed_ms = run.elapsed().as_millis() as u64;

        // ── Publish ──────────────────────────────────────────────────────
        // Written before taking the lock; a superseded run drops (and deletes) it.
        let artifact =
            Artifact::create(&output_document, file_name, generation, stats.input_bytes).await?;
        let mut slot = self.artifact.lock().await;
        if !self.generations.is_current(generation) {
            let current = self.generations.current();
            run.advance(RunState::Superseded);
            warn!(
                "Run #{} superseded by run #{}; discarding result",
                generation, current
            );
            return Err(CompressError::Superseded {
                generation,
                current,
            });
        }
        *slot = Some(artifact);
        drop(slot);
        run.advance(RunState::Done);

        info!(
            "Run #{} complete: {} → {} ({} replaced, {} kept, {} failed) in {}",
            generation,
            stats.input_size(),
            stats.output_size(),
            stats.replaced,
            stats.not_smaller + stats.passed_through,
            stats.failed,
            stats.elapsed()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_complete(&stats);
        }

        Ok(CompressionOutput {
            document: output_document,
            file_name: file_name.to_string(),
            generation,
            segments: reports,
            stats,
        })
    }

    /// Describe the published artifact, if any.
    pub async fn artifact(&self) -> Option<ArtifactInfo> {
        self.artifact.lock().await.as_ref().map(Artifact::info)
    }

    /// Read the published document back from its temporary file.
    pub async fn read_artifact(&self) -> Result<String, CompressError> {
        match self.artifact.lock().await.as_ref() {
            Some(a) => a.read().await,
            None => Err(CompressError::NoArtifact),
        }
    }

    /// Delete the published artifact. Returns whether there was one.
    pub async fn release_artifact(&self) -> bool {
        let released = self.artifact.lock().await.take().is_some();
        if released {
            debug!("Artifact released");
        }
        released
    }

    /// Copy the published artifact to `path` (atomic write).
    pub async fn persist_artifact(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<ArtifactInfo, CompressError> {
        let guard = self.artifact.lock().await;
        let artifact = guard.as_ref().ok_or(CompressError::NoArtifact)?;
        artifact.persist_to(path.as_ref()).await?;
        info!("Saved {} to {}", artifact.file_name(), path.as_ref().display());
        Ok(artifact.info())
    }
}

fn build_transcoder(config: &CompressionConfig) -> Arc<dyn SegmentTranscoder> {
    if let Some(ref t) = config.transcoder {
        return Arc::clone(t);
    }
    let still = config
        .still_encoder
        .clone()
        .unwrap_or_else(|| Arc::new(AvifStillEncoder { speed: config.speed }));
    let animated = config
        .animated_transcoder
        .clone()
        .unwrap_or_else(|| Arc::new(GifAnimationTranscoder));
    Arc::new(MediaTranscoder::new(still, animated))
}

// ── One-shot entry points ────────────────────────────────────────────────

/// Compress a story file or URL.
///
/// # Errors
/// Returns `Err(CompressError)` only for fatal errors (unreadable input,
/// non-UTF-8 text, pool startup). Images that fail to re-encode keep their
/// original bytes and are reported in `output.segments`.
pub async fn compress(
    input: impl AsRef<str>,
    config: &CompressionConfig,
) -> Result<CompressionOutput, CompressError> {
    Compressor::new(config.clone())?.compress(input).await
}

/// Compress a document already in memory.
pub async fn compress_str(
    document: &str,
    config: &CompressionConfig,
) -> Result<CompressionOutput, CompressError> {
    Compressor::new(config.clone())?
        .compress_document(document, FALLBACK_FILE_NAME)
        .await
}

/// Compress and write the result directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn compress_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &CompressionConfig,
) -> Result<CompressionStats, CompressError> {
    let output = compress(input, config).await?;
    write_atomic(output_path.as_ref(), output.document.as_bytes()).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`compress`].
///
/// Creates a temporary tokio runtime internally.
pub fn compress_sync(
    input: impl AsRef<str>,
    config: &CompressionConfig,
) -> Result<CompressionOutput, CompressError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CompressError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(compress(input, config))
}

/// List the embedded images without encoding anything.
///
/// `download_timeout_secs` applies when `input` is a URL.
pub async fn inspect(
    input: impl AsRef<str>,
    download_timeout_secs: u64,
) -> Result<DocumentSummary, CompressError> {
    let doc = input::load_document(input.as_ref(), download_timeout_secs).await?;
    debug!("Inspecting {}", doc.origin);
    Ok(summarize(&doc.text, &doc.file_name))
}

/// Split `document` and classify every candidate.
pub fn summarize(document: &str, file_name: &str) -> DocumentSummary {
    let segments = extract(document);
    let candidates = segments
        .iter()
        .filter(|s| s.is_candidate)
        .map(|s| {
            let classification = classify(&s.content);
            let declared_mime = DataUrl::parse(&s.content)
                .map(|u| format!("image/{}", u.subtype))
                .unwrap_or_default();
            CandidateInfo {
                index: s.index,
                declared_mime,
                family: classification.family,
                kind: classification.kind,
                encoded_len: s.content.len(),
            }
        })
        .collect();

    DocumentSummary {
        file_name: file_name.to_string(),
        input_bytes: document.len() as u64,
        total_segments: segments.len(),
        candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::pipeline::transcode::Transcoded;

    /// Replaces every candidate with a short marker.
    struct Shrink;

    impl SegmentTranscoder for Shrink {
        fn transcode(&self, candidate: &str, _quality: u8) -> Result<Transcoded, CodecError> {
            let quote = candidate.chars().next().unwrap_or('"');
            Ok(Transcoded::Replacement {
                content: format!("{quote}x{quote}"),
                classification: None,
            })
        }
    }

    fn session() -> Compressor {
        let config = CompressionConfig::builder()
            .workers(2)
            .transcoder(Arc::new(Shrink))
            .build()
            .unwrap();
        Compressor::new(config).unwrap()
    }

    #[tokio::test]
    async fn publishes_an_artifact() {
        let s = session();
        let out = s
            .compress_document("a \"data:image/png;base64,QUJDRA==\" b", "p.json")
            .await
            .unwrap();
        assert_eq!(out.document, "a \"x\" b");
        assert_eq!(out.generation, 1);
        assert_eq!(s.read_artifact().await.unwrap(), "a \"x\" b");
        assert_eq!(s.artifact().await.unwrap().file_name, "p.json");
    }

    #[tokio::test]
    async fn next_run_releases_previous_artifact() {
        let s = session();
        s.compress_document("one", "a.json").await.unwrap();
        let first = s.artifact().await.unwrap().path;
        assert!(first.exists());

        s.compress_document("two", "b.json").await.unwrap();
        assert!(!first.exists());
        assert_eq!(s.artifact().await.unwrap().generation, 2);
    }

    #[tokio::test]
    async fn release_and_persist_without_artifact() {
        let s = session();
        assert!(!s.release_artifact().await);
        let err = s.persist_artifact("/tmp/never.json").await.unwrap_err();
        assert!(matches!(err, CompressError::NoArtifact));
    }

    #[test]
    fn summarize_lists_candidates() {
        let doc = "x 'data:image/jpeg;base64,/9j/4AAQ' y";
        let summary = summarize(doc, "p.json");
        assert_eq!(summary.total_segments, 3);
        assert_eq!(summary.candidates.len(), 1);
        assert_eq!(summary.candidates[0].index, 1);
        assert_eq!(summary.candidates[0].declared_mime, "image/jpeg");
    }
}
