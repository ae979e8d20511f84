//! Published output of the most recent run.
//!
//! An [`Artifact`] owns a temporary file holding the compressed document. The
//! file is deleted when the artifact is dropped, so releasing it is just
//! dropping it. [`Artifact::persist_to`] copies it elsewhere with an atomic
//! temp-then-rename write.

use crate::error::CompressError;
use crate::output::format_size;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use tracing::debug;

/// Temporary on-disk copy of a run's output document.
#[derive(Debug)]
pub struct Artifact {
    path: TempPath,
    file_name: String,
    generation: u64,
    input_bytes: u64,
    output_bytes: u64,
}

/// Serialisable description of an [`Artifact`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub generation: u64,
    pub input_size: String,
    pub output_size: String,
    pub display_text: String,
}

impl Artifact {
    /// Write `document` to a fresh temporary file.
    ///
    /// The file is removed again if the write fails.
    pub async fn create(
        document: &str,
        file_name: impl Into<String>,
        generation: u64,
        input_bytes: u64,
    ) -> Result<Self, CompressError> {
        let path = NamedTempFile::new()
            .map_err(|e| CompressError::Internal(format!("tempfile: {e}")))?
            .into_temp_path();
        tokio::fs::write(&path, document.as_bytes())
            .await
            .map_err(|e| CompressError::Internal(format!("tempfile write: {e}")))?;
        debug!("Artifact for run #{} at {}", generation, path.display());

        Ok(Self {
            path,
            file_name: file_name.into(),
            generation,
            input_bytes,
            output_bytes: document.len() as u64,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn output_bytes(&self) -> u64 {
        self.output_bytes
    }

    /// e.g. `project.json: 12.40 MiB → 3.10 MiB`
    pub fn display_text(&self) -> String {
        format!(
            "{}: {} → {}",
            self.file_name,
            format_size(self.input_bytes),
            format_size(self.output_bytes)
        )
    }

    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            path: self.path.to_path_buf(),
            file_name: self.file_name.clone(),
            generation: self.generation,
            input_size: format_size(self.input_bytes),
            output_size: format_size(self.output_bytes),
            display_text: self.display_text(),
        }
    }

    /// Read the document back.
    pub async fn read(&self) -> Result<String, CompressError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CompressError::Internal(format!("artifact read: {e}")))
    }

    /// Copy the document to `dest` atomically.
    pub async fn persist_to(&self, dest: &Path) -> Result<(), CompressError> {
        let write_err = |source| CompressError::OutputWriteFailed {
            path: dest.to_path_buf(),
            source,
        };
        prepare_parent(dest).await?;
        let tmp = tmp_path(dest);
        tokio::fs::copy(&self.path, &tmp).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, dest).await.map_err(write_err)?;
        Ok(())
    }
}

/// Write `contents` to `path` via a sibling `.tmp` file and a rename.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CompressError> {
    let write_err = |source| CompressError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    prepare_parent(path).await?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(write_err)?;
    Ok(())
}

async fn prepare_parent(path: &Path) -> Result<(), CompressError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CompressError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
