//! Decoding finished generations and writing them to disk.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::HordeClient;
use crate::error::{HordeError, Result};
use crate::transport::TransportRequest;
use crate::types::{Generation, JobResult};

/// How generation files are named: `{base}_{index}.{extension}`.
///
/// # Example
/// ```
/// use stablehorde_rs::OutputNaming;
/// use std::path::PathBuf;
///
/// let naming = OutputNaming::new("out/castle");
/// assert_eq!(naming.path_for(0), PathBuf::from("out/castle_0.webp"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OutputNaming {
    base: PathBuf,
    extension: String,
}

impl OutputNaming {
    /// Files named `{base}_{index}.webp`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            extension: "webp".to_string(),
        }
    }

    /// Files named after the current Unix time inside `dir`.
    pub fn timestamped(dir: impl AsRef<Path>) -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::new(dir.as_ref().join(secs.to_string()))
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of the file for generation `index`.
    pub fn path_for(&self, index: usize) -> PathBuf {
        let mut name: OsString = self.base.clone().into_os_string();
        name.push(format!("_{}.{}", index, self.extension));
        PathBuf::from(name)
    }
}

/// Write `bytes` to `path` through a temporary sibling, so `path` only ever
/// holds a complete file.
async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    if let Err(e) = tokio::fs::write(&partial, bytes).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&partial, path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }
    Ok(())
}

impl HordeClient {
    /// Raw image bytes for one generation.
    ///
    /// In link-mode `img` is a URL and is downloaded; otherwise it is
    /// base64 and decoded.
    pub async fn image_bytes(&self, generation: &Generation, link_mode: bool) -> Result<Vec<u8>> {
        if link_mode {
            let resp = self.send(TransportRequest::get(generation.img.as_str())).await?;
            if !resp.is_success() {
                return Err(HordeError::UnexpectedResponse {
                    status: resp.status,
                });
            }
            Ok(resp.body)
        } else {
            Ok(STANDARD.decode(generation.img.trim())?)
        }
    }

    /// Decode and save every generation of `result`, in order.
    ///
    /// Each file is independent: when generation `i` fails, files
    /// `0..i` stay on disk and the error is a
    /// [`HordeError::WriteFailure`] naming `i` and listing them.
    /// Cancellation is checked before each generation; a write already
    /// started always completes.
    pub async fn save_generations(
        &self,
        result: &JobResult,
        link_mode: bool,
        naming: &OutputNaming,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(result.generations.len());

        for (index, generation) in result.generations.iter().enumerate() {
            let path = naming.path_for(index);

            if cancel.is_some_and(|c| c.is_cancelled()) {
                info!(index, "Saving cancelled");
                return Err(HordeError::WriteFailure {
                    index,
                    path,
                    written,
                    source: Box::new(HordeError::Cancelled),
                });
            }

            let saved = match self.image_bytes(generation, link_mode).await {
                Ok(bytes) => write_file(&path, &bytes).await.map_err(HordeError::Io),
                Err(e) => Err(e),
            };

            match saved {
                Ok(()) => {
                    debug!(
                        index,
                        path = %path.display(),
                        worker = %generation.worker_name,
                        model = %generation.model,
                        seed = %generation.seed,
                        "Saved generation"
                    );
                    written.push(path);
                }
                Err(e) => {
                    warn!(index, path = %path.display(), error = %e, "Failed to save generation");
                    return Err(HordeError::WriteFailure {
                        index,
                        path,
                        written,
                        source: Box::new(e),
                    });
                }
            }
        }

        info!(count = written.len(), "Saved generations");
        Ok(written)
    }
}
