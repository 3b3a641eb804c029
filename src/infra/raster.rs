//! Raster derivatives of the sponsor wall.
//!
//! Conversion shells out to an external ImageMagick `convert` binary; the
//! output is written to a temporary file next to the destination and
//! persisted only on success, so a failed conversion never leaves a partial
//! artifact behind.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    process::Stdio,
    time::Instant,
};

use metrics::histogram;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            RasterFormat::Png => "sponsors.png",
            RasterFormat::Jpeg => "sponsors.jpg",
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            RasterFormat::Png => ".png",
            RasterFormat::Jpeg => ".jpg",
        }
    }

    fn background(&self) -> &'static str {
        match self {
            RasterFormat::Png => "transparent",
            RasterFormat::Jpeg => "white",
        }
    }
}

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to prepare raster output: {0}")]
    Io(#[from] io::Error),
    #[error("convert invocation failed (exit {exit_code:?}): {stderr}")]
    Cli {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("convert binary unavailable: {0}")]
    NotFound(io::Error),
}

#[derive(Debug, Clone)]
pub struct RasterConverter {
    convert_path: PathBuf,
    quality: u8,
}

impl RasterConverter {
    pub fn new(convert_path: PathBuf, quality: u8) -> Self {
        Self {
            convert_path,
            quality,
        }
    }

    /// Render `svg_path` into `out_path` in the requested format.
    pub async fn convert(
        &self,
        svg_path: &Path,
        out_path: &Path,
        format: RasterFormat,
    ) -> Result<(), RasterError> {
        let started_at = Instant::now();
        let parent = out_path.parent().unwrap_or_else(|| Path::new("."));

        let staging = tempfile::Builder::new()
            .prefix("raster")
            .suffix(format.suffix())
            .tempfile_in(parent)?;
        let staging_path = staging.path().to_path_buf();

        let output = Command::new(&self.convert_path)
            .arg("-background")
            .arg(format.background())
            .arg("-quality")
            .arg(self.quality.to_string())
            .arg(svg_path)
            .arg(&staging_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| {
                warn!(
                    target: "mecenate::raster",
                    convert = %self.convert_path.display(),
                    error = %err,
                    "failed to spawn convert"
                );
                if err.kind() == ErrorKind::NotFound {
                    RasterError::NotFound(err)
                } else {
                    RasterError::Io(err)
                }
            })?;

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                target: "mecenate::raster",
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                stderr = %stderr,
                "convert invocation failed"
            );
            return Err(RasterError::Cli { exit_code, stderr });
        }

        staging
            .persist(out_path)
            .map_err(|err| RasterError::Io(err.error))?;

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        histogram!("mecenate_raster_ms").record(elapsed_ms as f64);
        info!(
            target: "mecenate::raster",
            out = %out_path.display(),
            elapsed_ms,
            "raster derivative written"
        );

        Ok(())
    }
}
