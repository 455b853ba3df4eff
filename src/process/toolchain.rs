//! Discovery of the external tools the pipeline depends on.

use super::ProcessLaunchError;

/// Resolved locations of the downloader and transcoder executables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub downloader: String,
    pub transcoder: String,
}

impl Toolchain {
    /// Use the given programs as-is, without checking that they exist
    pub fn new(downloader: impl Into<String>, transcoder: impl Into<String>) -> Self {
        Self {
            downloader: downloader.into(),
            transcoder: transcoder.into(),
        }
    }

    /// Resolve both tools through `PATH` (or as explicit paths).
    ///
    /// Fails on the first tool that cannot be found, since no job could
    /// succeed without it.
    pub fn locate(downloader: &str, transcoder: &str) -> Result<Self, ProcessLaunchError> {
        Ok(Self {
            downloader: find_tool(downloader)?,
            transcoder: find_tool(transcoder)?,
        })
    }
}

fn find_tool(name: &str) -> Result<String, ProcessLaunchError> {
    let path = which::which(name).map_err(|e| ProcessLaunchError::not_found(name, e))?;
    tracing::debug!("Found {} at {}", name, path.display());
    Ok(path.to_string_lossy().into_owned())
}
