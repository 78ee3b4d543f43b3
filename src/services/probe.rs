use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::InspectConfig;

/// Sentinel recorded when a field has no bracketed value in the tool output.
pub const NOT_AVAILABLE: &str = "not available";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Inspection tool not found at {0}")]
    ToolNotFound(PathBuf),

    #[error("Inspection of field {field} timed out after {seconds} seconds")]
    Timeout { field: String, seconds: u64 },

    #[error("Failed to stage file for inspection: {0}")]
    Staging(#[from] std::io::Error),
}

/// Runs the external `dcmdump` tool once per configured field against a staged
/// copy of the uploaded file and collects the bracketed values.
pub struct ProbeService {
    config: InspectConfig,
    staging_root: PathBuf,
}

impl ProbeService {
    #[must_use]
    pub fn new(config: InspectConfig, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            staging_root: staging_root.into(),
        }
    }

    pub async fn probe(
        &self,
        filename: &str,
        content: &[u8],
    ) -> Result<BTreeMap<String, String>, ProbeError> {
        let tool = Path::new(&self.config.dcmdump_path);
        if !tool.exists() {
            error!("dcmdump executable missing at {}", tool.display());
            return Err(ProbeError::ToolNotFound(tool.to_path_buf()));
        }

        let probe_dir = self.staging_root.join(format!("probe-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&probe_dir).await?;

        let staged_name = Path::new(filename)
            .file_name()
            .map_or_else(|| "upload.dcm".into(), std::ffi::OsStr::to_os_string);
        let staged_path = probe_dir.join(staged_name);

        let result = match tokio::fs::write(&staged_path, content).await {
            Ok(()) => self.inspect_fields(tool, &staged_path).await,
            Err(e) => Err(ProbeError::Staging(e)),
        };

        if let Err(e) = tokio::fs::remove_dir_all(&probe_dir).await {
            warn!(
                "Failed to remove probe directory {}: {e}",
                probe_dir.display()
            );
        }

        result
    }

    async fn inspect_fields(
        &self,
        tool: &Path,
        staged_path: &Path,
    ) -> Result<BTreeMap<String, String>, ProbeError> {
        let mut values = BTreeMap::new();

        for field in &self.config.fields {
            // kill_on_drop: a timed-out invocation must not stay alive past
            // the removal of its staged file.
            let invocation = Command::new(tool)
                .args(["+P", field])
                .arg(staged_path)
                .kill_on_drop(true)
                .output();

            let output = tokio::time::timeout(
                Duration::from_secs(self.config.timeout_seconds),
                invocation,
            )
            .await
            .map_err(|_| ProbeError::Timeout {
                field: field.clone(),
                seconds: self.config.timeout_seconds,
            })??;

            let stdout = String::from_utf8_lossy(&output.stdout);
            let value = extract_bracketed(&stdout)
                .map_or_else(|| NOT_AVAILABLE.to_string(), str::to_string);

            debug!("Probed {field}: {value}");
            values.insert(field.clone(), value);
        }

        Ok(values)
    }
}

/// The inspection tool's value convention: the substring between the first
/// `[` and the first `]` of its output.
fn extract_bracketed(output: &str) -> Option<&str> {
    let start = output.find('[')? + 1;
    let end = output.find(']')?;
    if end <= start {
        return None;
    }
    Some(output[start..end].trim())
}
