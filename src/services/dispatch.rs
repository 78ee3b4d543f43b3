use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::TransferConfig;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// User-correctable: the request carried no file with a filename.
    #[error("No files selected")]
    NoFilesSelected,

    /// Configuration fault, retrying cannot succeed until the path is fixed.
    #[error("Transfer tool not found at {0}")]
    ToolNotFound(PathBuf),

    /// The tool ran (or timed out) and the batch was not delivered.
    #[error("Transfer failed: {detail}")]
    TransferFailed { detail: String },

    #[error("Failed to stage files: {0}")]
    Staging(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct DispatchOutcome {
    pub files_sent: usize,
    pub tool_output: String,
}

/// Stages an uploaded batch in a per-invocation directory and hands it to the
/// external `dcmsend` tool. The directory never outlives the call.
pub struct DispatchService {
    config: TransferConfig,
    staging_root: PathBuf,
}

impl DispatchService {
    #[must_use]
    pub fn new(config: TransferConfig, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            staging_root: staging_root.into(),
        }
    }

    pub async fn dispatch(
        &self,
        files: &[(String, Vec<u8>)],
    ) -> Result<DispatchOutcome, DispatchError> {
        if !files.iter().any(|(name, _)| !name.is_empty()) {
            return Err(DispatchError::NoFilesSelected);
        }

        // Unique per invocation: concurrent dispatches never share staging.
        let batch_dir = self.staging_root.join(format!("batch-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&batch_dir).await?;

        let result = self.run_batch(&batch_dir, files).await;

        // Scoped release: the batch directory goes away on every exit path.
        // A removal failure is logged but never changes the request outcome.
        if let Err(e) = tokio::fs::remove_dir_all(&batch_dir).await {
            warn!(
                "Failed to remove batch directory {}: {e}",
                batch_dir.display()
            );
        }

        result
    }

    async fn run_batch(
        &self,
        batch_dir: &Path,
        files: &[(String, Vec<u8>)],
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut staged = 0usize;
        for (name, content) in files {
            // Flat namespace: only the final path component is kept, and a
            // repeated filename within one batch wins with the last write.
            let Some(filename) = Path::new(name).file_name() else {
                continue;
            };
            tokio::fs::write(batch_dir.join(filename), content).await?;
            staged += 1;
        }

        if staged == 0 {
            return Err(DispatchError::NoFilesSelected);
        }

        let tool = Path::new(&self.config.dcmsend_path);
        if !tool.exists() {
            error!("dcmsend executable missing at {}", tool.display());
            return Err(DispatchError::ToolNotFound(tool.to_path_buf()));
        }

        info!(
            "Dispatching {staged} file(s) to {}:{} via {}",
            self.config.host,
            self.config.port,
            tool.display()
        );

        // kill_on_drop: a timed-out invocation must not leave the child
        // running while its batch directory is removed.
        let invocation = Command::new(tool)
            .arg("-v")
            .args(["-aet", &self.config.calling_aet])
            .args(["-aec", &self.config.called_aet])
            .arg(&self.config.host)
            .arg(self.config.port.to_string())
            .args(["--scan-directories", "--recurse"])
            .arg(batch_dir)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_seconds),
            invocation,
        )
        .await
        .map_err(|_| DispatchError::TransferFailed {
            detail: format!(
                "dcmsend did not finish within {} seconds",
                self.config.timeout_seconds
            ),
        })?
        .map_err(|e| DispatchError::TransferFailed {
            detail: format!("Failed to run dcmsend: {e}"),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(DispatchError::TransferFailed { detail });
        }

        Ok(DispatchOutcome {
            files_sent: staged,
            tool_output: stdout.into_owned(),
        })
    }
}
