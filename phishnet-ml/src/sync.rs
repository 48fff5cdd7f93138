//! One-way mirror of a run's artifacts to remote storage.
//!
//! The run root goes to `<target>/artifact/<timestamp>` and the final model
//! directory to `<target>/final_model/<timestamp>`. `s3://` targets shell out
//! to `aws s3 sync`; `file://` targets are copied locally.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::layout::ArtifactLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Where a run is mirrored to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorTarget {
    S3 { bucket: String },
    Local { root: PathBuf },
}

impl MirrorTarget {
    pub fn parse(uri: &str) -> Result<Self, SyncError> {
        if let Some(rest) = uri.strip_prefix("s3://") {
            let bucket = rest.trim_end_matches('/');
            if bucket.is_empty() {
                return Err(SyncError::UnsupportedTarget(uri.to_string()));
            }
            return Ok(Self::S3 {
                bucket: format!("s3://{bucket}"),
            });
        }
        if let Some(rest) = uri.strip_prefix("file://") {
            if rest.is_empty() {
                return Err(SyncError::UnsupportedTarget(uri.to_string()));
            }
            return Ok(Self::Local {
                root: PathBuf::from(rest),
            });
        }
        Err(SyncError::UnsupportedTarget(uri.to_string()))
    }

    /// Destination for `<kind>/<timestamp>` under this target.
    pub fn destination(&self, kind: &str, timestamp: &str) -> String {
        match self {
            Self::S3 { bucket } => format!("{bucket}/{kind}/{timestamp}"),
            Self::Local { root } => root.join(kind).join(timestamp).display().to_string(),
        }
    }
}

/// Where a successful mirror put things.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub artifact_destination: String,
    pub model_destination: String,
}

/// What happened to the mirror step of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced(SyncReport),
    Disabled,
    Failed { error: String },
}

impl SyncOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced(_))
    }
}

pub struct ArtifactSync {
    config: SyncConfig,
}

impl ArtifactSync {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    /// Mirror the run root and the final model directory.
    pub async fn mirror_run(&self, layout: &ArtifactLayout) -> Result<SyncReport, SyncError> {
        let uri = self
            .config
            .target_uri
            .as_deref()
            .ok_or_else(|| SyncError::UnsupportedTarget("<unset>".to_string()))?;
        let target = MirrorTarget::parse(uri)?;
        let artifact_destination = target.destination("artifact", layout.timestamp());
        let model_destination = target.destination("final_model", layout.timestamp());

        self.sync_folder(&target, layout.run_root(), &artifact_destination)
            .await?;
        self.sync_folder(&target, layout.model_dir(), &model_destination)
            .await?;

        info!(
            artifacts = %artifact_destination,
            model = %model_destination,
            "Run mirrored"
        );
        Ok(SyncReport {
            artifact_destination,
            model_destination,
        })
    }

    pub async fn sync_folder(
        &self,
        target: &MirrorTarget,
        local: &Path,
        destination: &str,
    ) -> Result<(), SyncError> {
        if !local.is_dir() {
            return Err(SyncError::MissingDirectory(local.to_path_buf()));
        }
        match target {
            MirrorTarget::S3 { .. } => self.aws_sync(local, destination).await,
            MirrorTarget::Local { .. } => {
                let from = local.to_path_buf();
                let to = PathBuf::from(destination);
                let copied = tokio::task::spawn_blocking(move || copy_tree(&from, &to))
                    .await
                    .map_err(|e| SyncError::Io(std::io::Error::other(e)))??;
                debug!(files = copied, destination, "Local mirror copied");
                Ok(())
            }
        }
    }

    async fn aws_sync(&self, local: &Path, destination: &str) -> Result<(), SyncError> {
        let command = format!(
            "{} s3 sync {} {destination}",
            self.config.aws_cli,
            local.display()
        );
        let secs = self.config.timeout_secs;
        debug!(%command, "Running mirror command");

        let result = tokio::time::timeout(Duration::from_secs(secs), async {
            Command::new(&self.config.aws_cli)
                .args(["s3", "sync"])
                .arg(local)
                .arg(destination)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output()
                .await
        })
        .await;

        let output = match result {
            Ok(output) => output?,
            Err(_) => return Err(SyncError::Timeout { command, secs }),
        };
        if !output.status.success() {
            return Err(SyncError::CommandFailed {
                command,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Copy every file under `from` into `to`, keeping relative paths.
fn copy_tree(from: &Path, to: &Path) -> Result<usize, SyncError> {
    let mut copied = 0;
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(std::io::Error::other)?;
        let dest = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &dest)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use chrono::Utc;
    use tempfile::TempDir;

    fn populated_layout(dir: &TempDir) -> ArtifactLayout {
        let mut config = PipelineConfig::default();
        config.artifacts.artifact_dir = dir.path().join("artifacts");
        config.artifacts.model_dir = dir.path().join("final_model");
        let layout = ArtifactLayout::new(&config, &Utc::now());
        std::fs::create_dir_all(layout.drift_report_path().parent().unwrap()).unwrap();
        std::fs::write(layout.drift_report_path(), "a: {}\n").unwrap();
        std::fs::create_dir_all(layout.model_dir()).unwrap();
        std::fs::write(layout.final_model_path(), "{}").unwrap();
        layout
    }

    #[test]
    fn test_parse_targets() {
        assert_eq!(
            MirrorTarget::parse("s3://bucket/").unwrap(),
            MirrorTarget::S3 {
                bucket: "s3://bucket".into()
            }
        );
        assert_eq!(
            MirrorTarget::parse("file:///tmp/mirror").unwrap(),
            MirrorTarget::Local {
                root: PathBuf::from("/tmp/mirror")
            }
        );
        assert!(matches!(
            MirrorTarget::parse("gs://bucket"),
            Err(SyncError::UnsupportedTarget(_))
        ));
        assert_eq!(
            MirrorTarget::parse("s3://b").unwrap().destination("artifact", "ts"),
            "s3://b/artifact/ts"
        );
    }

    #[tokio::test]
    async fn test_local_mirror_copies_run_and_model() {
        let dir = TempDir::new().unwrap();
        let layout = populated_layout(&dir);
        let mirror = dir.path().join("mirror");
        let sync = ArtifactSync::new(SyncConfig {
            enabled: true,
            target_uri: Some(format!("file://{}", mirror.display())),
            ..SyncConfig::default()
        });

        let report = sync.mirror_run(&layout).await.unwrap();
        let ts = layout.timestamp();
        assert_eq!(
            PathBuf::from(&report.artifact_destination),
            mirror.join("artifact").join(ts)
        );
        assert!(
            mirror
                .join("artifact")
                .join(ts)
                .join("data_validation")
                .join("drift_report.yaml")
                .exists()
        );
        assert!(mirror.join("final_model").join(ts).join("model.bin").exists());
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let sync = ArtifactSync::new(SyncConfig::default());
        let target = MirrorTarget::Local {
            root: dir.path().join("out"),
        };
        let err = sync
            .sync_folder(&target, &dir.path().join("absent"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingDirectory(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_cli_is_reported() {
        let dir = TempDir::new().unwrap();
        let layout = populated_layout(&dir);
        let sync = ArtifactSync::new(SyncConfig {
            enabled: true,
            target_uri: Some("s3://bucket".into()),
            aws_cli: "false".into(),
            timeout_secs: 10,
        });
        let err = sync.mirror_run(&layout).await.unwrap_err();
        assert!(matches!(err, SyncError::CommandFailed { status: 1, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_succeeding_cli() {
        let dir = TempDir::new().unwrap();
        let layout = populated_layout(&dir);
        let sync = ArtifactSync::new(SyncConfig {
            enabled: true,
            target_uri: Some("s3://bucket".into()),
            aws_cli: "true".into(),
            timeout_secs: 10,
        });
        let report = sync.mirror_run(&layout).await.unwrap();
        assert_eq!(
            report.model_destination,
            format!("s3://bucket/final_model/{}", layout.timestamp())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_cli_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let layout = populated_layout(&dir);
        let script = dir.path().join("slow-aws");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let sync = ArtifactSync::new(SyncConfig {
            enabled: true,
            target_uri: Some("s3://bucket".into()),
            aws_cli: script.display().to_string(),
            timeout_secs: 1,
        });
        let err = sync.mirror_run(&layout).await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout { secs: 1, .. }));
    }
}
