//! Resource listing through the `gcloud` command-line tool

use super::ResourceFetcher;
use crate::error::FetchError;
use crate::models::{ResourceKind, ResourceRecord};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Runs `gcloud compute <kind> list --format=json` and decodes its output
#[derive(Debug, Clone)]
pub struct GcloudFetcher {
    program: PathBuf,
}

impl Default for GcloudFetcher {
    fn default() -> Self {
        Self::new("gcloud")
    }
}

impl GcloudFetcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Full argument list for one listing call
    pub fn args(project: &str, kind: ResourceKind) -> Vec<String> {
        let mut args = vec![format!("--project={}", project), "compute".to_string()];
        args.extend(kind.gcloud_args().iter().map(|a| a.to_string()));
        args.push("--format=json".to_string());
        args.push("--quiet".to_string());
        args
    }
}

#[async_trait]
impl ResourceFetcher for GcloudFetcher {
    async fn fetch(
        &self,
        project: &str,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceRecord>, FetchError> {
        let args = Self::args(project, kind);
        debug!(program = %self.program.display(), args = ?args, "Running gcloud");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|source| FetchError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(FetchError::Command {
                status: output.status.to_string(),
                output: combined.trim().to_string(),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}
