//! Experiment-tracking backend (MLflow REST API hosted by the platform).

use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

use crate::api::services::DbfsService;
use crate::api::{ApiClient, Transport};
use crate::error::{DbxError, DbxResult};

pub const DATABRICKS_TRACKING_URI: &str = "databricks";

const DBFS_SCHEME: &str = "dbfs:";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    #[serde(default)]
    pub artifact_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    #[serde(default)]
    pub experiment_id: String,
    pub artifact_uri: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    info: RunInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Finished,
    Failed,
}

impl RunStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Joins artifact path segments with `/`, skipping empty and `.` segments.
fn join_artifact_path(base: &str, parts: &[&str]) -> String {
    let mut out = base.trim_end_matches('/').to_string();
    for part in parts {
        let part = part.trim_matches('/');
        if part.is_empty() || part == "." {
            continue;
        }
        out.push('/');
        out.push_str(part);
    }
    out
}

/// Tracking client scoped to one tracking URI and, once set, one active experiment.
pub struct TrackingClient<T = ApiClient> {
    client: T,
    tracking_uri: String,
    experiment_id: Option<String>,
}

impl<T: Transport + Clone> TrackingClient<T> {
    pub fn new(client: T, tracking_uri: impl Into<String>) -> Self {
        Self {
            client,
            tracking_uri: tracking_uri.into(),
            experiment_id: None,
        }
    }

    pub fn tracking_uri(&self) -> &str {
        &self.tracking_uri
    }

    pub fn active_experiment_id(&self) -> Option<&str> {
        self.experiment_id.as_deref()
    }

    fn require_experiment(&self) -> DbxResult<&str> {
        self.experiment_id
            .as_deref()
            .ok_or_else(|| DbxError::UnexpectedResponse("no active experiment".to_string()))
    }

    pub async fn get_experiment_by_name(&self, name: &str) -> DbxResult<Option<Experiment>> {
        let result = self
            .client
            .perform_query(
                Method::GET,
                "/mlflow/experiments/get-by-name",
                Some(json!({ "experiment_name": name })),
            )
            .await;

        match result {
            Ok(mut body) => match body.get_mut("experiment").map(Value::take) {
                Some(experiment) => Ok(Some(serde_json::from_value(experiment)?)),
                None => Ok(None),
            },
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn create_experiment(&self, name: &str, artifact_location: &str) -> DbxResult<String> {
        let body = self
            .client
            .perform_query(
                Method::POST,
                "/mlflow/experiments/create",
                Some(json!({ "name": name, "artifact_location": artifact_location })),
            )
            .await?;
        body.get("experiment_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DbxError::UnexpectedResponse("experiment_id missing".to_string()))
    }

    /// Makes the named experiment active; it must already exist.
    pub async fn set_experiment(&mut self, name: &str) -> DbxResult<&str> {
        let experiment = self
            .get_experiment_by_name(name)
            .await?
            .ok_or_else(|| DbxError::UnexpectedResponse(format!("experiment {name} not found")))?;
        tracing::debug!(experiment = %name, id = %experiment.experiment_id, "active experiment set");
        Ok(self.experiment_id.insert(experiment.experiment_id).as_str())
    }

    pub async fn create_run(&self) -> DbxResult<RunInfo> {
        let experiment_id = self.require_experiment()?;
        let body = self
            .client
            .perform_query(
                Method::POST,
                "/mlflow/runs/create",
                Some(json!({ "experiment_id": experiment_id, "start_time": now_millis() })),
            )
            .await?;
        let run = body
            .get("run")
            .cloned()
            .ok_or_else(|| DbxError::UnexpectedResponse("run missing".to_string()))?;
        let RunEnvelope { info } = serde_json::from_value(run)?;
        Ok(info)
    }

    pub async fn set_tag(&self, run: &RunInfo, key: &str, value: &str) -> DbxResult<()> {
        self.client
            .perform_query(
                Method::POST,
                "/mlflow/runs/set-tag",
                Some(json!({ "run_id": run.run_id, "key": key, "value": value })),
            )
            .await?;
        Ok(())
    }

    pub async fn end_run(&self, run: &RunInfo, status: RunStatus) -> DbxResult<()> {
        self.client
            .perform_query(
                Method::POST,
                "/mlflow/runs/update",
                Some(json!({
                    "run_id": run.run_id,
                    "status": status.as_str(),
                    "end_time": now_millis(),
                })),
            )
            .await?;
        Ok(())
    }

    /// Runs of the active experiment matching `filter`, newest first.
    pub async fn search_runs(&self, filter: &str, max_results: u32) -> DbxResult<Vec<RunInfo>> {
        let experiment_id = self.require_experiment()?;
        let body = self
            .client
            .perform_query(
                Method::POST,
                "/mlflow/runs/search",
                Some(json!({
                    "experiment_ids": [experiment_id],
                    "filter": filter,
                    "max_results": max_results,
                    "order_by": ["attribute.start_time DESC"],
                })),
            )
            .await?;

        let runs = match body.get("runs") {
            Some(Value::Array(runs)) => runs.clone(),
            _ => Vec::new(),
        };
        runs.into_iter()
            .map(|run| -> DbxResult<RunInfo> {
                let RunEnvelope { info } = serde_json::from_value(run)?;
                Ok(info)
            })
            .collect()
    }

    /// Uploads `local_path` under `<artifact_uri>/<artifact_path>/<file name>`
    /// and returns the destination URI.
    pub async fn log_artifact(
        &self,
        run: &RunInfo,
        local_path: &Path,
        artifact_path: &str,
    ) -> DbxResult<String> {
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                DbxError::UnsupportedArtifactUri(local_path.display().to_string())
            })?;
        let destination = join_artifact_path(&run.artifact_uri, &[artifact_path, &file_name]);
        let dbfs_path = destination
            .strip_prefix(DBFS_SCHEME)
            .ok_or_else(|| DbxError::UnsupportedArtifactUri(run.artifact_uri.clone()))?;

        let contents = fs::read(local_path)?;
        DbfsService::new(self.client.clone())
            .put(dbfs_path, &contents, true)
            .await?;
        Ok(destination)
    }
}
