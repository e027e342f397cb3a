//! Deploy workflow: build the wheel, record a tracking run, upload the
//! package as a run artifact and tag the run so it can be found later.

use std::path::{Path, PathBuf};

use crate::api::Transport;
use crate::branch::branch_name_in;
use crate::config::ProjectLayout;
use crate::echo::echo;
use crate::environment::{prepare_environment, PreparedEnvironment};
use crate::error::{DbxError, DbxResult};
use crate::filter::generate_filter_string_in;
use crate::package::{get_package_file, handle_package};
use crate::tracking::{RunInfo, RunStatus, TrackingClient};
use crate::uploader::FileUploader;

pub const ACTION_TYPE_TAG: &str = "dbx_action_type";
pub const ENVIRONMENT_TAG: &str = "dbx_environment";
pub const STATUS_TAG: &str = "dbx_status";
pub const BRANCH_NAME_TAG: &str = "dbx_branch_name";

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub environment: String,
    pub no_rebuild: bool,
    pub python: String,
    pub tags: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRecord {
    pub run_id: String,
    pub package_uri: String,
}

pub async fn deploy(layout: &ProjectLayout, options: &DeployOptions) -> DbxResult<DeploymentRecord> {
    handle_package(layout, options.no_rebuild, &options.python).await?;
    let package = get_package_file(layout).ok_or(DbxError::PackageNotFound)?;

    let prepared = prepare_environment(layout, &options.environment).await?;
    let branch = branch_name_in(layout.root());
    deploy_package(&prepared, layout.root(), &package, branch.as_deref(), options).await
}

/// Everything after the environment is prepared. `package` may be absolute
/// or relative to `project_root`; it is uploaded under its project-relative parent.
pub async fn deploy_package<T: Transport + Clone>(
    prepared: &PreparedEnvironment<T>,
    project_root: &Path,
    package: &Path,
    branch: Option<&str>,
    options: &DeployOptions,
) -> DbxResult<DeploymentRecord> {
    let tracking = &prepared.tracking;
    let run = tracking.create_run().await?;
    echo(format!("Starting deployment with run id {}", run.run_id));

    match record_deployment(prepared, &run, project_root, package, branch, options).await {
        Ok(package_uri) => {
            tracking.end_run(&run, RunStatus::Finished).await?;
            echo(format!(
                "Deployment to environment {} finished successfully",
                options.environment
            ));
            Ok(DeploymentRecord {
                run_id: run.run_id,
                package_uri,
            })
        }
        Err(e) => {
            if let Err(end_err) = tracking.end_run(&run, RunStatus::Failed).await {
                tracing::warn!(run_id = %run.run_id, error = %end_err, "failed to mark run as failed");
            }
            Err(e)
        }
    }
}

async fn record_deployment<T: Transport + Clone>(
    prepared: &PreparedEnvironment<T>,
    run: &RunInfo,
    project_root: &Path,
    package: &Path,
    branch: Option<&str>,
    options: &DeployOptions,
) -> DbxResult<String> {
    let relative = relative_to(project_root, package);
    let uploader = FileUploader::new(prepared.api_client.clone());
    let package_uri = uploader
        .upload_file(&prepared.tracking, run, project_root, &relative)
        .await?;

    let tracking = &prepared.tracking;
    tracking.set_tag(run, ACTION_TYPE_TAG, "deploy").await?;
    tracking
        .set_tag(run, ENVIRONMENT_TAG, &options.environment)
        .await?;
    tracking.set_tag(run, STATUS_TAG, "SUCCESS").await?;
    if let Some(branch) = branch {
        tracking.set_tag(run, BRANCH_NAME_TAG, branch).await?;
    }
    for (key, value) in &options.tags {
        tracking.set_tag(run, key, value).await?;
    }
    Ok(package_uri)
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Latest successful deployment to `environment` matching `tags`.
pub async fn find_latest_deployment(
    layout: &ProjectLayout,
    environment: &str,
    tags: &[(String, String)],
) -> DbxResult<Option<RunInfo>> {
    let prepared = prepare_environment(layout, environment).await?;
    let filter = generate_filter_string_in(layout.root(), environment, tags);
    find_latest_run(&prepared.tracking, &filter).await
}

/// Newest run of the active experiment matching `filter`.
pub async fn find_latest_run<T: Transport + Clone>(
    tracking: &TrackingClient<T>,
    filter: &str,
) -> DbxResult<Option<RunInfo>> {
    tracing::debug!(%filter, "searching deployment runs");
    let mut runs = tracking.search_runs(filter, 1).await?;
    Ok(if runs.is_empty() {
        None
    } else {
        Some(runs.swap_remove(0))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::ConfigType;
    use crate::filter::filter_string;
    use crate::testing::MockTransport;
    use crate::tracking::DATABRICKS_TRACKING_URI;
    use reqwest::Method;
    use serde_json::{json, Value};
    use std::fs;

    async fn prepared(transport: &MockTransport) -> PreparedEnvironment<MockTransport> {
        transport.respond(
            Method::GET,
            "/mlflow/experiments/get-by-name",
            json!({"experiment": {"experiment_id": "7", "name": "/Shared/dbx/projects/demo"}}),
        );
        let mut tracking = TrackingClient::new(transport.clone(), DATABRICKS_TRACKING_URI);
        tracking.set_experiment("/Shared/dbx/projects/demo").await.unwrap();
        PreparedEnvironment {
            api_client: transport.clone(),
            tracking,
            config_type: ConfigType::Env,
        }
    }

    fn options(tags: &[(&str, &str)]) -> DeployOptions {
        DeployOptions {
            environment: "default".to_string(),
            no_rebuild: true,
            python: "python".to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn project_with_wheel() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("dist")).unwrap();
        let wheel = dir.path().join("dist/pkg-0.1-py3-none-any.whl");
        fs::write(&wheel, b"wheel").unwrap();
        (dir, wheel)
    }

    fn route_run(transport: &MockTransport) {
        transport
            .respond(
                Method::POST,
                "/mlflow/runs/create",
                json!({"run": {"info": {
                    "run_id": "run-1",
                    "experiment_id": "7",
                    "artifact_uri": "dbfs:/dbx/demo/run-1/artifacts",
                }}}),
            )
            .respond(Method::POST, "/mlflow/runs/set-tag", json!({}))
            .respond(Method::POST, "/mlflow/runs/update", json!({}))
            .respond(Method::POST, "/dbfs/create", json!({"handle": 1}))
            .respond(Method::POST, "/dbfs/add-block", json!({}))
            .respond(Method::POST, "/dbfs/close", json!({}));
    }

    fn tag_pairs(transport: &MockTransport) -> Vec<(String, String)> {
        transport
            .calls_to("/mlflow/runs/set-tag")
            .into_iter()
            .filter_map(|call| call.data)
            .map(|data| {
                let text = |key: &str| data[key].as_str().unwrap_or_default().to_string();
                (text("key"), text("value"))
            })
            .collect()
    }

    #[tokio::test]
    async fn deploy_uploads_package_and_tags_run() {
        let (dir, wheel) = project_with_wheel();
        let transport = MockTransport::new();
        route_run(&transport);
        let prepared = prepared(&transport).await;

        let record = deploy_package(
            &prepared,
            dir.path(),
            &wheel,
            Some("main"),
            &options(&[("team", "ml")]),
        )
        .await
        .unwrap();

        assert_eq!(record.run_id, "run-1");
        assert_eq!(
            record.package_uri,
            "dbfs:/dbx/demo/run-1/artifacts/dist/pkg-0.1-py3-none-any.whl"
        );
        let expected: Vec<(String, String)> = [
            ("dbx_action_type", "deploy"),
            ("dbx_environment", "default"),
            ("dbx_status", "SUCCESS"),
            ("dbx_branch_name", "main"),
            ("team", "ml"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(tag_pairs(&transport), expected);

        let update = &transport.calls_to("/mlflow/runs/update")[0];
        assert_eq!(update.data.as_ref().unwrap()["status"], json!("FINISHED"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_upload_marks_run_failed() {
        let (dir, wheel) = project_with_wheel();
        let transport = MockTransport::new();
        transport
            .respond(
                Method::POST,
                "/mlflow/runs/create",
                json!({"run": {"info": {
                    "run_id": "run-2",
                    "experiment_id": "7",
                    "artifact_uri": "dbfs:/dbx/demo/run-2/artifacts",
                }}}),
            )
            .respond(Method::POST, "/mlflow/runs/update", json!({}))
            .fail(Method::POST, "/dbfs/create", 503, Some("TEMPORARILY_UNAVAILABLE"));
        let prepared = prepared(&transport).await;

        let result = deploy_package(&prepared, dir.path(), &wheel, None, &options(&[])).await;

        assert!(matches!(result, Err(DbxError::Api(_))));
        assert!(transport.calls_to("/mlflow/runs/set-tag").is_empty());
        let update = &transport.calls_to("/mlflow/runs/update")[0];
        assert_eq!(update.data.as_ref().unwrap()["status"], json!("FAILED"));
    }

    #[tokio::test]
    async fn latest_run_uses_generated_filter() {
        let transport = MockTransport::new();
        transport.respond(
            Method::POST,
            "/mlflow/runs/search",
            json!({"runs": [{"info": {"run_id": "r9", "experiment_id": "7", "artifact_uri": "dbfs:/a"}}]}),
        );
        let prepared = prepared(&transport).await;

        let filter = filter_string("prod", None, &[]);
        let run = find_latest_run(&prepared.tracking, &filter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.run_id, "r9");

        let data = transport.calls_to("/mlflow/runs/search")[0].data.clone().unwrap();
        assert_eq!(data["max_results"], json!(1));
        assert_eq!(data["filter"], Value::String(filter));
    }

    #[tokio::test]
    async fn no_matching_run_is_none() {
        let transport = MockTransport::new();
        transport.respond(Method::POST, "/mlflow/runs/search", json!({}));
        let prepared = prepared(&transport).await;

        assert_eq!(
            find_latest_run(&prepared.tracking, &filter_string("prod", Some("main"), &[]))
                .await
                .unwrap(),
            None
        );
    }
}
