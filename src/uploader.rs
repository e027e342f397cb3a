use std::path::{Component, Path};

use crate::api::services::DbfsService;
use crate::api::{ApiClient, ApiError, Transport};
use crate::echo::echo;
use crate::environment::posix_parent;
use crate::error::DbxResult;
use crate::retry::{retry, RetryPolicy, UPLOAD_RETRY};
use crate::tracking::{RunInfo, TrackingClient};

/// Outcome of a remote file lookup.
#[derive(Debug)]
pub enum RemoteFileStatus {
    Exists,
    Missing,
    /// The lookup itself failed; existence is unknown.
    Unreachable(ApiError),
}

/// `path` with `/` separators regardless of platform.
pub fn to_posix(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        match component {
            Component::RootDir => out.push('/'),
            Component::Prefix(prefix) => out.push_str(&prefix.as_os_str().to_string_lossy()),
            Component::CurDir => {}
            other => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(&other.as_os_str().to_string_lossy());
            }
        }
    }
    if out.is_empty() {
        out.push('.');
    }
    out
}

pub struct FileUploader<T = ApiClient> {
    dbfs: DbfsService<T>,
    policy: RetryPolicy,
}

impl<T: Transport + Clone> FileUploader<T> {
    pub fn new(api_client: T) -> Self {
        Self {
            dbfs: DbfsService::new(api_client),
            policy: UPLOAD_RETRY,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn file_status(&self, file_path: &str) -> RemoteFileStatus {
        match self.dbfs.get_status(file_path).await {
            Ok(_) => RemoteFileStatus::Exists,
            Err(e) if e.is_not_found() => RemoteFileStatus::Missing,
            Err(e) => RemoteFileStatus::Unreachable(e),
        }
    }

    pub async fn file_exists(&self, file_path: &str) -> bool {
        matches!(self.file_status(file_path).await, RemoteFileStatus::Exists)
    }

    /// Logs `file_path` as a run artifact under its own parent directory.
    /// `project_root` locates the file on disk; `file_path` stays relative.
    pub async fn upload_file(
        &self,
        tracking: &TrackingClient<T>,
        run: &RunInfo,
        project_root: &Path,
        file_path: &Path,
    ) -> DbxResult<String> {
        let posix_path = to_posix(file_path);
        let artifact_path = posix_parent(&posix_path);
        let local_path = project_root.join(file_path);

        echo(format!("Deploying file: {}", file_path.display()));
        retry(&self.policy, "upload file", || {
            tracking.log_artifact(run, &local_path, &artifact_path)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use crate::tracking::DATABRICKS_TRACKING_URI;
    use reqwest::Method;
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;

    fn run() -> RunInfo {
        RunInfo {
            run_id: "run-1".to_string(),
            experiment_id: "7".to_string(),
            artifact_uri: "dbfs:/dbx/demo/run-1/artifacts".to_string(),
            status: None,
        }
    }

    #[test]
    fn posix_conversion_uses_forward_slashes() {
        assert_eq!(to_posix(&PathBuf::from("dist").join("pkg.whl")), "dist/pkg.whl");
        assert_eq!(to_posix(Path::new("./dist/pkg.whl")), "dist/pkg.whl");
        assert_eq!(to_posix(Path::new("pkg.whl")), "pkg.whl");
    }

    #[tokio::test]
    async fn status_distinguishes_missing_from_unreachable() {
        let transport = MockTransport::new();
        transport.fail(
            Method::GET,
            "/dbfs/get-status",
            404,
            Some("RESOURCE_DOES_NOT_EXIST"),
        );
        let uploader = FileUploader::new(transport);
        assert!(matches!(
            uploader.file_status("/dbx/none").await,
            RemoteFileStatus::Missing
        ));
        assert!(!uploader.file_exists("/dbx/none").await);

        let transport = MockTransport::new();
        transport.fail(Method::GET, "/dbfs/get-status", 403, Some("PERMISSION_DENIED"));
        let uploader = FileUploader::new(transport);
        assert!(matches!(
            uploader.file_status("/dbx/locked").await,
            RemoteFileStatus::Unreachable(ApiError::Http { status: 403, .. })
        ));
        assert!(!uploader.file_exists("/dbx/locked").await);
    }

    #[tokio::test]
    async fn existing_file_is_reported() {
        let transport = MockTransport::new();
        transport.respond(
            Method::GET,
            "/dbfs/get-status",
            json!({"path": "/dbx/pkg.whl", "is_dir": false, "file_size": 5}),
        );
        assert!(FileUploader::new(transport).file_exists("/dbx/pkg.whl").await);
    }

    #[tokio::test]
    async fn upload_places_file_under_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("dist")).unwrap();
        fs::write(dir.path().join("dist/pkg.whl"), b"wheel").unwrap();

        let transport = MockTransport::new();
        transport
            .respond(Method::POST, "/dbfs/create", json!({"handle": 3}))
            .respond(Method::POST, "/dbfs/add-block", json!({}))
            .respond(Method::POST, "/dbfs/close", json!({}));
        let tracking = TrackingClient::new(transport.clone(), DATABRICKS_TRACKING_URI);
        let uploader = FileUploader::new(transport.clone());

        let uri = uploader
            .upload_file(&tracking, &run(), dir.path(), Path::new("dist/pkg.whl"))
            .await
            .unwrap();
        assert_eq!(uri, "dbfs:/dbx/demo/run-1/artifacts/dist/pkg.whl");
    }

    #[tokio::test(start_paused = true)]
    async fn upload_is_retried_three_times() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pkg.whl"), b"wheel").unwrap();

        let transport = MockTransport::new();
        transport.fail(Method::POST, "/dbfs/create", 503, Some("TEMPORARILY_UNAVAILABLE"));
        let tracking = TrackingClient::new(transport.clone(), DATABRICKS_TRACKING_URI);
        let uploader = FileUploader::new(transport.clone());

        let result = uploader
            .upload_file(&tracking, &run(), dir.path(), Path::new("pkg.whl"))
            .await;
        assert!(result.is_err());
        assert_eq!(transport.calls_to("/dbfs/create").len(), 3);
    }
}
