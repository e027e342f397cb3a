//! Thin wrappers over the workspace and DBFS endpoints.

use base64::Engine;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use super::{ApiResult, Transport};

/// DBFS add-block accepts at most 1 MB of decoded data per call.
const DBFS_BLOCK_SIZE: usize = 1024 * 1024;

pub struct WorkspaceService<T> {
    client: T,
}

impl<T: Transport> WorkspaceService<T> {
    pub fn new(client: T) -> Self {
        Self { client }
    }

    /// Creates `path` and any missing parents; existing directories are fine.
    pub async fn mkdirs(&self, path: &str) -> ApiResult<()> {
        self.client
            .perform_query(Method::POST, "/workspace/mkdirs", Some(json!({ "path": path })))
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileInfo {
    pub path: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub file_size: u64,
}

#[derive(Debug, Deserialize)]
struct CreateHandleResponse {
    handle: i64,
}

pub struct DbfsService<T> {
    client: T,
}

impl<T: Transport> DbfsService<T> {
    pub fn new(client: T) -> Self {
        Self { client }
    }

    pub async fn get_status(&self, path: &str) -> ApiResult<FileInfo> {
        let result = self
            .client
            .perform_query(Method::GET, "/dbfs/get-status", Some(json!({ "path": path })))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Streams `contents` to `path` through a create / add-block / close handle.
    pub async fn put(&self, path: &str, contents: &[u8], overwrite: bool) -> ApiResult<()> {
        let created = self
            .client
            .perform_query(
                Method::POST,
                "/dbfs/create",
                Some(json!({ "path": path, "overwrite": overwrite })),
            )
            .await?;
        let CreateHandleResponse { handle } = serde_json::from_value(created)?;

        for block in contents.chunks(DBFS_BLOCK_SIZE) {
            let data = base64::engine::general_purpose::STANDARD.encode(block);
            self.client
                .perform_query(
                    Method::POST,
                    "/dbfs/add-block",
                    Some(json!({ "handle": handle, "data": data })),
                )
                .await?;
        }

        self.client
            .perform_query(Method::POST, "/dbfs/close", Some(json!({ "handle": handle })))
            .await?;
        Ok(())
    }
}
