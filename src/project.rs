//! Project-state documents: the context lock, the project info file and the
//! per-environment deployment file.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;

use crate::config::ProjectLayout;
use crate::echo::echo;
use crate::error::{DbxError, DbxResult};
use crate::store::{read_json, update_json, write_json, JsonMap};

/// Template copied to `conf/deployment.json` on first initialization.
pub const DEPLOYMENT_TEMPLATE: &str = include_str!("../templates/deployment.json");

const CONTEXT_ID_KEY: &str = "context_id";
const ENVIRONMENTS_KEY: &str = "environments";

/// Connection and placement settings for one named environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentData {
    pub profile: String,
    pub workspace_dir: String,
    pub artifact_location: String,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl EnvironmentData {
    pub fn new(
        profile: impl Into<String>,
        workspace_dir: impl Into<String>,
        artifact_location: impl Into<String>,
    ) -> Self {
        Self {
            profile: profile.into(),
            workspace_dir: workspace_dir.into(),
            artifact_location: artifact_location.into(),
            extra: JsonMap::new(),
        }
    }
}

/// Records the active remote execution context id.
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn new(layout: &ProjectLayout) -> Self {
        Self {
            path: layout.lock_file(),
        }
    }

    pub fn set_context(&self, context_id: &str) -> DbxResult<()> {
        let mut content = JsonMap::new();
        content.insert(CONTEXT_ID_KEY.to_string(), json!(context_id));
        update_json(content, &self.path)
    }

    pub fn get_context(&self) -> DbxResult<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = read_json(&self.path)?;
        Ok(content
            .get(CONTEXT_ID_KEY)
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

/// `.dbx/project.json`: the environments known to this project.
#[derive(Debug, Clone)]
pub struct InfoFile {
    layout: ProjectLayout,
}

impl InfoFile {
    pub fn new(layout: &ProjectLayout) -> Self {
        Self {
            layout: layout.clone(),
        }
    }

    pub fn exists(&self) -> bool {
        self.layout.info_file().exists()
    }

    fn create_dir(&self) -> DbxResult<()> {
        let dir = self.layout.dbx_dir();
        if !dir.exists() {
            echo("dbx directory is not present, creating it");
            fs::create_dir(&dir)?;
        }
        Ok(())
    }

    fn create_deployment_file(&self) -> DbxResult<()> {
        let conf_dir = self.layout.conf_dir();
        if !conf_dir.exists() {
            fs::create_dir(&conf_dir)?;
        }
        let deployment_file = self.layout.deployment_file();
        if !deployment_file.exists() {
            echo("dbx deployment file is not present, creating it from template");
            fs::write(&deployment_file, DEPLOYMENT_TEMPLATE)?;
        }
        Ok(())
    }

    fn create_lock_file(&self) -> DbxResult<()> {
        let lock_file = self.layout.lock_file();
        if !lock_file.exists() {
            fs::write(&lock_file, "{}")?;
        }
        Ok(())
    }

    /// Creates the project skeleton and resets the environment list.
    pub fn initialize(&self) -> DbxResult<()> {
        self.create_dir()?;
        self.create_deployment_file()?;
        self.create_lock_file()?;

        let mut init_content = JsonMap::new();
        init_content.insert(ENVIRONMENTS_KEY.to_string(), json!({}));
        write_json(&init_content, &self.layout.info_file())
    }

    pub fn update(&self, content: JsonMap) -> DbxResult<()> {
        update_json(content, &self.layout.info_file())
    }

    pub fn get(&self, key: &str) -> DbxResult<Option<Value>> {
        let path = self.layout.info_file();
        if !path.exists() {
            return Err(DbxError::ProjectNotConfigured);
        }
        let mut content = read_json(&path)?;
        Ok(content.remove(key))
    }

    pub fn environment(&self, name: &str) -> DbxResult<Option<EnvironmentData>> {
        let environments = self.get(ENVIRONMENTS_KEY)?;
        // an empty entry counts as not configured
        match environments.as_ref().and_then(|envs| envs.get(name)) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) if map.is_empty() => Ok(None),
            Some(data) => Ok(Some(serde_json::from_value(data.clone())?)),
        }
    }

    /// Adds or replaces one environment, keeping the others untouched.
    pub fn set_environment(&self, name: &str, data: &EnvironmentData) -> DbxResult<()> {
        let mut environments = match self.get(ENVIRONMENTS_KEY)? {
            Some(Value::Object(map)) => map,
            _ => JsonMap::new(),
        };
        environments.insert(name.to_string(), serde_json::to_value(data)?);

        let mut content = JsonMap::new();
        content.insert(ENVIRONMENTS_KEY.to_string(), Value::Object(environments));
        self.update(content)
    }
}

/// Per-environment deployment parameters, `conf/deployment.json` by default.
#[derive(Debug, Clone)]
pub struct DeploymentFile {
    path: PathBuf,
}

impl DeploymentFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_layout(layout: &ProjectLayout) -> Self {
        Self::new(layout.deployment_file())
    }

    pub fn get_environment(&self, environment: &str) -> DbxResult<Option<Value>> {
        let mut content = read_json(&self.path)?;
        Ok(content.remove(environment))
    }

    pub fn update_environment(&self, environment: &str, content: JsonMap) -> DbxResult<()> {
        let mut environment_data = match self.get_environment(environment)? {
            Some(Value::Object(map)) => map,
            _ => {
                return Err(DbxError::DeploymentEnvironmentNotFound(
                    environment.to_string(),
                ))
            }
        };
        environment_data.extend(content);

        let mut update = JsonMap::new();
        update.insert(environment.to_string(), Value::Object(environment_data));
        update_json(update, &self.path)
    }
}
