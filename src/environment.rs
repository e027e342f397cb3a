//! Per-environment connection context: credentials, API client, remote
//! workspace directory and tracking experiment.

use std::path::PathBuf;

use crate::api::services::WorkspaceService;
use crate::api::{ApiClient, Transport};
use crate::config::ProjectLayout;
use crate::credentials::{
    default_profile_path, DatabricksConfig, EnvironmentVariableConfigProvider,
    ProfileConfigProvider,
};
use crate::echo::echo;
use crate::error::{DbxError, DbxResult};
use crate::project::InfoFile;
use crate::tracking::{TrackingClient, DATABRICKS_TRACKING_URI};

const COMMAND_NAME: &str = "dbx-";

/// Where the resolved credentials came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigType {
    Env,
    Profile(String),
}

impl ConfigType {
    /// Tracking URI scoped to the profile when profile auth is used.
    pub fn tracking_uri(&self) -> String {
        match self {
            Self::Env => DATABRICKS_TRACKING_URI.to_string(),
            Self::Profile(profile) => format!("{}://{}", DATABRICKS_TRACKING_URI, profile),
        }
    }
}

/// Credential sources consulted in order: environment variables, then the profile file.
#[derive(Debug, Clone)]
pub struct CredentialSources {
    pub env: EnvironmentVariableConfigProvider,
    pub profile_file: Option<PathBuf>,
}

impl CredentialSources {
    pub fn from_env() -> Self {
        Self {
            env: EnvironmentVariableConfigProvider::from_env(),
            profile_file: default_profile_path(),
        }
    }

    pub fn resolve(&self, profile: &str) -> DbxResult<(DatabricksConfig, ConfigType)> {
        if let Some(config) = self.env.get_config() {
            echo("Using configuration from the environment variables");
            return Ok((config, ConfigType::Env));
        }

        echo("No environment variables provided, using the ~/.databrickscfg");
        let mut provider = ProfileConfigProvider::new(profile);
        if let Some(path) = &self.profile_file {
            provider = provider.with_path(path);
        }
        match provider.get_config()? {
            Some(config) => Ok((config, ConfigType::Profile(profile.to_string()))),
            None => Err(DbxError::ProfileNotFound(profile.to_string())),
        }
    }
}

/// What later steps need after an environment is prepared.
pub struct PreparedEnvironment<T = ApiClient> {
    pub api_client: T,
    pub tracking: TrackingClient<T>,
    pub config_type: ConfigType,
}

/// POSIX parent of `path`, matching `PurePosixPath(path).parent`.
pub fn posix_parent(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.starts_with('/') { "/" } else { "." }.to_string();
    }
    match trimmed.rsplit_once('/') {
        Some((head, _)) => {
            let head = head.trim_end_matches('/');
            if head.is_empty() {
                "/".to_string()
            } else {
                head.to_string()
            }
        }
        None => ".".to_string(),
    }
}

pub async fn prepare_environment(
    layout: &ProjectLayout,
    environment: &str,
) -> DbxResult<PreparedEnvironment> {
    prepare_environment_with(
        layout,
        environment,
        &CredentialSources::from_env(),
        |config| Ok(ApiClient::from_config(config, COMMAND_NAME)?),
    )
    .await
}

/// Runs the preparation steps in order and fails on the first error.
pub async fn prepare_environment_with<T, F>(
    layout: &ProjectLayout,
    environment: &str,
    sources: &CredentialSources,
    connect: F,
) -> DbxResult<PreparedEnvironment<T>>
where
    T: Transport + Clone,
    F: FnOnce(&DatabricksConfig) -> DbxResult<T>,
{
    let environment_data = InfoFile::new(layout)
        .environment(environment)?
        .ok_or_else(|| DbxError::EnvironmentNotFound(environment.to_string()))?;

    let (config, config_type) = sources.resolve(&environment_data.profile)?;
    let api_client = connect(&config)?;

    let workspace_parent = posix_parent(&environment_data.workspace_dir);
    WorkspaceService::new(api_client.clone())
        .mkdirs(&workspace_parent)
        .await?;

    let mut tracking = TrackingClient::new(api_client.clone(), config_type.tracking_uri());
    tracing::debug!(tracking_uri = %tracking.tracking_uri(), "tracking backend configured");

    let experiment_name = &environment_data.workspace_dir;
    if tracking.get_experiment_by_name(experiment_name).await?.is_none() {
        tracking
            .create_experiment(experiment_name, &environment_data.artifact_location)
            .await?;
    }
    tracking.set_experiment(experiment_name).await?;

    Ok(PreparedEnvironment {
        api_client,
        tracking,
        config_type,
    })
}
