//! Error types for the dbx library layer.

use std::path::PathBuf;

use thiserror::Error;

use crate::api::ApiError;

/// Errors surfaced by project-state, environment and deployment operations.
#[derive(Debug, Error)]
pub enum DbxError {
    /// The info file does not exist yet.
    #[error("Your project is not yet configured, please configure it via `dbx configure`")]
    ProjectNotConfigured,

    /// No entry for the environment in the project file.
    #[error("No environment {0} provided in the project file")]
    EnvironmentNotFound(String),

    /// No entry for the environment in the deployment file.
    #[error("No environment {0} provided in the deployment file")]
    DeploymentEnvironmentNotFound(String),

    /// Neither environment variables nor the named profile yield a usable config.
    #[error("Couldn't get profile with name: {0}. Please check the config settings")]
    ProfileNotFound(String),

    /// A JSON document was read from a path that does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A JSON document exists but is not an object.
    #[error("{} does not contain a JSON object", .0.display())]
    NotAMapping(PathBuf),

    /// A `--tags` argument without a `=` separator.
    #[error("invalid tag '{0}', expected key=value")]
    InvalidTag(String),

    #[error("No setup.py provided in project directory. Please create one, or disable rebuild via --no-rebuild")]
    MissingSetupPy,

    #[error("package build failed: {0}")]
    BuildFailed(String),

    #[error("Package file was not found in dist/")]
    PackageNotFound,

    /// Artifacts can only be logged to DBFS-backed locations.
    #[error("unsupported artifact location: {0}")]
    UnsupportedArtifactUri(String),

    /// A remote command finished in an error state.
    #[error("command {command_id} finished with status {status}: {cause}")]
    CommandFailed {
        command_id: String,
        status: String,
        cause: String,
    },

    /// The remote side answered with a payload missing a required field.
    #[error("unexpected API response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type DbxResult<T> = Result<T, DbxError>;
