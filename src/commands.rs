use std::path::PathBuf;
use std::time::Duration;

use dbx::api::v1::ApiV1Client;
use dbx::config::ProjectLayout;
use dbx::deploy::{self, DeployOptions};
use dbx::echo::echo;
use dbx::environment::prepare_environment;
use dbx::execute;
use dbx::filter::parse_multiple;
use dbx::project::{DeploymentFile, EnvironmentData, InfoFile, LockFile};
use dbx::store::JsonMap;
use serde_json::Value;

use crate::DeploymentAction;

fn project_name(layout: &ProjectLayout) -> String {
    layout
        .root()
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "project".to_string())
}

pub(crate) fn run_configure(
    layout: &ProjectLayout,
    environment: &str,
    profile: &str,
    workspace_dir: Option<String>,
    artifact_location: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let info = InfoFile::new(layout);
    if !info.exists() {
        echo("Initializing project in the current directory");
        info.initialize()?;
    }

    let name = project_name(layout);
    let data = EnvironmentData::new(
        profile,
        workspace_dir.unwrap_or_else(|| format!("/Shared/dbx/projects/{name}")),
        artifact_location.unwrap_or_else(|| format!("dbfs:/dbx/{name}")),
    );
    info.set_environment(environment, &data)?;

    echo(format!(
        "Environment {environment} configured with profile {profile}, workspace dir {} and artifact location {}",
        data.workspace_dir, data.artifact_location
    ));
    Ok(())
}

pub(crate) async fn run_deploy(
    layout: &ProjectLayout,
    environment: &str,
    no_rebuild: bool,
    python: &str,
    tags: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let options = DeployOptions {
        environment: environment.to_string(),
        no_rebuild,
        python: python.to_string(),
        tags: parse_multiple(tags)?,
    };
    let record = deploy::deploy(layout, &options).await?;
    echo(format!("Package deployed to {}", record.package_uri));
    Ok(())
}

pub(crate) async fn run_find_deployment(
    layout: &ProjectLayout,
    environment: &str,
    tags: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let tags = parse_multiple(tags)?;
    match deploy::find_latest_deployment(layout, environment, &tags).await? {
        Some(run) => {
            echo(format!("Latest deployment: run {}", run.run_id));
            println!("{}", run.artifact_uri);
        }
        None => echo(format!("No successful deployments found for environment {environment}")),
    }
    Ok(())
}

pub(crate) async fn run_execute(
    layout: &ProjectLayout,
    environment: &str,
    cluster_id: &str,
    command: Option<String>,
    file: Option<PathBuf>,
    poll_interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = match (command, file) {
        (Some(command), _) => command,
        (None, Some(file)) => std::fs::read_to_string(&file)?,
        (None, None) => return Err("either --command or --file is required".into()),
    };

    let prepared = prepare_environment(layout, environment).await?;
    let v1 = ApiV1Client::new(&prepared.api_client);
    let lock = LockFile::new(layout);

    let context_id = execute::ensure_context(&v1, &lock, cluster_id).await?;
    let command_id = execute::submit_command(&v1, cluster_id, &context_id, &source).await?;
    echo(format!("Command {command_id} submitted, waiting for it to finish"));

    let status = tokio::select! {
        result = execute::wait_for_command(&v1, cluster_id, &context_id, &command_id, poll_interval) => result?,
        _ = tokio::signal::ctrl_c() => {
            execute::cancel_command(&v1, cluster_id, &context_id, &command_id).await?;
            return Err("command cancelled".into());
        }
    };

    echo("Command finished");
    if let Some(output) = execute::command_output(&status) {
        println!("{}", output);
    }
    Ok(())
}

pub(crate) fn run_deployment(
    layout: &ProjectLayout,
    environment: &str,
    action: DeploymentAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let deployment = DeploymentFile::from_layout(layout);
    match action {
        DeploymentAction::Show { .. } => match deployment.get_environment(environment)? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => echo(format!("No deployment configuration for environment {environment}")),
        },
        DeploymentAction::Set { json, .. } => {
            let content: JsonMap = match serde_json::from_str(&json)? {
                Value::Object(map) => map,
                _ => return Err("deployment update must be a JSON object".into()),
            };
            deployment.update_environment(environment, content)?;
            echo(format!("Deployment configuration for {environment} updated"));
        }
    }
    Ok(())
}

pub(crate) fn run_context(layout: &ProjectLayout) -> Result<(), Box<dyn std::error::Error>> {
    match LockFile::new(layout).get_context()? {
        Some(context_id) => println!("{}", context_id),
        None => echo("No execution context recorded"),
    }
    Ok(())
}
