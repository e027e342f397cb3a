use clap::{Parser, Subcommand};
use dbx::config::{self, CliConfig, ProjectLayout, DEFAULT_PROFILE};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
mod commands;

#[derive(Parser)]
#[command(
    name = "dbx",
    version,
    about = "dbx - deploy and run Python packages on Databricks"
)]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true, env = "DBX_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize CLI settings file (~/.config/dbx/config.toml)
    Init {
        /// Overwrite existing settings
        #[arg(long)]
        force: bool,
    },

    /// Register or update an environment for this project
    Configure {
        /// Environment name (default from settings, else "default")
        #[arg(short, long)]
        environment: Option<String>,

        /// Profile in ~/.databrickscfg used when no DATABRICKS_* variables are set
        #[arg(long, default_value = DEFAULT_PROFILE)]
        profile: String,

        /// Workspace directory holding the tracking experiment
        #[arg(long)]
        workspace_dir: Option<String>,

        /// Artifact location for deployment runs (dbfs:/...)
        #[arg(long)]
        artifact_location: Option<String>,
    },

    /// Build the package and record it as a deployment run
    Deploy {
        #[arg(short, long)]
        environment: Option<String>,

        /// Skip `setup.py bdist_wheel` and use the wheel already in dist/
        #[arg(long)]
        no_rebuild: bool,

        /// Extra run tags as key=value (repeatable)
        #[arg(long = "tags", num_args = 1..)]
        tags: Vec<String>,
    },

    /// Find the latest successful deployment
    FindDeployment {
        #[arg(short, long)]
        environment: Option<String>,

        /// Tags the deployment must carry, as key=value (repeatable)
        #[arg(long = "tags", num_args = 1..)]
        tags: Vec<String>,
    },

    /// Run code on an interactive cluster, reusing the locked execution context
    Execute {
        #[arg(short, long)]
        environment: Option<String>,

        /// Target cluster id
        #[arg(long)]
        cluster_id: String,

        /// Python source to run
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        command: Option<String>,

        /// File whose contents are run
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Inspect or update conf/deployment.json
    Deployment {
        #[command(subcommand)]
        action: DeploymentAction,
    },

    /// Show the execution context recorded in .dbx/lock.json
    Context,
}

#[derive(Subcommand)]
pub(crate) enum DeploymentAction {
    /// Print one environment's deployment configuration
    Show {
        #[arg(short, long)]
        environment: Option<String>,
    },

    /// Shallow-merge a JSON object into one environment's configuration
    Set {
        #[arg(short, long)]
        environment: Option<String>,

        /// JSON object, e.g. '{"jobs": []}'
        json: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider BEFORE tokio runtime starts
    // (required for rustls 0.23+ - must happen before any TLS operations)
    #[cfg(feature = "rustls")]
    {
        if rustls_crate::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            return Err("Failed to install rustls crypto provider".into());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dbx=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = CliConfig::load();
    let layout = cli
        .project_dir
        .map(ProjectLayout::new)
        .unwrap_or_else(ProjectLayout::current);
    let environment = |flag: Option<String>| flag.unwrap_or_else(|| cfg.default_environment());

    match cli.command {
        Commands::Init { force } => run_init(force),
        Commands::Configure {
            environment: env,
            profile,
            workspace_dir,
            artifact_location,
        } => commands::run_configure(
            &layout,
            &environment(env),
            &profile,
            workspace_dir,
            artifact_location,
        ),
        Commands::Deploy {
            environment: env,
            no_rebuild,
            tags,
        } => commands::run_deploy(&layout, &environment(env), no_rebuild, &cfg.python(), &tags).await,
        Commands::FindDeployment {
            environment: env,
            tags,
        } => commands::run_find_deployment(&layout, &environment(env), &tags).await,
        Commands::Execute {
            environment: env,
            cluster_id,
            command,
            file,
        } => {
            commands::run_execute(
                &layout,
                &environment(env),
                &cluster_id,
                command,
                file,
                cfg.poll_interval(),
            )
            .await
        }
        Commands::Deployment { action } => {
            let env = match &action {
                DeploymentAction::Show { environment: env }
                | DeploymentAction::Set {
                    environment: env, ..
                } => environment(env.clone()),
            };
            commands::run_deployment(&layout, &env, action)
        }
        Commands::Context => commands::run_context(&layout),
    }
}

fn run_init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = CliConfig::config_path() else {
        return Err("Could not determine config directory".into());
    };

    if path.exists() && !force {
        println!("Config file already exists at: {}", path.display());
        println!("\nUse --force to overwrite, or edit directly:");
        println!("  $EDITOR {}", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, config::sample_config())?;

    println!("Created config file: {}", path.display());
    println!("\nNext, register an environment for your project:");
    println!("  dbx configure --environment default --profile DEFAULT");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn deploy_collects_repeated_tags() {
        let cli = Cli::try_parse_from([
            "dbx", "deploy", "-e", "prod", "--no-rebuild", "--tags", "team=ml", "--tags", "stage=a",
        ])
        .unwrap();
        match cli.command {
            Commands::Deploy {
                environment,
                no_rebuild,
                tags,
            } => {
                assert_eq!(environment.as_deref(), Some("prod"));
                assert!(no_rebuild);
                assert_eq!(tags, vec!["team=ml", "stage=a"]);
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn execute_requires_command_or_file() {
        assert!(Cli::try_parse_from(["dbx", "execute", "--cluster-id", "c-1"]).is_err());
        assert!(Cli::try_parse_from([
            "dbx", "execute", "--cluster-id", "c-1", "--command", "print(1)", "--file", "job.py",
        ])
        .is_err());
    }

    #[test]
    fn configure_profile_defaults_to_default_section() {
        let cli = Cli::try_parse_from(["dbx", "configure"]).unwrap();
        match cli.command {
            Commands::Configure { profile, .. } => assert_eq!(profile, "DEFAULT"),
            _ => panic!("expected configure"),
        }
    }
}
