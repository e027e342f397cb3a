use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::ProjectLayout;
use crate::echo::echo;
use crate::error::{DbxError, DbxResult};

const SETUP_PY: &str = "setup.py";

/// First wheel found under `dist/`, if any.
pub fn get_package_file(layout: &ProjectLayout) -> Option<PathBuf> {
    echo("Locating package file");
    // the project path itself may contain glob metacharacters
    let dist_dir = glob::Pattern::escape(&layout.dist_dir().to_string_lossy());
    let pattern = format!("{dist_dir}/*.whl");
    let found = glob::glob(&pattern)
        .ok()
        .and_then(|mut paths| paths.find_map(Result::ok));

    match found {
        Some(path) => {
            echo(format!("Package file located in: {}", path.display()));
            Some(path)
        }
        None => {
            echo("Package file was not found");
            None
        }
    }
}

/// Rebuilds the wheel with `<python> setup.py -q clean bdist_wheel` unless
/// `no_rebuild` is set.
pub async fn handle_package(layout: &ProjectLayout, no_rebuild: bool, python: &str) -> DbxResult<()> {
    if no_rebuild {
        echo("No rebuild will be done, please ensure that the package distribution is in dist folder");
        return Ok(());
    }

    echo("Re-building package");
    if !layout.root().join(SETUP_PY).exists() {
        return Err(DbxError::MissingSetupPy);
    }

    tracing::debug!(python, root = %layout.root().display(), "running setup.py");
    let output = Command::new(python)
        .args([SETUP_PY, "-q", "clean", "bdist_wheel"])
        .current_dir(layout.root())
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| DbxError::BuildFailed(format!("failed to run {python}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DbxError::BuildFailed(format!(
            "setup.py exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    echo("Package re-build finished");
    Ok(())
}
