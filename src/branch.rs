//! Branch name of the project, for tagging and filtering deployments.
//!
//! CI runners export `GITHUB_REF`; elsewhere the repository rooted at the
//! project directory is opened with gix and its `HEAD` inspected.

use std::path::Path;

pub const GITHUB_REF_VAR: &str = "GITHUB_REF";

/// Symbolic target git writes to `HEAD` in reftable repositories. gix only
/// reads loose and packed refs, so the placeholder is all it can see there.
const REFTABLE_HEAD_PLACEHOLDER: &str = ".invalid";

pub fn current_branch_name() -> Option<String> {
    branch_name_in(&std::env::current_dir().ok()?)
}

/// Like [`current_branch_name`] for a project rooted at `dir`.
pub fn branch_name_in(dir: &Path) -> Option<String> {
    let github_ref = std::env::var(GITHUB_REF_VAR).ok();
    resolve_branch_name(github_ref.as_deref(), dir)
}

/// Never fails: detached heads and directories outside a repository give `None`.
pub fn resolve_branch_name(github_ref: Option<&str>, repo_dir: &Path) -> Option<String> {
    if let Some(github_ref) = github_ref {
        let name = github_ref.rsplit('/').next().unwrap_or_default();
        return (!name.is_empty()).then(|| name.to_string());
    }

    let repo = match gix::open(repo_dir) {
        Ok(repo) => repo,
        Err(e) => {
            tracing::debug!(dir = %repo_dir.display(), error = %e, "not a git repository");
            return None;
        }
    };
    let head = match repo.head() {
        Ok(head) => head,
        Err(e) => {
            tracing::debug!(error = %e, "failed to read HEAD");
            return None;
        }
    };
    if head.is_detached() {
        return None;
    }

    let name = head.referent_name()?.shorten().to_string();
    if name.is_empty() || name == REFTABLE_HEAD_PLACEHOLDER {
        return None;
    }
    tracing::debug!(branch = %name, "branch resolved from HEAD");
    Some(name)
}
