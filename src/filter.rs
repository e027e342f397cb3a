//! `key=value` tag parsing and the search filter for deployment runs.

use std::path::Path;

use crate::branch::{branch_name_in, current_branch_name};
use crate::error::{DbxError, DbxResult};

/// Parses `key=value` arguments in order. A repeated key keeps its first
/// position but takes the later value.
pub fn parse_multiple(args: &[String]) -> DbxResult<Vec<(String, String)>> {
    let mut tags: Vec<(String, String)> = Vec::with_capacity(args.len());
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| DbxError::InvalidTag(arg.clone()))?;
        match tags.iter_mut().find(|(existing, _)| existing == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => tags.push((key.to_string(), value.to_string())),
        }
    }
    Ok(tags)
}

/// Filter for the working directory's branch (`GITHUB_REF` first).
pub fn generate_filter_string(environment: &str, tags: &[(String, String)]) -> String {
    filter_string(environment, current_branch_name().as_deref(), tags)
}

/// Same as [`generate_filter_string`] for a project rooted at `project_dir`.
pub fn generate_filter_string_in(
    project_dir: &Path,
    environment: &str,
    tags: &[(String, String)],
) -> String {
    filter_string(environment, branch_name_in(project_dir).as_deref(), tags)
}

pub fn filter_string(environment: &str, branch: Option<&str>, tags: &[(String, String)]) -> String {
    let mut clauses = vec![
        format!("tags.dbx_environment=\"{environment}\""),
        "tags.dbx_status=\"SUCCESS\"".to_string(),
        "tags.dbx_action_type=\"deploy\"".to_string(),
    ];
    if let Some(branch) = branch {
        clauses.push(format!("tags.dbx_branch_name=\"{branch}\""));
    }
    clauses.extend(tags.iter().map(|(k, v)| format!("tags.{k}=\"{v}\"")));
    clauses.join(" and ")
}
