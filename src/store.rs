//! Read, write and shallow-merge JSON object documents on local disk.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{DbxError, DbxResult};

pub type JsonMap = Map<String, Value>;

pub fn read_json(path: &Path) -> DbxResult<JsonMap> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(DbxError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str(&content)? {
        Value::Object(map) => Ok(map),
        _ => Err(DbxError::NotAMapping(path.to_path_buf())),
    }
}

/// Overwrites `path` with `content`, pretty-printed with a 4-space indent.
pub fn write_json(content: &JsonMap, path: &Path) -> DbxResult<()> {
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    content.serialize(&mut serializer)?;
    fs::write(path, buf)?;
    Ok(())
}

/// Shallow merge: top-level keys of `new_content` replace existing ones wholesale.
pub fn update_json(new_content: JsonMap, path: &Path) -> DbxResult<()> {
    let mut content = match read_json(path) {
        Ok(content) => content,
        Err(DbxError::FileNotFound(_)) => JsonMap::new(),
        Err(e) => return Err(e),
    };
    content.extend(new_content);
    write_json(&content, path)
}
