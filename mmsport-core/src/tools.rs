//! Tool Locator: resolves the external MongoDB binaries the pipelines need.
//!
//! Resolution honors the `MONGO_HOME` environment override (binaries live
//! under `$MONGO_HOME/bin`) and otherwise searches `PATH`. Every resolved
//! binary is verified with a `--version` probe. Missing dependencies are
//! aggregated into a single error so the operator can fix all of them in one
//! pass.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{MmsPortError, Result};
use crate::exec::probe_version;

/// Environment variable pointing at the MongoDB installation root.
pub const MONGO_HOME: &str = "MONGO_HOME";

/// Tools the export pipeline depends on.
pub const EXPORT_DEPS: [&str; 3] = ["mongo", "mongodump", "mongoexport"];

/// Tools the import pipeline depends on.
pub const IMPORT_DEPS: [&str; 3] = ["mongo", "mongorestore", "mongoimport"];

/// Mapping from logical tool name to resolved, probed path.
#[derive(Debug, Default)]
pub struct ToolPaths {
    paths: HashMap<String, PathBuf>,
}

impl ToolPaths {
    /// Creates an empty mapping. Mostly useful for tests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resolved tool.
    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.paths.insert(name.into(), path.into());
    }

    /// Path of a previously located tool.
    ///
    /// # Errors
    /// Returns a configuration error if the tool was never located; the
    /// sequencers always locate their full dependency list up front, so this
    /// only fires on a programming error.
    pub fn get(&self, name: &str) -> Result<&Path> {
        self.paths
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                MmsPortError::configuration(format!("tool {} was not located", name))
            })
    }
}

/// Resolves and probes every required tool, aggregating all failures.
pub fn locate(required: &[&str]) -> Result<ToolPaths> {
    let mongo_home = env::var_os(MONGO_HOME).map(PathBuf::from);
    let mut located = ToolPaths::new();
    let mut missing = Vec::new();

    for name in required {
        match resolve_one(name, mongo_home.as_deref()) {
            Some(path) => {
                debug!("found {} at {}", name, path.display());
                located.insert(*name, path);
            }
            None => missing.push((*name).to_string()),
        }
    }

    if missing.is_empty() {
        Ok(located)
    } else {
        Err(MmsPortError::MissingTools { tools: missing })
    }
}

fn resolve_one(name: &str, mongo_home: Option<&Path>) -> Option<PathBuf> {
    let candidate = match mongo_home {
        Some(home) => candidate_path(name, home),
        None => which::which(name).ok()?,
    };
    probe_version(&candidate).then_some(candidate)
}

/// Path a tool is expected at under a `MONGO_HOME` installation root.
fn candidate_path(name: &str, mongo_home: &Path) -> PathBuf {
    mongo_home.join("bin").join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_path_joins_bin() {
        let path = candidate_path("mongodump", Path::new("/opt/mongodb"));
        assert_eq!(path, PathBuf::from("/opt/mongodb/bin/mongodump"));
    }

    #[test]
    fn locate_aggregates_every_missing_tool() {
        let result = locate(&["mmsport-test-no-such-tool-a", "mmsport-test-no-such-tool-b"]);
        match result {
            Err(MmsPortError::MissingTools { tools }) => {
                assert_eq!(
                    tools,
                    vec![
                        "mmsport-test-no-such-tool-a".to_string(),
                        "mmsport-test-no-such-tool-b".to_string()
                    ]
                );
            }
            other => panic!("expected MissingTools, got {:?}", other),
        }
    }

    #[test]
    fn tool_paths_reports_unknown_tool() {
        let paths = ToolPaths::new();
        assert!(paths.get("mongodump").is_err());
    }

    #[test]
    fn tool_paths_roundtrip() {
        let mut paths = ToolPaths::new();
        paths.insert("mongo", "/usr/bin/mongo");
        assert_eq!(paths.get("mongo").unwrap(), Path::new("/usr/bin/mongo"));
    }
}
