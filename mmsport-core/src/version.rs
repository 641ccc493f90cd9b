//! Version Classifier: schema version labels derived from migration counts.
//!
//! Every MMS release runs a cumulative set of schema migrations, so the
//! number of entries in the `app.migrations` collection identifies the
//! schema revision. The heuristic is an enumerated lookup with a numeric
//! fallback; a future release that stops recording migrations would break
//! it, which is why it lives behind this small interface. The export side
//! counts lines of the dumped sidecar, the import side counts documents in
//! the live target, and both must produce byte-identical labels for the
//! compatibility gate to be meaningful.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::context::RunContext;
use crate::error::{MmsPortError, Result};
use crate::exec::MongoShell;
use crate::layout::{COLLECTIONS_DIR, MIGRATIONS_COLLECTION, MMS_VERSION_FILE};

/// Maps a migration-log entry count to a schema version label.
///
/// Known counts map to release labels; any other count passes through as
/// its decimal string so unknown future revisions still compare exactly.
pub fn classify(count: u64) -> String {
    match count {
        0 => "1.1".to_string(),
        1 => "1.2".to_string(),
        11 => "1.3".to_string(),
        other => other.to_string(),
    }
}

/// Derives the version label of a dump tree from its migrations sidecar.
pub fn from_dump_tree(dump_dir: &Path) -> Result<String> {
    let (db, coll) = MIGRATIONS_COLLECTION;
    let sidecar = dump_dir.join(COLLECTIONS_DIR).join(db).join(coll);
    let contents = fs::read_to_string(&sidecar).map_err(|e| {
        MmsPortError::io(format!("failed to read {}", sidecar.display()), e)
    })?;
    let count = contents.lines().count() as u64;
    let version = classify(count);
    debug!("dump tree migration count {} -> version {}", count, version);
    Ok(version)
}

/// Derives the version label of a live instance by counting its migration
/// documents through the shell.
pub fn from_live_instance(shell: &MongoShell, ctx: &RunContext) -> Result<String> {
    let (db, coll) = MIGRATIONS_COLLECTION;
    let expression = format!("db.getCollection('{}').count()", coll);
    let lines = shell.eval(ctx, db, &expression)?;
    let first = lines
        .first()
        .map(String::as_str)
        .unwrap_or("")
        .trim()
        .to_string();
    let count: u64 = first.parse().map_err(|_| {
        MmsPortError::configuration(format!(
            "unexpected migration count from {}.{}: {:?}",
            db, coll, first
        ))
    })?;
    let version = classify(count);
    debug!("live migration count {} -> version {}", count, version);
    Ok(version)
}

/// Writes the version label into the dump tree.
pub fn write_version_file(dump_dir: &Path, version: &str) -> Result<()> {
    let path = dump_dir.join(MMS_VERSION_FILE);
    fs::write(&path, version)
        .map_err(|e| MmsPortError::io(format!("failed to write {}", path.display()), e))
}

/// Reads the version label persisted in a dump tree.
pub fn read_version_file(dump_dir: &Path) -> Result<String> {
    let path = dump_dir.join(MMS_VERSION_FILE);
    let contents = fs::read_to_string(&path)
        .map_err(|e| MmsPortError::io(format!("failed to read {}", path.display()), e))?;
    Ok(contents.trim().to_string())
}

/// Compatibility gate: the archive label must equal the live target's label.
///
/// Checked before any write to the target; a mismatch means the data is
/// shaped for an incompatible schema revision.
pub fn check_gate(archive: &str, target: &str) -> Result<()> {
    if archive == target {
        Ok(())
    } else {
        Err(MmsPortError::VersionMismatch {
            archive: archive.to_string(),
            target: target.to_string(),
        })
    }
}
