//! Sanitizer: removes known-sensitive files from a dump tree and rewrites
//! customer group names.
//!
//! The sensitive-file list is static. Literal entries must exist in any real
//! MMS dump; their absence means the source is not what the operator believes
//! it is and the run aborts. Glob entries are expanded against the tree and
//! every match is removed.

use std::fs;
use std::io::Write;
use std::path::Path;

use globset::{Glob, GlobMatcher};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::context::RunContext;
use crate::error::{MmsPortError, Result};
use crate::layout::FILES_TO_REMOVE;

/// Removes every file on the sensitive-file list from the dump tree.
///
/// No-op under dry-run. A literal entry that is absent aborts with
/// [`MmsPortError::UnexpectedDump`]; a glob entry with no matches is allowed
/// (the matching databases may legitimately be empty).
pub fn scrub(dump_root: &Path, ctx: &RunContext) -> Result<()> {
    info!("removing sensitive information (users, emails, alert settings)");
    if ctx.dry_run {
        return Ok(());
    }
    for entry in FILES_TO_REMOVE {
        if entry.contains('*') {
            remove_glob(dump_root, entry)?;
        } else {
            remove_literal(dump_root, entry)?;
        }
    }
    Ok(())
}

fn remove_literal(dump_root: &Path, relative: &str) -> Result<()> {
    let path = dump_root.join(relative);
    if !path.exists() {
        return Err(MmsPortError::UnexpectedDump {
            path: path.display().to_string(),
        });
    }
    debug!("removing {}", path.display());
    fs::remove_file(&path)
        .map_err(|e| MmsPortError::io(format!("failed to remove {}", path.display()), e))
}

fn remove_glob(dump_root: &Path, pattern: &str) -> Result<()> {
    let matcher = compile_glob(pattern)?;
    for entry in WalkDir::new(dump_root).min_depth(1) {
        let entry = entry.map_err(|e| {
            MmsPortError::configuration(format!(
                "failed to walk {}: {}",
                dump_root.display(),
                e
            ))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dump_root)
            .unwrap_or(entry.path());
        if matcher.is_match(relative) {
            debug!("removing {}", entry.path().display());
            fs::remove_file(entry.path()).map_err(|e| {
                MmsPortError::io(format!("failed to remove {}", entry.path().display()), e)
            })?;
        }
    }
    Ok(())
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| {
            MmsPortError::configuration(format!("invalid sensitive-file glob {}: {}", pattern, e))
        })
}

/// Prefixes every customer group name in the exported collection with the
/// tracking identifier, so names cannot collide after merging into the
/// shared receiving instance.
pub fn prefix_group_names(file: &Path, caseid: &str) -> Result<()> {
    replace_in_file(file, "\"n\" : \"", &format!("\"n\" : \"{}-", caseid))
}

/// In-place line-by-line substring replacement.
///
/// Non-matching lines are preserved verbatim; line endings are normalized to
/// `\n`, which is what the sidecar exporters emit.
pub fn replace_in_file(file: &Path, needle: &str, replacement: &str) -> Result<()> {
    let contents = fs::read_to_string(file)
        .map_err(|e| MmsPortError::io(format!("failed to read {}", file.display()), e))?;
    let mut rewritten = String::with_capacity(contents.len());
    for line in contents.lines() {
        if line.contains(needle) {
            rewritten.push_str(&line.replace(needle, replacement));
        } else {
            rewritten.push_str(line);
        }
        rewritten.push('\n');
    }
    let mut out = fs::File::create(file)
        .map_err(|e| MmsPortError::io(format!("failed to rewrite {}", file.display()), e))?;
    out.write_all(rewritten.as_bytes())
        .map_err(|e| MmsPortError::io(format!("failed to rewrite {}", file.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_fixture(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"fixture").unwrap();
    }

    /// Builds a dump tree containing every file on the sensitive list plus
    /// an innocent bystander.
    fn sensitive_fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        write_fixture(&root, "cloudconf/app.migrations.bson");
        write_fixture(&root, "mmsdb/data.emails.bson");
        write_fixture(&root, "mmsdbconfig/config.alertSettings.bson");
        write_fixture(&root, "mmsdbconfig/config.customers.bson");
        write_fixture(&root, "mmsdbconfig/config.users.bson");
        write_fixture(&root, "mmsdblogs-0/log.0.bson");
        write_fixture(&root, "mmsdblogs-1/log.1.bson");
        write_fixture(&root, "mmsdb/data.hosts.bson");
        (dir, root)
    }

    #[test]
    fn scrub_removes_every_listed_file() {
        let (_dir, root) = sensitive_fixture();
        let ctx = RunContext::new("localhost", 27017);
        scrub(&root, &ctx).unwrap();

        assert!(!root.join("cloudconf/app.migrations.bson").exists());
        assert!(!root.join("mmsdb/data.emails.bson").exists());
        assert!(!root.join("mmsdbconfig/config.users.bson").exists());
        assert!(!root.join("mmsdblogs-0/log.0.bson").exists());
        assert!(!root.join("mmsdblogs-1/log.1.bson").exists());
        // Non-sensitive data survives.
        assert!(root.join("mmsdb/data.hosts.bson").exists());
    }

    #[test]
    fn scrub_fails_when_a_literal_file_is_absent() {
        let (_dir, root) = sensitive_fixture();
        fs::remove_file(root.join("mmsdb/data.emails.bson")).unwrap();
        let ctx = RunContext::new("localhost", 27017);

        let result = scrub(&root, &ctx);
        assert!(matches!(
            result,
            Err(MmsPortError::UnexpectedDump { path }) if path.contains("data.emails.bson")
        ));
    }

    #[test]
    fn scrub_is_a_noop_under_dry_run() {
        let (_dir, root) = sensitive_fixture();
        let mut ctx = RunContext::new("localhost", 27017);
        ctx.dry_run = true;
        scrub(&root, &ctx).unwrap();
        assert!(root.join("mmsdbconfig/config.users.bson").exists());
    }

    #[test]
    fn replace_preserves_untouched_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.customers");
        fs::write(&file, "{ \"n\" : \"acme\" }\n{ \"other\" : 1 }\n").unwrap();

        prefix_group_names(&file, "12345").unwrap();

        let contents = fs::read_to_string(&file).unwrap();
        assert_eq!(contents, "{ \"n\" : \"12345-acme\" }\n{ \"other\" : 1 }\n");
    }

    #[test]
    fn replace_handles_multiple_occurrences_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data");
        fs::write(&file, "a a a\n").unwrap();
        replace_in_file(&file, "a", "b").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "b b b\n");
    }
}
