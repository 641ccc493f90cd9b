//! Import sequencer: unpack, gate, restore, reset defaults.
//!
//! The critical correctness check is the version gate: the label persisted
//! in the archive must equal the label freshly computed from the live target
//! instance, and nothing is written to the target before the gate passes.
//! After restore, operational settings that arrived with the data are reset
//! so imported alert rules do not fire against live data, and the internal
//! support accounts are granted visibility of the imported groups.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::archive;
use crate::context::{RunContext, RunReport};
use crate::error::{MmsPortError, Result};
use crate::exec::{CommandSpec, MongoShell};
use crate::export::safe_rm_tree;
use crate::layout::{
    ALL_MMS_DBS, COLLECTIONS_DIR, COLLECTIONS_TO_IMPORT, COLLECTION_WITH_GROUPS, DB_CLOUDCONF,
    DB_MMSCONF, DUMP_DIR, IMPORTER_LOGS,
};
use crate::space::parse_database_names;
use crate::tools::{self, ToolPaths, IMPORT_DEPS};
use crate::version;

/// Operator choices for one import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Archive file or already-unpacked directory to import; `None` runs
    /// only the defaults reset against the target.
    pub data: Option<PathBuf>,
    /// Directory used for unpacking an archive.
    pub tmpdir: PathBuf,
    /// Upsert/update data that already exists in the target.
    pub upsert: bool,
}

/// Runs the import pipeline end to end.
pub fn run(options: &ImportOptions, ctx: &RunContext) -> Result<RunReport> {
    let mut report = RunReport::new();

    let paths = tools::locate(&IMPORT_DEPS)?;
    let shell = MongoShell::new(paths.get("mongo")?);

    // Under dry-run the shell is printed, not executed, so there is no live
    // version to gate against; the archive's version stands in so the
    // remaining commands can still be shown.
    let mut target_version = if ctx.dry_run {
        None
    } else {
        let live = version::from_live_instance(&shell, ctx)?;
        info!("target instance version is {}", live);
        Some(live)
    };

    if let Some(data) = &options.data {
        let staged = stage_data(data, &options.tmpdir, ctx)?;
        let dump_dir = staged.root.join(DUMP_DIR);
        if !dump_dir.exists() {
            return Err(MmsPortError::precondition(format!(
                "can't find the dump directory to restore: {}",
                dump_dir.display()
            )));
        }

        let archive_version = version::read_version_file(&dump_dir)?;
        match &target_version {
            Some(live) => version::check_gate(&archive_version, live)?,
            None => {
                info!(
                    "dry run: skipping version gate (archive version {})",
                    archive_version
                );
                target_version = Some(archive_version.clone());
            }
        }

        let groups = imported_groups(&staged.root)?;
        info!("groups being imported: {}", groups.join(", "));

        clean_config_collections(&dump_dir, ctx)?;
        append_import_metadata(&dump_dir, &groups, ctx)?;
        restore_database(&paths, &staged.root, options.upsert, ctx)?;

        if staged.owned {
            if ctx.dry_run {
                info!("would remove {}", staged.root.display());
            } else {
                fs::remove_dir_all(&staged.root).map_err(|e| {
                    MmsPortError::io(
                        format!("failed to remove {}", staged.root.display()),
                        e,
                    )
                })?;
            }
        }
    }

    match &target_version {
        Some(live) => {
            if let Err(e) = reset_defaults(&shell, live, ctx) {
                tracing::error!("defaults reset failed: {}", e);
                report.count_error();
            }
        }
        None => info!("dry run without data: skipping defaults reset"),
    }

    Ok(report)
}

/// An unpacked data tree, and whether this run created (and owns) it.
struct StagedData {
    root: PathBuf,
    owned: bool,
}

/// Resolves the data argument into an on-disk tree, unpacking archives into
/// a per-process temporary directory.
fn stage_data(data: &Path, tmpdir: &Path, ctx: &RunContext) -> Result<StagedData> {
    if !data.exists() {
        return Err(MmsPortError::precondition(format!(
            "can't find gzip file or directory to import: {}",
            data.display()
        )));
    }
    if data.is_dir() {
        // Assume the layout inside is already right.
        return Ok(StagedData {
            root: data.to_path_buf(),
            owned: false,
        });
    }

    let extract_dir = tmpdir.join(std::process::id().to_string());
    if extract_dir.exists() {
        warn!(
            "removing previously left-over temp dir: {}",
            extract_dir.display()
        );
        fs::remove_dir_all(&extract_dir).map_err(|e| {
            MmsPortError::io(format!("failed to remove {}", extract_dir.display()), e)
        })?;
    }
    archive::unpack(data, &extract_dir)?;
    if ctx.dry_run {
        info!("unpacked for inspection only; restore commands will be printed");
    }
    Ok(StagedData {
        root: extract_dir,
        owned: true,
    })
}

/// Group names contained in the customer-group sidecar, sorted.
pub fn imported_groups(extract_root: &Path) -> Result<Vec<String>> {
    let (db, coll) = COLLECTION_WITH_GROUPS;
    let sidecar = extract_root
        .join(DUMP_DIR)
        .join(COLLECTIONS_DIR)
        .join(db)
        .join(coll);
    let contents = fs::read_to_string(&sidecar).map_err(|e| {
        MmsPortError::io(format!("failed to read {}", sidecar.display()), e)
    })?;

    // The pattern is a compile-time constant; it cannot fail to compile.
    let Ok(name_re) = regex::Regex::new(r#""n"\s*:\s*"(.+?)""#) else {
        return Ok(Vec::new());
    };
    let mut groups: Vec<String> = contents
        .lines()
        .filter_map(|line| name_re.captures(line))
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .collect();
    groups.sort();
    Ok(groups)
}

/// Removes the instance-wide configuration subtree from the unpacked dump so
/// the destination's configuration is never overwritten by the source's.
fn clean_config_collections(dump_dir: &Path, ctx: &RunContext) -> Result<()> {
    let config_dir = dump_dir.join(DB_CLOUDCONF);
    if config_dir.exists() {
        safe_rm_tree(&config_dir, ctx)?;
    }
    Ok(())
}

/// Appends import host, import timestamp, and the group list to the
/// provenance sidecar before it is loaded into the target.
fn append_import_metadata(dump_dir: &Path, groups: &[String], ctx: &RunContext) -> Result<()> {
    if ctx.dry_run {
        return Ok(());
    }
    let (db, coll) = IMPORTER_LOGS;
    let sidecar = dump_dir.join(COLLECTIONS_DIR).join(db).join(coll);
    let groups_json = serde_json::to_string(groups).map_err(|e| MmsPortError::Serialization {
        context: "imported group list".to_string(),
        source: e,
    })?;
    let added = format!(
        ", \"import_host\":{}, \"import_ts\":{{\"$date\":{}}}, \"groups\":{}}}",
        serde_json::Value::String(import_hostname()),
        Utc::now().timestamp_millis(),
        groups_json
    );

    // Splice the fields into each document by reopening its closing brace;
    // inner braces must stay untouched.
    let contents = fs::read_to_string(&sidecar).map_err(|e| {
        MmsPortError::io(format!("failed to read {}", sidecar.display()), e)
    })?;
    let mut rewritten = String::with_capacity(contents.len() + added.len());
    for line in contents.lines() {
        match line.trim_end().strip_suffix('}') {
            Some(open_doc) => {
                rewritten.push_str(open_doc);
                rewritten.push_str(&added);
            }
            None => rewritten.push_str(line),
        }
        rewritten.push('\n');
    }
    fs::write(&sidecar, rewritten).map_err(|e| {
        MmsPortError::io(format!("failed to rewrite {}", sidecar.display()), e)
    })
}

fn import_hostname() -> String {
    whoami::fallible::hostname().unwrap_or_else(|_| "unknown-host".to_string())
}

/// Loads the dump with `mongorestore`, then the sidecar collections with
/// `mongoimport`.
fn restore_database(
    paths: &ToolPaths,
    extract_root: &Path,
    upsert: bool,
    ctx: &RunContext,
) -> Result<()> {
    info!("restoring database");
    info!("first, the dump part...");
    CommandSpec::new(paths.get("mongorestore")?)
        .args(ctx.connection_args())
        .current_dir(extract_root)
        .run_checked(ctx)?;

    info!("secondly, the exported collections...");
    for (db, coll) in COLLECTIONS_TO_IMPORT {
        let json_file = extract_root
            .join(DUMP_DIR)
            .join(COLLECTIONS_DIR)
            .join(db)
            .join(coll);
        let mut spec = CommandSpec::new(paths.get("mongoimport")?)
            .args(ctx.connection_args())
            .arg("-d")
            .arg(db)
            .arg("-c")
            .arg(coll)
            .arg("--file")
            .arg(json_file.display().to_string());
        if upsert {
            spec = spec.arg("--upsert");
        }
        spec.run_checked(ctx)?;
    }
    info!("restore done");
    Ok(())
}

/// The per-schema-version shell updates applied after restore.
///
/// Cron and alert settings are disabled so imported alert rules do not fire
/// against live data; internal accounts get administrative group visibility.
/// The `1.2` schema stored visibility as a `cids` set plus the `xe` flag;
/// `1.3` and every later (or unrecognized, hence newer) revision stores it
/// as a role. `1.1` predates both shapes and is left alone.
pub fn reset_defaults_updates(target_version: &str) -> Vec<(&'static str, String)> {
    let mut updates = vec![
        (
            DB_CLOUDCONF,
            "db.getCollection('app.systemCronState').update({}, \
             {\"$set\":{\"enabled\":false}}, {upsert:false, multi:true})"
                .to_string(),
        ),
        (
            DB_MMSCONF,
            "db.getCollection('config.alertSettings').update({}, \
             {\"$set\":{\"enabled\":false}}, {upsert:false, multi:true})"
                .to_string(),
        ),
    ];
    match target_version {
        "1.1" => {}
        "1.2" => updates.push((
            DB_MMSCONF,
            "db.getCollection('config.users').update({\"pe\":{\"$regex\":\"mongodb.com\"}}, \
             {\"$addToSet\":{\"cids\":ObjectId(\"4d09359b1cc223ebd7f9797f\")}, \
             \"$set\":{\"xe\":true}}, {upsert:false, multi:true})"
                .to_string(),
        )),
        _ => updates.push((
            DB_MMSCONF,
            "db.getCollection('config.users').update({\"pe\":{\"$regex\":\"mongodb.com\"}}, \
             {\"$addToSet\":{\"roles\":{\"role\":\"XGEN_USER\"}}}, \
             {upsert:false, multi:true})"
                .to_string(),
        )),
    }
    updates
}

/// Applies the defaults reset against the live target.
fn reset_defaults(shell: &MongoShell, target_version: &str, ctx: &RunContext) -> Result<()> {
    info!("setting/resetting default values on the viewer instance");
    for (db, update) in reset_defaults_updates(target_version) {
        shell.eval(ctx, db, &update)?;
    }
    Ok(())
}

/// Drops every MMS database on the target instance.
///
/// Used to wipe a viewer instance between imports. The service should be
/// stopped first. Only databases matching the MMS name patterns are touched.
pub fn drop_databases(ctx: &RunContext) -> Result<()> {
    let paths = tools::locate(&["mongo"])?;
    let shell = MongoShell::new(paths.get("mongo")?);

    info!("dropping MMS databases");
    let lines = shell.eval(ctx, "test", "db.adminCommand('listDatabases').databases")?;
    let Ok(allow) = regex::RegexSet::new(ALL_MMS_DBS) else {
        return Err(MmsPortError::configuration(
            "invalid MMS database name patterns",
        ));
    };
    for name in parse_database_names(&lines) {
        if allow.is_match(&name) {
            info!("dropping {}", name);
            shell.eval(ctx, &name, "db.dropDatabase()")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged_fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let dump_dir = root.join(DUMP_DIR);
        let (gdb, gcoll) = COLLECTION_WITH_GROUPS;
        let groups_dir = dump_dir.join(COLLECTIONS_DIR).join(gdb);
        fs::create_dir_all(&groups_dir).unwrap();
        fs::write(
            groups_dir.join(gcoll),
            "{ \"n\" : \"12345-beta\", \"id\" : 2 }\n{ \"n\" : \"12345-acme\", \"id\" : 1 }\n",
        )
        .unwrap();
        (dir, root)
    }

    #[test]
    fn imported_groups_are_parsed_and_sorted() {
        let (_dir, root) = staged_fixture();
        let groups = imported_groups(&root).unwrap();
        assert_eq!(groups, vec!["12345-acme", "12345-beta"]);
    }

    #[test]
    fn config_subtree_is_removed_before_restore() {
        let (_dir, root) = staged_fixture();
        let dump_dir = root.join(DUMP_DIR);
        let config_dir = dump_dir.join(DB_CLOUDCONF);
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("app.settings.bson"), "settings").unwrap();

        let ctx = RunContext::new("localhost", 27017);
        clean_config_collections(&dump_dir, &ctx).unwrap();
        assert!(!config_dir.exists());
        // The rest of the dump survives.
        assert!(dump_dir.join(COLLECTIONS_DIR).exists());
    }

    #[test]
    fn import_metadata_lands_inside_the_document() {
        let (_dir, root) = staged_fixture();
        let dump_dir = root.join(DUMP_DIR);
        let (db, coll) = IMPORTER_LOGS;
        let logs_dir = dump_dir.join(COLLECTIONS_DIR).join(db);
        fs::create_dir_all(&logs_dir).unwrap();
        fs::write(
            logs_dir.join(coll),
            "{\"export_ts\":{\"$date\":1000}, \"export_host\":\"src\"}\n",
        )
        .unwrap();

        let ctx = RunContext::new("localhost", 27017);
        let groups = vec!["12345-acme".to_string()];
        append_import_metadata(&dump_dir, &groups, &ctx).unwrap();

        let contents = fs::read_to_string(logs_dir.join(coll)).unwrap();
        assert!(contents.contains("\"import_ts\""));
        assert!(contents.contains("\"import_host\""));
        assert!(contents.contains("\"groups\":[\"12345-acme\"]"));
        // Still one line, still closed.
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn defaults_reset_shape_for_modern_schema() {
        let updates = reset_defaults_updates("1.3");
        assert_eq!(updates.len(), 3);
        assert!(updates[0].1.contains("app.systemCronState"));
        assert!(updates[1].1.contains("config.alertSettings"));
        assert!(updates[2].1.contains("XGEN_USER"));
    }

    #[test]
    fn defaults_reset_shape_for_legacy_schema() {
        let updates = reset_defaults_updates("1.2");
        assert_eq!(updates.len(), 3);
        assert!(updates[2].1.contains("cids"));
        assert!(updates[2].1.contains("4d09359b1cc223ebd7f9797f"));
        assert!(updates[2].1.contains("\"xe\":true"));
    }

    #[test]
    fn defaults_reset_skips_user_grants_on_oldest_schema() {
        let updates = reset_defaults_updates("1.1");
        assert_eq!(updates.len(), 2);
    }

    #[test]
    fn unknown_future_versions_use_the_role_shape() {
        let updates = reset_defaults_updates("27");
        assert!(updates[2].1.contains("XGEN_USER"));
    }

    #[test]
    fn missing_data_path_is_a_precondition_error() {
        let ctx = RunContext::new("localhost", 27017);
        let result = stage_data(
            Path::new("/nonexistent/export.gzip"),
            Path::new("/tmp"),
            &ctx,
        );
        assert!(matches!(result, Err(MmsPortError::Precondition { .. })));
    }
}
