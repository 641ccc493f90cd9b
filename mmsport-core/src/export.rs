//! Export sequencer: dump, scrub, tag, package, ship.
//!
//! The pipeline is strictly sequential: locate tools, run the pre-flight
//! gates, dump with `mongodump`, scrub sensitive files, export plain-text
//! sidecars with `mongoexport`, tag the tree with its schema version, record
//! provenance, then optionally package and ship. Missing prerequisites,
//! failed pre-flight checks, a failed dump, and a malformed dump tree are
//! fatal; sidecar and provenance failures are counted and the remaining
//! steps still run.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::archive;
use crate::context::{RunContext, RunReport};
use crate::error::{MmsPortError, Result};
use crate::exec::{CommandSpec, MongoShell};
use crate::layout::{
    COLLECTIONS_DIR, COLLECTIONS_TO_EXPORT, COLLECTION_WITH_GROUPS, DUMP_DIR, IMPORTER_LOGS,
};
use crate::sanitize;
use crate::space;
use crate::tools::{self, ToolPaths, EXPORT_DEPS};
use crate::version;

/// What happens to the dump tree once it is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Leave the dump tree on disk.
    DumpOnly,
    /// Package into an archive, leave the archive on disk.
    Package,
    /// Package and transfer to the support dropbox.
    Ship,
}

/// Operator choices for one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Directory receiving the dump tree and archive.
    pub directory: PathBuf,
    /// Tracking/case identifier; required when packaging or shipping.
    pub caseid: String,
    /// Remove a pre-existing dump tree instead of refusing to run.
    pub force: bool,
    /// Skip the space and database sanity gates.
    pub no_check: bool,
    /// What to do with the finished dump tree.
    pub disposition: Disposition,
}

/// Runs the export pipeline end to end.
pub fn run(options: &ExportOptions, ctx: &RunContext) -> Result<RunReport> {
    let mut report = RunReport::new();

    // Shipping is namespaced by the case; refuse before anything is created.
    if options.disposition != Disposition::DumpOnly && options.caseid.is_empty() {
        return Err(MmsPortError::configuration(
            "you must provide --caseid in order to ship or create a shippable package",
        ));
    }

    let dump_dir = options.directory.join(DUMP_DIR);
    check_dump_dir(&dump_dir, options.force, ctx)?;

    let paths = tools::locate(&EXPORT_DEPS)?;
    let shell = MongoShell::new(paths.get("mongo")?);

    if options.no_check {
        warn!("pre-flight checks disabled; you are responsible for disk space");
    } else {
        preflight(&shell, &options.directory, ctx)?;
    }

    dump_database(&paths, &options.directory, ctx)?;
    sanitize::scrub(&dump_dir, ctx)?;

    if let Err(e) = export_sidecars(&paths, &dump_dir, &options.caseid, ctx) {
        error!("sidecar export failed: {}", e);
        report.count_error();
    }
    if let Err(e) = tag_version(&dump_dir, ctx) {
        error!("version tagging failed: {}", e);
        report.count_error();
    }
    if let Err(e) = write_provenance(&dump_dir, ctx) {
        error!("provenance record failed: {}", e);
        report.count_error();
    }

    match options.disposition {
        Disposition::DumpOnly => {}
        Disposition::Package => {
            let target = package_archive(&options.directory, &options.caseid, ctx)?;
            info!("package ready: {}", target.display());
        }
        Disposition::Ship => {
            let target = package_archive(&options.directory, &options.caseid, ctx)?;
            archive::ship(&target, &options.caseid, ctx)?;
        }
    }

    Ok(report)
}

/// Space and database sanity gates. Under dry-run the source server is never
/// queried, so the gates cannot be evaluated and are skipped.
fn preflight(shell: &MongoShell, directory: &Path, ctx: &RunContext) -> Result<()> {
    if ctx.dry_run {
        info!("dry run, skipping pre-flight checks");
        return Ok(());
    }
    let estimate = space::estimate_data_mb(shell, ctx)?;
    space::check_free_space(directory, &estimate)
}

/// Packages the dump tree, or under dry-run only reports where the archive
/// would go. There is no dump tree to package on a dry run.
fn package_archive(directory: &Path, caseid: &str, ctx: &RunContext) -> Result<PathBuf> {
    if ctx.dry_run {
        let target = directory.join(format!("{}.gzip", caseid));
        info!("would package {} into {}", directory.join(DUMP_DIR).display(), target.display());
        return Ok(target);
    }
    archive::package(directory, caseid)
}

/// Refuses to run over a stale dump tree; with force, removes it first.
///
/// This is the only place the tool ever removes pre-existing data, and the
/// removal refuses any path that does not contain the dump directory name.
fn check_dump_dir(dump_dir: &Path, force: bool, ctx: &RunContext) -> Result<()> {
    if !dump_dir.exists() {
        return Ok(());
    }
    if !force {
        return Err(MmsPortError::precondition(format!(
            "use --force OR remove the directory manually: {}",
            dump_dir.display()
        )));
    }
    safe_rm_tree(dump_dir, ctx)
}

/// Guarded recursive removal: the path must denote a dump tree.
pub(crate) fn safe_rm_tree(directory: &Path, ctx: &RunContext) -> Result<()> {
    if !directory.display().to_string().contains(DUMP_DIR) {
        return Err(MmsPortError::precondition(format!(
            "unexpected directory to remove: {}",
            directory.display()
        )));
    }
    if ctx.dry_run {
        info!("would remove {}", directory.display());
        return Ok(());
    }
    info!("removing {}", directory.display());
    fs::remove_dir_all(directory)
        .map_err(|e| MmsPortError::io(format!("failed to remove {}", directory.display()), e))
}

fn dump_database(paths: &ToolPaths, directory: &Path, ctx: &RunContext) -> Result<()> {
    info!("dumping database...");
    CommandSpec::new(paths.get("mongodump")?)
        .args(ctx.connection_args())
        .current_dir(directory)
        .run_checked(ctx)?;
    info!("dump done");
    Ok(())
}

/// Exports plain-text sidecar renderings of selected collections.
///
/// These make the shipped data reviewable by the customer, and the
/// migrations sidecar doubles as the version-classifier input. Group names
/// in the customer collection are prefixed with the case identifier.
fn export_sidecars(
    paths: &ToolPaths,
    dump_dir: &Path,
    caseid: &str,
    ctx: &RunContext,
) -> Result<()> {
    info!("exporting additional collections");
    for (db, coll) in COLLECTIONS_TO_EXPORT {
        let json_file = dump_dir.join(COLLECTIONS_DIR).join(db).join(coll);
        CommandSpec::new(paths.get("mongoexport")?)
            .args(ctx.connection_args())
            .arg("-d")
            .arg(db)
            .arg("-c")
            .arg(coll)
            .arg("-o")
            .arg(json_file.display().to_string())
            .run_checked(ctx)?;
        if !ctx.dry_run && (db, coll) == COLLECTION_WITH_GROUPS {
            sanitize::prefix_group_names(&json_file, caseid)?;
        }
    }
    Ok(())
}

fn tag_version(dump_dir: &Path, ctx: &RunContext) -> Result<()> {
    if ctx.dry_run {
        return Ok(());
    }
    let label = version::from_dump_tree(dump_dir)?;
    info!("MMS version is {}", label);
    version::write_version_file(dump_dir, &label)
}

/// One importer log document, written in MongoDB extended JSON so that
/// `mongoimport` restores the timestamp as a real date.
#[derive(Debug, Serialize)]
struct ProvenanceRecord {
    export_ts: ExtendedDate,
    export_host: String,
}

#[derive(Debug, Serialize)]
struct ExtendedDate {
    #[serde(rename = "$date")]
    millis: i64,
}

/// Records export timestamp and source hostname into the dump tree, so the
/// import can be tracked and searched in the target instance. Independent of
/// sanitization.
fn write_provenance(dump_dir: &Path, ctx: &RunContext) -> Result<()> {
    if ctx.dry_run {
        return Ok(());
    }
    let (db, coll) = IMPORTER_LOGS;
    let db_dir = dump_dir.join(COLLECTIONS_DIR).join(db);
    if db_dir.exists() {
        safe_rm_tree(&db_dir, ctx)?;
    }
    fs::create_dir_all(&db_dir)
        .map_err(|e| MmsPortError::io(format!("failed to create {}", db_dir.display()), e))?;

    let doc = ProvenanceRecord {
        export_ts: ExtendedDate {
            millis: Utc::now().timestamp_millis(),
        },
        export_host: hostname(),
    };
    let path = db_dir.join(coll);
    let mut file = fs::File::create(&path)
        .map_err(|e| MmsPortError::io(format!("failed to create {}", path.display()), e))?;
    let line = serde_json::to_string(&doc).map_err(|e| MmsPortError::Serialization {
        context: "provenance record".to_string(),
        source: e,
    })?;
    writeln!(file, "{}", line)
        .map_err(|e| MmsPortError::io(format!("failed to write {}", path.display()), e))
}

fn hostname() -> String {
    whoami::fallible::hostname().unwrap_or_else(|_| "unknown-host".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(directory: &Path) -> ExportOptions {
        ExportOptions {
            directory: directory.to_path_buf(),
            caseid: "12345".to_string(),
            force: false,
            no_check: true,
            disposition: Disposition::DumpOnly,
        }
    }

    #[test]
    fn ship_without_caseid_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.caseid = String::new();
        opts.disposition = Disposition::Ship;
        let ctx = RunContext::new("localhost", 27017);

        let result = run(&opts, &ctx);
        assert!(matches!(result, Err(MmsPortError::Configuration { .. })));
        // Nothing was created, archive included.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn stale_dump_dir_without_force_is_a_precondition_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(DUMP_DIR)).unwrap();
        let ctx = RunContext::new("localhost", 27017);

        let result = run(&options(dir.path()), &ctx);
        assert!(matches!(result, Err(MmsPortError::Precondition { .. })));
        // The stale tree was not touched.
        assert!(dir.path().join(DUMP_DIR).exists());
    }

    #[test]
    fn force_removes_the_stale_dump_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dump_dir = dir.path().join(DUMP_DIR);
        fs::create_dir(&dump_dir).unwrap();
        fs::write(dump_dir.join("stale"), "old data").unwrap();

        let ctx = RunContext::new("localhost", 27017);
        check_dump_dir(&dump_dir, true, &ctx).unwrap();
        assert!(!dump_dir.exists());
    }

    #[test]
    fn safe_rm_tree_refuses_non_dump_paths() {
        let dir = tempfile::tempdir().unwrap();
        let unrelated = dir.path().join("precious-data");
        fs::create_dir(&unrelated).unwrap();
        let ctx = RunContext::new("localhost", 27017);

        let result = safe_rm_tree(&unrelated, &ctx);
        assert!(matches!(result, Err(MmsPortError::Precondition { .. })));
        assert!(unrelated.exists());
    }

    #[test]
    fn dry_run_skips_the_preflight_gates() {
        // The shell path is deliberately bogus: a dry run must never reach
        // the server, so the gates cannot count databases and must not abort.
        let dir = tempfile::tempdir().unwrap();
        let shell = MongoShell::new("/nonexistent/mongo");
        let mut ctx = RunContext::new("localhost", 27017);
        ctx.dry_run = true;

        preflight(&shell, dir.path(), &ctx).unwrap();
    }

    #[test]
    fn dry_run_packaging_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = RunContext::new("localhost", 27017);
        ctx.dry_run = true;

        let target = package_archive(dir.path(), "12345", &ctx).unwrap();
        assert_eq!(target, dir.path().join("12345.gzip"));
        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn provenance_record_is_a_single_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new("localhost", 27017);
        write_provenance(dir.path(), &ctx).unwrap();

        let (db, coll) = IMPORTER_LOGS;
        let contents =
            fs::read_to_string(dir.path().join(COLLECTIONS_DIR).join(db).join(coll)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert!(doc["export_ts"]["$date"].is_i64());
        assert!(doc["export_host"].is_string());
    }
}
