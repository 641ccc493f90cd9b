//! Space Estimator: pre-flight disk-space and database sanity gates.
//!
//! Before anything long-running or destructive starts, the exporter checks
//! that the destination filesystem has room for the dump plus the packaged
//! archive, and that the source actually looks like an MMS deployment:
//! databases are matched against an allow-list and an ignore-list, and both
//! too many unrecognized databases and too few recognized ones abort the
//! run. Every gate is skippable with the explicit no-check flag, which
//! shifts responsibility to the operator.

use std::path::Path;
use std::sync::OnceLock;

use regex::RegexSet;
use tracing::{debug, warn};

use crate::context::RunContext;
use crate::error::{MmsPortError, Result};
use crate::exec::MongoShell;
use crate::layout::{ALL_MMS_DBS, IGNORE_DBS};

/// Minimum free space on the destination filesystem, in MB.
pub const MIN_DISK_SPACE_MB: u64 = 3000;

/// Unrecognized databases tolerated before aborting.
pub const MAX_UNEXPECTED_DBS: usize = 0;

/// Minimum number of recognized MMS databases; fewer suggests an
/// unprovisioned or wrong instance.
pub const MIN_EXPECTED_DBS: usize = 14;

/// Required space is this multiple of the estimated data size: one for the
/// raw dump, one for the packaged archive, one for margin.
pub const SPACE_FACTOR: u64 = 3;

/// How a database name relates to an MMS deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    /// Belongs to MMS; its size counts toward the estimate.
    Recognized,
    /// A system database; neither exported nor suspicious.
    Ignored,
    /// Neither MMS nor system; a sign this deployment is not what the
    /// operator believes it is.
    Unexpected,
}

fn allow_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| match RegexSet::new(ALL_MMS_DBS) {
        Ok(set) => set,
        // The patterns are compile-time constants; this cannot fail.
        Err(_) => RegexSet::empty(),
    })
}

fn ignore_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| match RegexSet::new(IGNORE_DBS) {
        Ok(set) => set,
        Err(_) => RegexSet::empty(),
    })
}

/// Classifies a database name against the allow and ignore lists.
pub fn classify_database(name: &str) -> DbKind {
    if allow_set().is_match(name) {
        DbKind::Recognized
    } else if ignore_set().is_match(name) {
        DbKind::Ignored
    } else {
        DbKind::Unexpected
    }
}

/// Free space on the filesystem holding `directory`, in MB.
pub fn available_mb(directory: &Path) -> Result<u64> {
    let bytes = fs2::available_space(directory).map_err(|e| {
        MmsPortError::io(
            format!("failed to query free space on {}", directory.display()),
            e,
        )
    })?;
    Ok(bytes / (1024 * 1024))
}

/// Outcome of enumerating the source server's databases.
#[derive(Debug, Default)]
pub struct SpaceEstimate {
    /// Summed `dataSize` of recognized databases, in MB.
    pub data_mb: u64,
    /// Recognized MMS database count.
    pub recognized: usize,
    /// Databases that matched neither list.
    pub unexpected: Vec<String>,
}

impl SpaceEstimate {
    /// Space the export needs on disk, in MB. Saturates rather than wraps
    /// when the reported data size is absurd.
    pub fn required_mb(&self) -> u64 {
        self.data_mb.saturating_mul(SPACE_FACTOR)
    }
}

/// Extracts database names from `listDatabases` shell output.
pub fn parse_database_names(lines: &[String]) -> Vec<String> {
    // The pattern is a compile-time constant; it cannot fail to compile.
    let Ok(name_re) = regex::Regex::new(r#""name"\s*:\s*"(.+?)""#) else {
        return Vec::new();
    };
    lines
        .iter()
        .filter_map(|line| name_re.captures(line))
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Enumerates the source databases and estimates the volume to be dumped.
///
/// Aborts when unrecognized databases exceed tolerance or recognized ones
/// fall below the minimum. Callers skip this entirely when checks are
/// disabled.
pub fn estimate_data_mb(shell: &MongoShell, ctx: &RunContext) -> Result<SpaceEstimate> {
    let lines = shell.eval(ctx, "test", "db.adminCommand('listDatabases').databases")?;
    let mut estimate = SpaceEstimate::default();

    for name in parse_database_names(&lines) {
        match classify_database(&name) {
            DbKind::Recognized => {
                let size_lines = shell.eval(ctx, &name, "db.stats().dataSize")?;
                let reported = size_lines.first().map(String::as_str).unwrap_or("0");
                let db_mb = parse_data_size_mb(reported);
                debug!("database {}: {} MB", name, db_mb);
                estimate.data_mb += db_mb;
                estimate.recognized += 1;
            }
            DbKind::Ignored => {}
            DbKind::Unexpected => {
                warn!("unexpected database on the MMS server: {}", name);
                estimate.unexpected.push(name);
                if estimate.unexpected.len() > MAX_UNEXPECTED_DBS {
                    return Err(MmsPortError::precondition(format!(
                        "too many unexpected databases, will not export unless you run with \
                         --no-check; unexpected: {}",
                        estimate.unexpected.join(", ")
                    )));
                }
            }
        }
    }

    if estimate.recognized < MIN_EXPECTED_DBS {
        return Err(MmsPortError::precondition(format!(
            "found only {} MMS databases (expected at least {}); if you are sure this is the \
             right instance, re-run with --no-check",
            estimate.recognized, MIN_EXPECTED_DBS
        )));
    }
    debug!("estimated data size: {} MB", estimate.data_mb);
    Ok(estimate)
}

/// Parses a `dataSize` value printed by the shell into whole MB.
fn parse_data_size_mb(reported: &str) -> u64 {
    let bytes: f64 = reported.trim().parse().unwrap_or(0.0);
    (bytes / (1024.0 * 1024.0)) as u64
}

/// Verifies the destination has enough room for the estimated export.
pub fn check_free_space(directory: &Path, estimate: &SpaceEstimate) -> Result<()> {
    let avail = available_mb(directory)?;
    debug!("space available on disk: {} MB", avail);
    if avail < MIN_DISK_SPACE_MB {
        return Err(MmsPortError::precondition(format!(
            "disk should have at least ~{} MB free, only {} MB available",
            MIN_DISK_SPACE_MB, avail
        )));
    }
    let needed = estimate.required_mb();
    if avail < needed {
        return Err(MmsPortError::precondition(format!(
            "export needs ~{} MB free, only {} MB available",
            needed, avail
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_mms_databases() {
        for name in ["apiv3", "alerts", "cloudconf", "importer", "importer2"] {
            assert_eq!(classify_database(name), DbKind::Recognized, "{}", name);
        }
        assert_eq!(classify_database("mmsdb"), DbKind::Recognized);
        assert_eq!(classify_database("mmsdblogs-3"), DbKind::Recognized);
        assert_eq!(classify_database("mongo-distributed-lock"), DbKind::Recognized);
    }

    #[test]
    fn classifies_system_databases() {
        for name in ["admin", "config", "local", "test"] {
            assert_eq!(classify_database(name), DbKind::Ignored, "{}", name);
        }
    }

    #[test]
    fn flags_unrelated_databases() {
        assert_eq!(classify_database("inventory"), DbKind::Unexpected);
        assert_eq!(classify_database("administration"), DbKind::Ignored); // ^admin is unanchored
        assert_eq!(classify_database("configs"), DbKind::Unexpected); // ^config$ is anchored
    }

    #[test]
    fn parses_names_from_listdatabases_output() {
        let lines = vec![
            "[".to_string(),
            "\t{".to_string(),
            "\t\t\"name\" : \"mmsdb\",".to_string(),
            "\t\t\"sizeOnDisk\" : 1234".to_string(),
            "\t},".to_string(),
            "\t{ \"name\" : \"admin\", \"empty\" : true }".to_string(),
            "]".to_string(),
        ];
        assert_eq!(parse_database_names(&lines), vec!["mmsdb", "admin"]);
    }

    #[test]
    fn data_size_parses_plain_and_float() {
        assert_eq!(parse_data_size_mb("2097152"), 2);
        assert_eq!(parse_data_size_mb("2097152.0"), 2);
        assert_eq!(parse_data_size_mb("garbage"), 0);
    }

    #[test]
    fn required_space_is_three_times_the_estimate() {
        let estimate = SpaceEstimate {
            data_mb: 100,
            recognized: 14,
            unexpected: Vec::new(),
        };
        assert_eq!(estimate.required_mb(), 300);
    }

    #[test]
    fn required_space_saturates_on_absurd_estimates() {
        let estimate = SpaceEstimate {
            data_mb: u64::MAX / 2,
            recognized: 14,
            unexpected: Vec::new(),
        };
        assert_eq!(estimate.required_mb(), u64::MAX);
    }

    #[test]
    fn insufficient_space_aborts_the_preflight() {
        let dir = tempfile::tempdir().unwrap();
        // No filesystem can satisfy a saturated estimate.
        let estimate = SpaceEstimate {
            data_mb: u64::MAX / 8,
            recognized: 14,
            unexpected: Vec::new(),
        };
        let result = check_free_space(dir.path(), &estimate);
        assert!(matches!(result, Err(MmsPortError::Precondition { .. })));
    }

    #[test]
    fn available_space_is_queryable() {
        let dir = tempfile::tempdir().unwrap();
        // Any real filesystem reports something; the exact number is not ours
        // to assert.
        assert!(available_mb(dir.path()).is_ok());
    }
}
