//! Pipeline logic for the MMS support-data export/import tools.
//!
//! This crate provides the sequencing and bookkeeping shared by the
//! `mmsport-export` and `mmsport-import` binaries. It does no database work
//! itself: dumping, restoring, and per-collection export/import are delegated
//! to the external MongoDB administration binaries (`mongodump`,
//! `mongorestore`, `mongoexport`, `mongoimport`, and the `mongo` shell),
//! which are invoked synchronously and checked by exit status.
//!
//! # Architecture
//! - Structured command values (`exec::CommandSpec`) instead of shell
//!   templating; operator-supplied identifiers are passed as discrete
//!   arguments, never interpolated.
//! - An explicit run context (`context::RunContext`) threaded through every
//!   component; no global mutable state.
//! - Fatal conditions surface as `MmsPortError` and terminate the run;
//!   non-critical step failures are counted in a `context::RunReport` and
//!   reported in the end-of-run tally.

pub mod archive;
pub mod context;
pub mod error;
pub mod exec;
pub mod export;
pub mod import;
pub mod layout;
pub mod logging;
pub mod sanitize;
pub mod space;
pub mod tools;
pub mod version;

pub use context::{Auth, RunContext, RunReport};
pub use error::{MmsPortError, Result};
pub use logging::init_logging;

/// Exit status used for every fatal condition, matching the historical tools.
pub const FATAL_EXIT_CODE: i32 = 100;
