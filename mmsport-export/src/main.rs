//! MMS instance export tool.
//!
//! Connects to a source MMS deployment, verifies there is enough disk space
//! for a full dump, dumps every MMS database with `mongodump`, strips known
//! sensitive data, adds plain-text sidecar exports and a schema version tag,
//! and optionally packages and ships the result to the support dropbox under
//! a case identifier.
//!
//! The tool never removes pre-existing data implicitly: a stale `dump/`
//! directory is an error unless `--force` is given.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser};
use mmsport_core::export::{self, Disposition, ExportOptions};
use mmsport_core::{init_logging, Auth, RunContext, FATAL_EXIT_CODE};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mmsport-export")]
#[command(about = "Export an MMS instance's data for support diagnostics")]
#[command(version)]
#[command(long_about = "
MMS Exporter - dump, scrub, package, and ship an MMS instance

The pipeline:
- checks available disk space against the size of the MMS databases
- dumps all data with mongodump
- removes sensitive collections (users, emails, alert settings)
- exports plain-text sidecar copies of selected collections for review
- tags the dump with its schema version for the importer
- optionally packages the dump and ships it under a support case ID

The external MongoDB tools (mongo, mongodump, mongoexport) must be on PATH,
or MONGO_HOME must point at the installation root.

EXAMPLES:
  mmsport-export --host mms.internal -p 27017
  mmsport-export -c 12345 --zip
  mmsport-export -c 12345 --ship --username admin
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Case/ticket to associate the data with, e.g. 12345 for case ec-12345
    #[arg(short, long, default_value = "", help = "caseid/ticket to associate the data with")]
    caseid: String,

    /// Directory where the dump tree and archive are created
    #[arg(short, long, default_value = ".", help = "directory where to put the dump and tar file")]
    directory: PathBuf,

    /// Remove a previous 'dump' directory instead of refusing to run
    #[arg(short, long, help = "force removal of a previous 'dump' directory")]
    force: bool,

    /// Skip the disk-space and database sanity checks
    #[arg(long, help = "don't run any check; you must ensure you have enough space")]
    no_check: bool,

    /// Print every command instead of executing it
    #[arg(long, help = "don't run any command, just show them")]
    dry_run: bool,

    /// Ship the packaged data under the given case identifier
    #[arg(short, long, help = "ship the data under the given --caseid number")]
    ship: bool,

    /// Package the data, but do not ship it
    #[arg(short, long, help = "zip the data, but do not ship it")]
    zip: bool,
}

/// Connection and verbosity flags shared with the importer.
#[derive(Args)]
struct GlobalArgs {
    /// Host name of the MMS server
    #[arg(long, default_value = "localhost", help = "host name of the MMS server")]
    host: String,

    /// Port of the MMS server
    #[arg(short, long, default_value_t = 27017, help = "port of the MMS server")]
    port: u16,

    /// Username for a secured MMS database
    #[arg(long, help = "username for a secured MMS DB")]
    username: Option<String>,

    /// Password for a secured MMS database; prompted when omitted
    #[arg(long, help = "password for a secured MMS DB (prompted if omitted)")]
    password: Option<String>,

    /// Authentication database
    #[arg(long, default_value = "admin", help = "authentication database")]
    auth_db: String,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, help = "show more output (-v, -vv)")]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, help = "suppress all output except errors")]
    quiet: bool,
}

impl GlobalArgs {
    /// Builds the run context, prompting for a missing password.
    fn run_context(&self, dry_run: bool) -> mmsport_core::Result<RunContext> {
        let mut ctx = RunContext::new(
            mmsport_core::context::resolve_host_alias(&self.host),
            self.port,
        );
        ctx.verbose = self.verbose > 0;
        ctx.dry_run = dry_run;

        match (&self.username, &self.password) {
            (None, None) => {}
            (None, Some(_)) => {
                return Err(mmsport_core::MmsPortError::configuration(
                    "you must provide both --username and --password",
                ));
            }
            (Some(username), password) => {
                let password = match password {
                    Some(p) => p.clone(),
                    None => rpassword::prompt_password(format!("password for {}: ", username))
                        .map_err(|e| {
                            mmsport_core::MmsPortError::configuration(format!(
                                "failed to read password: {}",
                                e
                            ))
                        })?,
                };
                let mut auth = Auth::new(username.clone(), password);
                auth.auth_database = self.auth_db.clone();
                ctx.auth = Some(auth);
            }
        }
        Ok(ctx)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet) {
        eprintln!("error: {}", e);
        return exit_fatal();
    }

    match run(&cli) {
        Ok(errors) if errors > 0 => {
            error!("the run terminated with {} error(s)", errors);
            ExitCode::SUCCESS
        }
        Ok(_) => {
            info!("done, no errors");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("fatal: {}", e);
            exit_fatal()
        }
    }
}

fn run(cli: &Cli) -> mmsport_core::Result<u32> {
    let ctx = cli.global.run_context(cli.dry_run)?;

    let disposition = if cli.ship {
        Disposition::Ship
    } else if cli.zip {
        Disposition::Package
    } else {
        Disposition::DumpOnly
    };
    let options = ExportOptions {
        directory: cli.directory.clone(),
        caseid: cli.caseid.clone(),
        force: cli.force,
        no_check: cli.no_check,
        disposition,
    };

    let report = export::run(&options, &ctx)?;
    Ok(report.errors())
}

fn exit_fatal() -> ExitCode {
    // u8 cast is safe: the sentinel is 100.
    ExitCode::from(FATAL_EXIT_CODE as u8)
}
