//! MMS support-data import tool.
//!
//! Reconstitutes an exported MMS dataset into a viewer instance: unpacks the
//! shipped archive, verifies the archive's schema version matches the target
//! instance, strips the source's instance-wide configuration, restores with
//! `mongorestore`/`mongoimport`, and resets operational defaults so imported
//! alert rules do not fire against live data.
//!
//! The `drop` subcommand wipes every MMS database from the target, for
//! resetting a viewer instance between imports (stop the MMS service first).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use mmsport_core::import::{self, ImportOptions};
use mmsport_core::{init_logging, Auth, RunContext, FATAL_EXIT_CODE};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mmsport-import")]
#[command(about = "Import exported MMS support data into a viewer instance")]
#[command(version)]
#[command(long_about = "
MMS Importer - restore shipped MMS support data

The pipeline:
- reads the target instance's schema version from its migrations collection
- unpacks the shipped .gzip archive (or uses an already-unpacked directory)
- refuses to restore when the archive and target schema versions differ
- removes the source's instance configuration so the target's survives
- restores the dump and the sidecar collections
- disables restored cron/alert settings and grants internal accounts
  visibility of the imported groups

The external MongoDB tools (mongo, mongorestore, mongoimport) must be on
PATH, or MONGO_HOME must point at the installation root.

EXAMPLES:
  mmsport-import --data 12345.gzip
  mmsport-import --data ./extracted --upsert
  mmsport-import drop
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Command>,

    /// Archive (.gzip) or already-unpacked directory to import
    #[arg(short, long, help = "name of the .gzip file or directory to import")]
    data: Option<PathBuf>,

    /// Temporary directory used for unpacking
    #[arg(short, long, default_value = ".", help = "temporary dir to use for the restore")]
    tmpdir: PathBuf,

    /// Upsert/update data that already exists
    #[arg(short, long, help = "upsert/update the data that already exists")]
    upsert: bool,

    /// Print every command instead of executing it
    #[arg(long, help = "don't run any command, just show them")]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Drop every MMS database on the target instance
    Drop,
}

/// Connection and verbosity flags shared with the exporter.
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

    match &cli.command {
        Some(Command::Drop) => {
            import::drop_databases(&ctx)?;
            Ok(0)
        }
        None => {
            let options = ImportOptions {
                data: cli.data.clone(),
                tmpdir: cli.tmpdir.clone(),
                upsert: cli.upsert,
            };
            let report = import::run(&options, &ctx)?;
            Ok(report.errors())
        }
    }
}

fn exit_fatal() -> ExitCode {
    ExitCode::from(FATAL_EXIT_CODE as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_import() {
        let cli = Cli::parse_from(["mmsport-import", "--data", "12345.gzip"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.data, Some(PathBuf::from("12345.gzip")));
        assert_eq!(cli.tmpdir, PathBuf::from("."));
        assert!(!cli.upsert);
    }

    #[test]
    fn cli_parses_drop_subcommand() {
        let cli = Cli::parse_from(["mmsport-import", "drop"]);
        assert!(matches!(cli.command, Some(Command::Drop)));
    }

    #[test]
    fn password_without_username_is_rejected() {
        let cli = Cli::parse_from(["mmsport-import", "--password", "x"]);
        assert!(cli.global.run_context(false).is_err());
    }
}
