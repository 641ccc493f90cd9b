//! Run context and run report.
//!
//! The context replaces the historical tools' package-level `Verbose`,
//! `Norun`, and error-counter globals with an explicit value threaded through
//! every component call. The report is the explicit result object the
//! sequencers accumulate instead of mutating shared state.

use std::fs;
use std::path::Path;

use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::layout::{AUTH_DB, HOSTS_FILE};

/// Credentials for a secured MMS database.
///
/// The password is wiped from memory when the value is dropped. Credentials
/// are always rendered as discrete arguments for the external tools, never
/// interpolated into a command line string.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Auth {
    /// Username for the source/target instance.
    pub username: String,
    /// Password for the source/target instance.
    pub password: String,
    /// Authentication database, `admin` unless overridden.
    pub auth_database: String,
}

impl Auth {
    /// Creates credentials against the default authentication database.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            auth_database: AUTH_DB.to_string(),
        }
    }

    /// Renders the credentials as arguments for the MongoDB tools.
    pub fn as_args(&self) -> Vec<String> {
        vec![
            "--username".to_string(),
            self.username.clone(),
            "--password".to_string(),
            self.password.clone(),
            "--authenticationDatabase".to_string(),
            self.auth_database.clone(),
        ]
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("username", &self.username)
            .field("password", &"****")
            .field("auth_database", &self.auth_database)
            .finish()
    }
}

/// Everything a pipeline step needs to know about the current run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Host of the source/target MMS instance.
    pub host: String,
    /// Port of the source/target MMS instance.
    pub port: u16,
    /// Credentials for a secured instance.
    pub auth: Option<Auth>,
    /// Show every command being run.
    pub verbose: bool,
    /// Print commands instead of executing them; skip destructive file
    /// operations.
    pub dry_run: bool,
}

impl RunContext {
    /// Creates a context for the given instance with defaults otherwise.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            auth: None,
            verbose: false,
            dry_run: false,
        }
    }

    /// Connection arguments (`--host`, `--port`, credentials) for the
    /// external MongoDB tools.
    pub fn connection_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(auth) = &self.auth {
            args.extend(auth.as_args());
        }
        args.push("--host".to_string());
        args.push(self.host.clone());
        args.push("--port".to_string());
        args.push(self.port.to_string());
        args
    }
}

/// Tally of non-fatal errors accumulated over a run.
///
/// Non-critical step failures are counted here and reported at the end of
/// the run; the process still exits zero when no fatal condition occurred.
#[derive(Debug, Default)]
pub struct RunReport {
    errors: u32,
}

impl RunReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one non-fatal error.
    pub fn count_error(&mut self) {
        self.errors += 1;
    }

    /// Number of non-fatal errors recorded.
    pub fn errors(&self) -> u32 {
        self.errors
    }

    /// True if any non-fatal error was recorded.
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

/// Replaces a hostname by its alias from the hosts file, when one exists.
///
/// A line whose first column equals `hostname` maps it to the second column.
/// Used so operators can point the tools at the name an instance is actually
/// reachable under.
pub fn resolve_host_alias(hostname: &str) -> String {
    resolve_host_alias_in(hostname, Path::new(HOSTS_FILE))
}

fn resolve_host_alias_in(hostname: &str, hosts_file: &Path) -> String {
    if let Ok(contents) = fs::read_to_string(hosts_file) {
        for line in contents.lines() {
            let mut items = line.split_whitespace();
            if let (Some(first), Some(second)) = (items.next(), items.next()) {
                if first == hostname {
                    debug!("resolved host {} to {}", hostname, second);
                    return second.to_string();
                }
            }
        }
    }
    hostname.to_string()
}
