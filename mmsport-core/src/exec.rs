//! Controlled execution of external commands.
//!
//! Every external binary is invoked through [`CommandSpec`]: an executable
//! path plus a discrete argument list, optionally with a working directory.
//! Nothing is ever interpolated into a shell line, so operator-supplied
//! identifiers cannot change the shape of a command. Execution is
//! synchronous and blocking; there is no timeout handling.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::context::RunContext;
use crate::error::{MmsPortError, Result};

/// A fully specified external command, ready to run.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    /// Exit status; zero is success, -1 stands for death by signal.
    pub status: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// True when the command exited zero.
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Lines of standard output.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines()
    }

    /// Stdout and stderr combined, for error reporting.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

impl CommandSpec {
    /// Creates a command for the given executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory the command runs in.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Human-readable rendering for logs and error messages.
    ///
    /// Password values are masked so credentials never reach the logs.
    pub fn render(&self) -> String {
        let mut rendered = self.program.display().to_string();
        let mut mask_next = false;
        for arg in &self.args {
            rendered.push(' ');
            if mask_next {
                rendered.push_str("****");
            } else {
                rendered.push_str(arg);
            }
            mask_next = arg == "--password";
        }
        rendered
    }

    /// Runs the command synchronously and captures its output.
    ///
    /// Under dry-run the command is printed instead and an empty success
    /// result is returned.
    pub fn run(&self, ctx: &RunContext) -> Result<CommandOutput> {
        if ctx.dry_run {
            info!("would run: {}", self.render());
            return Ok(CommandOutput {
                status: 0,
                stdout: String::new(),
                stderr: String::new(),
            });
        }
        if ctx.verbose {
            info!("running: {}", self.render());
        } else {
            debug!("running: {}", self.render());
        }

        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        let output = command
            .output()
            .map_err(|e| MmsPortError::io(format!("failed to spawn {}", self.render()), e))?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Runs the command and fails on a non-zero exit status.
    pub fn run_checked(&self, ctx: &RunContext) -> Result<CommandOutput> {
        let output = self.run(ctx)?;
        if output.success() {
            Ok(output)
        } else {
            Err(MmsPortError::CommandFailed {
                command: self.render(),
                status: output.status,
                output: output.combined(),
            })
        }
    }
}

/// Wrapper around the `mongo` shell for one-shot `--eval` commands.
///
/// The result is unstructured text; callers parse the lines they need. This
/// keeps the tools free of any database driver dependency, the same trade
/// the historical exporter made.
#[derive(Debug)]
pub struct MongoShell {
    shell_path: PathBuf,
}

impl MongoShell {
    /// Creates a wrapper around the resolved `mongo` shell binary.
    pub fn new(shell_path: impl Into<PathBuf>) -> Self {
        Self {
            shell_path: shell_path.into(),
        }
    }

    /// Evaluates a JavaScript expression against `db` and returns the
    /// printed output lines.
    pub fn eval(&self, ctx: &RunContext, db: &str, expression: &str) -> Result<Vec<String>> {
        let spec = CommandSpec::new(&self.shell_path)
            .args(ctx.connection_args())
            .arg("--quiet")
            .arg("--eval")
            .arg(format!("printjson({})", expression))
            .arg(db);
        let output = spec.run_checked(ctx)?;

        let lines: Vec<String> = output.lines().map(str::to_string).collect();
        // An unauthenticated shell against a secured instance exits zero but
        // prints `undefined`; surface it as the failure it is.
        if ctx.auth.is_none() && lines.first().map(String::as_str) == Some("undefined") {
            return Err(MmsPortError::CommandFailed {
                command: spec.render(),
                status: 1,
                output: "undefined (is the instance secured? supply --username/--password)"
                    .to_string(),
            });
        }
        Ok(lines)
    }
}

/// Probes whether an executable at `path` responds to `--version`.
pub(crate) fn probe_version(path: &Path) -> bool {
    Command::new(path)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_ctx() -> RunContext {
        RunContext::new("localhost", 27017)
    }

    #[test]
    fn runs_a_command_and_captures_output() {
        let output = CommandSpec::new("echo")
            .arg("hello")
            .run(&plain_ctx())
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn checked_run_fails_on_nonzero_exit() {
        let result = CommandSpec::new("false").run_checked(&plain_ctx());
        assert!(matches!(
            result,
            Err(MmsPortError::CommandFailed { status, .. }) if status != 0
        ));
    }

    #[test]
    fn dry_run_executes_nothing() {
        let mut ctx = plain_ctx();
        ctx.dry_run = true;
        // The program does not exist; a dry run must still succeed.
        let output = CommandSpec::new("/nonexistent/mongodump")
            .arg("--host")
            .arg("localhost")
            .run(&ctx)
            .unwrap();
        assert!(output.success());
        assert!(output.stdout.is_empty());
    }

    #[test]
    fn render_masks_passwords() {
        let spec = CommandSpec::new("mongodump")
            .arg("--username")
            .arg("support")
            .arg("--password")
            .arg("s3cret")
            .arg("--host")
            .arg("localhost");
        let rendered = spec.render();
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("--password ****"));
        assert!(rendered.contains("--host localhost"));
    }

    #[test]
    fn combined_output_joins_streams() {
        let output = CommandOutput {
            status: 1,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
        };
        assert_eq!(output.combined(), "out\nerr");
    }
}
