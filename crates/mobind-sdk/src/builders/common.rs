//! Common utilities shared between the Android and Apple builders.
//!
//! Every external tool invocation and every filesystem mutation made by the
//! pipeline goes through [`Shell`], so dry-run and command echo behave the same
//! way in every stage, and tests can swap in a scripted [`CommandRunner`].
//!
//! ## Error Messages
//!
//! Process failures are reported as [`ProcessError`], which carries:
//! - The full command line (including environment overrides)
//! - The exit status
//! - The tool's stdout and stderr, verbatim

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::types::BindError;

/// Whether a command only inspects state or changes it.
///
/// Query commands run even during a dry run because later stages need their
/// output (package listings, module metadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    /// Reads state; always executed.
    Query,
    /// Produces files or other side effects; skipped on dry runs.
    #[default]
    Mutating,
}

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    /// Program to execute, resolved through `PATH` when not absolute.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Environment overrides applied on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Working directory, or the current directory when `None`.
    pub cwd: Option<PathBuf>,
    /// Query or mutating.
    pub kind: CommandKind,
}

impl CommandSpec {
    /// Creates a mutating command for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a path argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
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

    /// Sets one environment override.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets every override in `vars`.
    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Marks the command as a read-only query.
    pub fn query(mut self) -> Self {
        self.kind = CommandKind::Query;
        self
    }

    /// Whether any argument equals `arg`.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Returns the value following `flag`, e.g. the path after `-o`.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        let pos = self.args.iter().position(|a| a == flag)?;
        self.args.get(pos + 1).map(String::as_str)
    }

    /// Returns the value of a `-flag=value` style argument.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let prefix = format!("{}=", flag);
        self.args
            .iter()
            .find_map(|a| a.strip_prefix(prefix.as_str()))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dir) = &self.cwd {
            write!(f, "cd {} && ", dir.display())?;
        }
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, shell_quote(value))?;
        }
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=./,:+@%".contains(c))
    {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code, if the process exited normally.
    pub status: Option<i32>,
    /// Whether the process reported success.
    pub success: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit code and stderr.
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Executes [`CommandSpec`]s.
///
/// Returns `Err` only when the process could not be started; a non-zero exit
/// is reported through [`CommandOutput::success`].
pub trait CommandRunner {
    /// Runs the command to completion and captures its output.
    fn run(&self, cmd: &CommandSpec) -> io::Result<CommandOutput>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).envs(&spec.env);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        let output = cmd.output()?;
        Ok(CommandOutput {
            status: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// A failed external command.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The process could not be started.
    #[error("failed to start `{command}`: {source}. Ensure the tool is installed and available on PATH")]
    Spawn {
        /// Command line that was attempted.
        command: String,
        /// Spawn failure.
        #[source]
        source: io::Error,
    },

    /// The process ran and exited unsuccessfully.
    #[error("`{command}` failed (exit status: {})\n{}", status_text(.status), output_excerpt(.stdout, .stderr))]
    Failed {
        /// Command line that failed.
        command: String,
        /// Exit code, `None` if terminated by a signal.
        status: Option<i32>,
        /// Captured stdout.
        stdout: String,
        /// Captured stderr.
        stderr: String,
    },
}

impl ProcessError {
    /// Builds a [`ProcessError::Failed`].
    pub fn failed(
        command: impl Into<String>,
        status: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        ProcessError::Failed {
            command: command.into(),
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// The tool's stderr, when the tool ran.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ProcessError::Failed { stderr, .. } => Some(stderr),
            ProcessError::Spawn { .. } => None,
        }
    }
}

fn status_text(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "terminated by signal".to_string(),
    }
}

fn output_excerpt(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();
    if !stdout.trim().is_empty() {
        out.push_str("\nStdout:\n");
        out.push_str(stdout.trim_end());
        out.push('\n');
    }
    if !stderr.trim().is_empty() {
        out.push_str("\nStderr:\n");
        out.push_str(stderr.trim_end());
    }
    out
}

/// Command and filesystem executor honouring dry-run and echo settings.
pub struct Shell {
    runner: Box<dyn CommandRunner>,
    dry_run: bool,
    echo: bool,
}

impl Shell {
    /// Creates a shell over the given runner.
    pub fn new(runner: impl CommandRunner + 'static) -> Self {
        Self {
            runner: Box::new(runner),
            dry_run: false,
            echo: false,
        }
    }

    /// Creates a shell that spawns real processes.
    pub fn system() -> Self {
        Self::new(SystemRunner)
    }

    /// Prints commands and filesystem changes instead of performing them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Prints every command before running it.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Whether this is a dry run.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Runs a command and fails on a non-zero exit.
    ///
    /// Mutating commands are printed and skipped during a dry run, returning an
    /// empty successful output.
    pub fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        let line = cmd.to_string();
        if self.echo || self.dry_run {
            println!("{}", line);
        }
        debug!(command = %line, "Executing");
        if self.dry_run && cmd.kind == CommandKind::Mutating {
            return Ok(CommandOutput::ok(""));
        }

        let output = self.runner.run(cmd).map_err(|source| ProcessError::Spawn {
            command: line.clone(),
            source,
        })?;
        if !output.success {
            return Err(ProcessError::Failed {
                command: line,
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Creates a directory and its parents.
    pub fn mkdir_all(&self, dir: &Path) -> io::Result<()> {
        self.trace(format_args!("mkdir -p {}", dir.display()));
        if self.dry_run {
            return Ok(());
        }
        fs::create_dir_all(dir)
    }

    /// Removes a file, symlink or directory tree. Missing paths are fine.
    pub fn remove_all(&self, path: &Path) -> io::Result<()> {
        self.trace(format_args!("rm -r -f {}", path.display()));
        if self.dry_run {
            return Ok(());
        }
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Creates `link` pointing at the relative `target`.
    pub fn symlink(&self, target: &str, link: &Path) -> io::Result<()> {
        self.trace(format_args!("ln -s {} {}", target, link.display()));
        if self.dry_run {
            return Ok(());
        }
        make_symlink(target, link)
    }

    /// Copies `src` to `dst`, creating `dst`'s parent directory.
    pub fn copy_file(&self, dst: &Path, src: &Path) -> io::Result<()> {
        self.trace(format_args!("cp {} {}", src.display(), dst.display()));
        if self.dry_run {
            return Ok(());
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst).map(|_| ()).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("cp {} {} failed: {}", src.display(), dst.display(), e),
            )
        })
    }

    /// Recursively copies the directory `src` into `dst`.
    pub fn copy_dir_all(&self, dst: &Path, src: &Path) -> io::Result<()> {
        self.trace(format_args!("cp -R {} {}", src.display(), dst.display()));
        if self.dry_run {
            return Ok(());
        }
        copy_dir_recursive(src, dst)
    }

    /// Writes `contents` to `path`, creating the parent directory.
    pub fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.trace(format_args!("write {}", path.display()));
        if self.dry_run {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    }

    /// Moves `from` to `to`.
    pub fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.trace(format_args!("mv {} {}", from.display(), to.display()));
        if self.dry_run {
            return Ok(());
        }
        fs::rename(from, to)
    }

    fn trace(&self, line: fmt::Arguments<'_>) {
        if self.echo || self.dry_run {
            println!("{}", line);
        }
        debug!("{}", line);
    }
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shell")
            .field("dry_run", &self.dry_run)
            .field("echo", &self.echo)
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
fn make_symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(target: &str, link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!(
            "cannot create symlink {} -> {}: framework bundles require a Unix host",
            link.display(),
            target
        ),
    ))
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());
        if path.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            fs::copy(&path, &dest_path)?;
        }
    }
    Ok(())
}

/// Formats a `-tags=` argument, or `None` when there are no tags.
pub fn tags_flag(tags: &[String]) -> Option<String> {
    if tags.is_empty() {
        None
    } else {
        Some(format!("-tags={}", tags.join(",")))
    }
}

/// Maps an I/O failure during bundle construction to [`BindError::Assembly`].
pub(crate) fn assembly_err(what: &str, path: &Path) -> impl FnOnce(io::Error) -> BindError {
    let context = format!("{} {}", what, path.display());
    move |e| BindError::Assembly(format!("{}: {}", context, e))
}

/// Upper-cases the first character, as used for bundle titles and header names.
pub fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
