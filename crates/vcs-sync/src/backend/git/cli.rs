//! Subprocess runner for the `git` CLI.
//!
//! Everything that touches the working tree, the index or the network goes
//! through the CLI: it refuses to clobber uncommitted work, runs the LFS
//! filters and credential helpers, and reports transfer progress. libgit2 is
//! only used for read-only graph queries (history, branches, HEAD state).
//!
//! Output is parsed in [`super::porcelain`]; this module only runs processes.

use std::{
    ffi::{OsStr, OsString},
    io::{ErrorKind, Read},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
};

use thiserror::Error;
use utils::shell::resolve_executable_path_blocking;

use super::env::build_env;
use crate::config::GitEnvironment;

const CHUNK_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum GitCliError {
    #[error("git executable not found or not runnable")]
    NotAvailable,
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("push rejected: {0}")]
    PushRejected(String),
}

/// Which pipe of a streaming command is parsed line by line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
pub struct StreamOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug)]
pub enum StreamOutcome {
    Completed(StreamOutput),
    /// Cancellation was requested and the child was killed
    Canceled,
}

/// A resolved git executable plus the environment for one repository
#[derive(Debug, Clone)]
pub struct GitCli {
    git: PathBuf,
    envs: Vec<(OsString, OsString)>,
}

impl GitCli {
    pub fn new(environment: &GitEnvironment, remote_url: Option<&str>) -> Result<Self, GitCliError> {
        let git = resolve_executable_path_blocking(&environment.git_executable)
            .ok_or(GitCliError::NotAvailable)?;
        Ok(Self {
            git,
            envs: build_env(environment, remote_url),
        })
    }

    /// Run `git -C <repo_path> <args...>` and return stdout.
    pub fn git<I, S>(&self, repo_path: &Path, args: I) -> Result<String, GitCliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let out = self.git_impl(repo_path, args)?;
        Ok(String::from_utf8_lossy(&out).to_string())
    }

    /// Like [`GitCli::git`] but reports only whether the command succeeded
    pub fn succeeds<I, S>(&self, repo_path: &Path, args: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.git_impl(repo_path, args).is_ok()
    }

    /// Run a long command, feeding each line of `source` to `on_line` as it
    /// arrives. Lines are split on both `\r` and `\n` so progress meters that
    /// rewrite the same terminal line yield one callback per refresh.
    ///
    /// `is_canceled` is polled before every read; when it returns true the
    /// child is killed and [`StreamOutcome::Canceled`] is returned.
    pub fn git_streaming<I, S>(
        &self,
        repo_path: &Path,
        args: I,
        source: StreamSource,
        on_line: &mut dyn FnMut(&str),
        is_canceled: &dyn Fn() -> bool,
    ) -> Result<StreamOutcome, GitCliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(repo_path, args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Own process group, so cancel also reaches remote helpers and git-lfs.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        tracing::trace!(repo = ?repo_path, ?source, "Streaming git command: {:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| GitCliError::CommandFailed(e.to_string()))?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                kill(&mut child);
                return Err(GitCliError::CommandFailed(
                    "failed to capture git output".to_string(),
                ));
            }
        };
        let (mut watched, other): (Box<dyn Read + Send>, Box<dyn Read + Send>) = match source {
            StreamSource::Stdout => (Box::new(stdout), Box::new(stderr)),
            StreamSource::Stderr => (Box::new(stderr), Box::new(stdout)),
        };

        let drain = std::thread::spawn(move || {
            let mut other = other;
            let mut buf = Vec::new();
            if let Err(err) = other.read_to_end(&mut buf) {
                tracing::debug!(%err, "failed to drain git output");
            }
            buf
        });

        let mut captured = Vec::new();
        let mut line = Vec::new();
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            if is_canceled() {
                tracing::debug!(repo = ?repo_path, "git command canceled");
                kill(&mut child);
                // The drain thread ends once every holder of the pipe exits.
                drop(drain);
                return Ok(StreamOutcome::Canceled);
            }

            let n = match watched.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    kill(&mut child);
                    return Err(GitCliError::CommandFailed(e.to_string()));
                }
            };

            captured.extend_from_slice(&chunk[..n]);
            for &byte in &chunk[..n] {
                if byte == b'\r' || byte == b'\n' {
                    if !line.is_empty() {
                        on_line(&String::from_utf8_lossy(&line));
                        line.clear();
                    }
                } else {
                    line.push(byte);
                }
            }
        }
        if !line.is_empty() {
            on_line(&String::from_utf8_lossy(&line));
        }

        let status = child
            .wait()
            .map_err(|e| GitCliError::CommandFailed(e.to_string()))?;
        let other = drain.join().unwrap_or_default();

        let (stdout, stderr) = match source {
            StreamSource::Stdout => (captured, other),
            StreamSource::Stderr => (other, captured),
        };
        let output = StreamOutput {
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        };

        if !status.success() {
            return Err(classify_cli_error(combine_output(
                output.stdout.trim(),
                output.stderr.trim(),
            )));
        }
        Ok(StreamOutcome::Completed(output))
    }
}

// Private methods
impl GitCli {
    fn command<I, S>(&self, repo_path: &Path, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.git);
        cmd.arg("-C").arg(repo_path);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        for a in args {
            cmd.arg(a);
        }
        cmd
    }

    fn git_impl<I, S>(&self, repo_path: &Path, args: I) -> Result<Vec<u8>, GitCliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(repo_path, args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::trace!(repo = ?repo_path, "Running git command: {:?}", cmd);

        let out = cmd
            .output()
            .map_err(|e| GitCliError::CommandFailed(e.to_string()))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
            return Err(classify_cli_error(combine_output(&stdout, &stderr)));
        }
        Ok(out.stdout)
    }
}

/// Kill a streaming child together with everything it spawned, then reap it
fn kill(child: &mut Child) {
    #[cfg(unix)]
    kill_process_group(child.id());
    if let Err(err) = child.kill() {
        tracing::debug!(%err, "failed to kill git process");
    }
    if let Err(err) = child.wait() {
        tracing::debug!(%err, "failed to reap git process");
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        tracing::debug!(%err, pid, "failed to kill git process group");
    }
}

fn combine_output(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (true, true) => "Command failed with no output".to_string(),
        (false, false) => format!("--- stderr\n{stderr}\n--- stdout\n{stdout}"),
        (false, true) => format!("--- stdout\n{stdout}"),
        (true, false) => format!("--- stderr\n{stderr}"),
    }
}

pub(crate) fn classify_cli_error(msg: String) -> GitCliError {
    let lower = msg.to_ascii_lowercase();
    if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("invalid username or password")
        || lower.contains("terminal prompts disabled")
    {
        GitCliError::AuthFailed(msg)
    } else if lower.contains("non-fast-forward")
        || lower.contains("failed to push some refs")
        || lower.contains("fetch first")
        || lower.contains("updates were rejected because the tip")
    {
        GitCliError::PushRejected(msg)
    } else {
        GitCliError::CommandFailed(msg)
    }
}
