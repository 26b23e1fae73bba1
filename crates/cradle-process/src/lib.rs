//! Running the external tools that regenerate cached build configuration.
//!
//! `cabal configure` may resolve a full install plan before it writes anything, and it can be
//! very chatty while doing so. Invocations here capture a bounded amount of stdout/stderr and can
//! be given a wall-clock timeout, after which the whole process tree is terminated.

use std::{
    fmt,
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use thiserror::Error;

/// A program to run, with its arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub cwd: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(cwd: impl Into<PathBuf>, program: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Options controlling a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Terminate the process tree if it is still running after this long.
    pub timeout: Option<Duration>,
    /// Maximum bytes kept per stream.
    pub max_bytes: usize,
    /// Time between the polite termination signal and the forced kill.
    pub kill_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_bytes: 4 * 1024 * 1024,
            kill_grace: Duration::from_millis(250),
        }
    }
}

/// Captured stdout/stderr, each truncated to [`RunOptions::max_bytes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

impl CapturedOutput {
    /// `stdout` followed by `stderr`, separated by a newline when needed.
    pub fn combined(&self) -> String {
        let mut s = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !s.is_empty() && !s.ends_with('\n') {
                s.push('\n');
            }
            s.push_str(&self.stderr);
        }
        s
    }
}

/// Outcome of [`run`]: the process finished (possibly unsuccessfully) or was killed on timeout.
#[derive(Debug, Clone)]
pub struct Completed {
    pub status: ExitStatus,
    pub output: CapturedOutput,
    pub timed_out: bool,
}

#[derive(Debug, Error)]
pub enum RunCommandError {
    #[error("failed to run `{invocation}`")]
    Spawn {
        invocation: Invocation,
        #[source]
        source: io::Error,
    },

    #[error("`{invocation}` timed out after {timeout:?}{}", render_output(.output))]
    TimedOut {
        invocation: Invocation,
        timeout: Duration,
        output: CapturedOutput,
    },

    #[error("`{invocation}` exited with {status}{}", render_output(.output))]
    Failed {
        invocation: Invocation,
        status: ExitStatus,
        output: CapturedOutput,
    },
}

fn render_output(output: &CapturedOutput) -> String {
    let mut out = String::new();
    if output.truncated {
        out.push_str(" (output truncated)");
    }
    if !output.stdout.is_empty() {
        out.push_str("\nstdout:\n");
        out.push_str(&output.stdout);
    }
    if !output.stderr.is_empty() {
        out.push_str("\nstderr:\n");
        out.push_str(&output.stderr);
    }
    out
}

/// The seam through which configuration regeneration reaches the outside world.
///
/// Implementations return the captured output of a *successful* run; non-zero exits and timeouts
/// are errors.
pub trait CommandRunner: Send + Sync + fmt::Debug {
    fn run(&self, invocation: &Invocation) -> Result<CapturedOutput, RunCommandError>;
}

/// [`CommandRunner`] that spawns real processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    pub options: RunOptions,
}

impl ProcessRunner {
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            options: RunOptions {
                timeout,
                ..RunOptions::default()
            },
        }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<CapturedOutput, RunCommandError> {
        run_checked(invocation, &self.options).map(|completed| completed.output)
    }
}

/// Run `invocation`, returning its status whatever it is.
pub fn run(invocation: &Invocation, opts: &RunOptions) -> io::Result<Completed> {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .current_dir(&invocation.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // A fresh process group lets a timeout take down grandchildren that would otherwise keep the
    // output pipes open.
    #[cfg(unix)]
    unsafe {
        use std::os::unix::process::CommandExt;

        cmd.pre_exec(|| {
            // SAFETY: `setpgid` is async-signal-safe and runs in the forked child before exec.
            if libc::setpgid(0, 0) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    tracing::debug!(target: "cradle.process", command = %invocation, cwd = %invocation.cwd.display(), "spawning");
    let start = Instant::now();
    let mut child = cmd.spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;

    let max_bytes = opts.max_bytes;
    let stdout_reader = thread::spawn(move || read_bounded(stdout, max_bytes));
    let stderr_reader = thread::spawn(move || read_bounded(stderr, max_bytes));

    let mut timed_out = false;
    let status = match opts.timeout {
        None => child.wait()?,
        Some(timeout) => loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                timed_out = true;
                break terminate_process_tree(&mut child, opts.kill_grace)?;
            }
            thread::sleep(Duration::from_millis(50).min(timeout - elapsed));
        },
    };

    let (stdout, stdout_truncated) = join_reader(stdout_reader, "stdout")?;
    let (stderr, stderr_truncated) = join_reader(stderr_reader, "stderr")?;

    tracing::debug!(
        target: "cradle.process",
        command = %invocation,
        %status,
        timed_out,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "process finished"
    );

    Ok(Completed {
        status,
        output: CapturedOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            truncated: stdout_truncated || stderr_truncated,
        },
        timed_out,
    })
}

/// Run `invocation` and treat timeouts and non-zero exits as errors.
pub fn run_checked(invocation: &Invocation, opts: &RunOptions) -> Result<Completed, RunCommandError> {
    let completed = run(invocation, opts).map_err(|source| RunCommandError::Spawn {
        invocation: invocation.clone(),
        source,
    })?;

    if completed.timed_out {
        return Err(RunCommandError::TimedOut {
            invocation: invocation.clone(),
            timeout: opts.timeout.unwrap_or_default(),
            output: completed.output,
        });
    }
    if !completed.status.success() {
        return Err(RunCommandError::Failed {
            invocation: invocation.clone(),
            status: completed.status,
            output: completed.output,
        });
    }
    Ok(completed)
}

fn terminate_process_tree(
    child: &mut std::process::Child,
    grace: Duration,
) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        // The child leads its own process group (see `pre_exec` above).
        let pgid = child.id() as i32;
        unsafe {
            let _ = libc::kill(-pgid, libc::SIGTERM);
        }

        let start = Instant::now();
        while start.elapsed() < grace {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            thread::sleep(Duration::from_millis(25));
        }

        unsafe {
            let _ = libc::kill(-pgid, libc::SIGKILL);
        }
        child.wait()
    }

    #[cfg(windows)]
    {
        let _ = grace;
        let pid = child.id().to_string();
        let _ = Command::new("taskkill")
            .args(["/PID", &pid, "/T", "/F"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        let _ = child.kill();
        child.wait()
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = grace;
        let _ = child.kill();
        child.wait()
    }
}

fn join_reader(
    handle: thread::JoinHandle<io::Result<(Vec<u8>, bool)>>,
    stream: &'static str,
) -> io::Result<(Vec<u8>, bool)> {
    handle
        .join()
        .map_err(|_| io::Error::other(format!("{stream} reader thread panicked")))?
}

fn read_bounded(mut reader: impl Read, max_bytes: usize) -> io::Result<(Vec<u8>, bool)> {
    let mut out = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        let keep = max_bytes.saturating_sub(out.len()).min(n);
        out.extend_from_slice(&buf[..keep]);
        truncated |= keep < n;
    }

    Ok((out, truncated))
}
