use anyhow::{Context, Result, anyhow};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A prepared external tool invocation.
pub struct ToolCommand {
    label: String,
    cmd: Command,
    timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(label: &str, program: &Path) -> Self {
        let mut cmd = Command::new(program);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own group, so a timeout can take down helpers the tool spawns.
            cmd.process_group(0);
        }
        Self {
            label: label.to_string(),
            cmd,
            timeout: None,
        }
    }

    pub fn arg<S: AsRef<std::ffi::OsStr>>(mut self, arg: S) -> Self {
        self.cmd.arg(arg);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        self.cmd.args(args);
        self
    }

    pub fn env<K: AsRef<std::ffi::OsStr>, V: AsRef<std::ffi::OsStr>>(mut self, k: K, v: V) -> Self {
        self.cmd.env(k, v);
        self
    }

    /// Zero disables the timeout.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Runs to completion and returns the raw output whatever the exit status.
    pub fn output(mut self) -> Result<Output> {
        debug!("tool run {} {:?} timeout={:?}", self.label, self.cmd, self.timeout);
        let mut child = self
            .cmd
            .spawn()
            .with_context(|| format!("spawning {}", self.label))?;
        match self.timeout {
            Some(timeout) => wait_with_timeout(&self.label, &mut child, timeout),
            None => child
                .wait_with_output()
                .with_context(|| format!("waiting for {}", self.label)),
        }
    }

    /// Runs and requires a zero exit status; returns stdout.
    pub fn run(self) -> Result<Vec<u8>> {
        let label = self.label.clone();
        let output = self.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{label} failed ({}): {}",
                output.status,
                stderr.trim()
            ));
        }
        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("{label} stderr: {}", stderr.trim());
        }
        Ok(output.stdout)
    }
}

/// How long reader threads get to drain after the process group is killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

type Reader = JoinHandle<Result<Vec<u8>>>;

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>, what: &'static str) -> Reader {
    std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).with_context(|| format!("read {what}"))?;
        }
        Ok(buf)
    })
}

/// Joins `reader` if it finishes before `deadline`; otherwise leaves it detached.
fn join_by(reader: Reader, deadline: Instant) -> Option<Result<Vec<u8>>> {
    while !reader.is_finished() {
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    Some(
        reader
            .join()
            .unwrap_or_else(|_| Err(anyhow!("pipe reader thread panicked"))),
    )
}

/// Kills the child and everything it spawned.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        // The child leads its own process group, so a negative pid reaches grandchildren.
        if let Ok(pgid) = i32::try_from(child.id()) {
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
}

fn wait_with_timeout(label: &str, child: &mut Child, timeout: Duration) -> Result<Output> {
    // Drain pipes while waiting so a chatty tool can't block on a full buffer.
    let stdout_thread = spawn_reader(child.stdout.take(), "stdout");
    let stderr_thread = spawn_reader(child.stderr.take(), "stderr");

    let start = Instant::now();
    let deadline = start + timeout;
    loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            // A grandchild may still hold the pipes after the child exits.
            let stdout = join_by(stdout_thread, deadline);
            let stderr = join_by(stderr_thread, deadline);
            if let (Some(stdout), Some(stderr)) = (stdout, stderr) {
                return Ok(Output {
                    status,
                    stdout: stdout?,
                    stderr: stderr?,
                });
            }
            warn!("{label} exited but its pipes stayed open past {:?}", timeout);
            kill_tree(child);
            return Err(anyhow!("{label} exceeded timeout ({:?}); pipes held open", timeout));
        }

        if start.elapsed() > timeout {
            warn!("{label} timed out after {:?}", timeout);
            kill_tree(child);
            child.wait().with_context(|| "wait after kill")?;
            let grace = Instant::now() + DRAIN_GRACE;
            let stderr = join_by(stderr_thread, grace)
                .and_then(|r| r.ok())
                .unwrap_or_default();
            drop(stdout_thread);
            return Err(anyhow!(
                "{label} exceeded timeout ({:?}); stderr: {}",
                timeout,
                String::from_utf8_lossy(&stderr).trim()
            ));
        }

        std::thread::sleep(Duration::from_millis(50));
    }
}
