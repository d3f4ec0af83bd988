use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::buffer::OutputBuffer;
use crate::command::reader::{StreamKind, StreamReader};
use crate::session::{ActiveProcess, CommandStatus, Session, Shell, ShellFlavor};

/// Time a terminated process gets to exit before it is force-killed, and
/// readers get to drain before they are aborted
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Line appended when a command exits with status 0
pub const SUCCESS_MESSAGE: &str = "Command completed successfully";

/// Why an external command could not be started
#[derive(Debug, Error)]
pub enum RunError {
    #[error("a command is already running")]
    AlreadyRunning,
    #[error("Error starting command: {0}")]
    Spawn(#[source] io::Error),
    #[error("Error creating {0} pipe")]
    Pipe(StreamKind),
}

/// A spawned child process
///
/// Owned by the supervisor task for the whole life of the process.
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
}

impl ProcessHandle {
    /// Spawn `command` through `shell` in `cwd`, with stdout and stderr piped
    fn spawn(
        shell: &Shell,
        command: &str,
        cwd: &Path,
    ) -> Result<(Self, ChildStdout, ChildStderr), RunError> {
        let mut cmd = Command::new(shell.path());
        add_command_text(&mut cmd, shell.flavor(), command);
        cmd.current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so termination reaches grandchildren holding the pipes
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(RunError::Spawn)?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.start_kill();
            return Err(RunError::Pipe(StreamKind::Stdout));
        };
        let Some(stderr) = child.stderr.take() else {
            let _ = child.start_kill();
            return Err(RunError::Pipe(StreamKind::Stderr));
        };

        let pid = child.id();
        Ok((Self { child, pid }, stdout, stderr))
    }

    /// Get the process ID
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the process to exit
    async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Ask the process to stop, then force-kill it after the grace period
    async fn terminate(&mut self) -> io::Result<ExitStatus> {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::sys::signal::{Signal, killpg};
            use nix::unistd::Pid;

            let group = Pid::from_raw(pid as i32);
            if let Err(e) = killpg(group, Signal::SIGTERM) {
                debug!(pid, error = %e, "SIGTERM failed");
            }
            if let Ok(status) = tokio::time::timeout(KILL_GRACE, self.child.wait()).await {
                return status;
            }
            warn!(pid, "process ignored SIGTERM, killing");
            let _ = killpg(group, Signal::SIGKILL);
        }

        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "kill failed");
        }
        self.child.wait().await
    }
}

#[cfg(windows)]
fn add_command_text(cmd: &mut Command, flavor: ShellFlavor, command: &str) {
    // cmd.exe does its own parsing of the rest of the line
    if flavor == ShellFlavor::Cmd {
        cmd.arg("/C").raw_arg(command);
    } else {
        cmd.args(flavor.command_flags()).arg(command);
    }
}

#[cfg(not(windows))]
fn add_command_text(cmd: &mut Command, flavor: ShellFlavor, command: &str) {
    cmd.args(flavor.command_flags()).arg(command);
}

/// Spawns external commands for a session and finalizes them
#[derive(Clone)]
pub struct ProcessRunner {
    session: Arc<Session>,
    buffer: Arc<OutputBuffer>,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(session: Arc<Session>, buffer: Arc<OutputBuffer>) -> Self {
        Self {
            session,
            buffer,
            timeout: None,
        }
    }

    /// Terminate commands that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start `command`, reporting any failure to start as an error line
    ///
    /// Returns the supervisor task on success. Must be called within a Tokio
    /// runtime.
    pub fn run(&self, command: &str) -> Option<JoinHandle<CommandStatus>> {
        match self.spawn(command) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(command, error = %e, "command not started");
                if !matches!(e, RunError::AlreadyRunning) {
                    self.session.record_failure(e.to_string());
                }
                self.buffer.push_error(e.to_string());
                None
            }
        }
    }

    /// Start `command` without touching the output buffer on failure
    ///
    /// At most one command runs per session; the working directory is
    /// captured at spawn time.
    pub fn spawn(&self, command: &str) -> Result<JoinHandle<CommandStatus>, RunError> {
        let shell = self.session.shell().clone();
        let (id, process, stdout, stderr, terminate) =
            self.session.begin(RunError::AlreadyRunning, |id, cwd| {
                let (process, stdout, stderr) = ProcessHandle::spawn(&shell, command, cwd)?;
                let (tx, rx) = oneshot::channel();
                let active = ActiveProcess::new(id, process.pid(), tx);
                Ok(((id, process, stdout, stderr, rx), active))
            })?;
        info!(pid = ?process.pid(), command, "command started");

        let mut readers = JoinSet::new();
        let stdout = StreamReader::new(StreamKind::Stdout, stdout, Arc::clone(&self.buffer));
        let stderr = StreamReader::new(StreamKind::Stderr, stderr, Arc::clone(&self.buffer));
        readers.spawn(stdout.run());
        readers.spawn(stderr.run());

        let supervisor = Supervisor {
            id,
            process,
            readers,
            terminate,
            timeout: self.timeout,
            session: Arc::clone(&self.session),
            buffer: Arc::clone(&self.buffer),
        };
        Ok(tokio::spawn(supervisor.run()))
    }

    /// Request termination of the running command
    ///
    /// Returns `true` if a request was sent. A no-op when nothing runs or a
    /// request is already pending.
    pub fn kill(&self) -> bool {
        self.session.request_termination()
    }
}

/// How the wait for a command ended
enum Ending {
    Exited(io::Result<ExitStatus>),
    Terminated,
    TimedOut(Duration),
}

/// Finalization task: waits for both readers and the exit, then reports
struct Supervisor {
    id: u64,
    process: ProcessHandle,
    readers: JoinSet<usize>,
    terminate: oneshot::Receiver<()>,
    timeout: Option<Duration>,
    session: Arc<Session>,
    buffer: Arc<OutputBuffer>,
}

impl Supervisor {
    async fn run(self) -> CommandStatus {
        let Supervisor {
            id,
            mut process,
            mut readers,
            mut terminate,
            timeout,
            session,
            buffer,
        } = self;

        let deadline = async move {
            match timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };

        let ending = tokio::select! {
            status = drain_and_wait(&mut process, &mut readers) => Ending::Exited(status),
            Ok(()) = &mut terminate => Ending::Terminated,
            limit = deadline => Ending::TimedOut(limit),
        };

        let exit = match ending {
            Ending::Exited(status) => status,
            Ending::Terminated => {
                let status = process.terminate().await;
                settle(&mut readers).await;
                status
            }
            Ending::TimedOut(limit) => {
                buffer.push_error(format!("Command timed out after {:?}", limit));
                let status = process.terminate().await;
                settle(&mut readers).await;
                status
            }
        };

        let status = match exit {
            Ok(status) if status.success() => {
                buffer.push_normal(SUCCESS_MESSAGE);
                CommandStatus::Finished { exit_code: 0 }
            }
            Ok(status) => {
                buffer.push_error(format!("Command finished with error: {}", status));
                CommandStatus::Finished {
                    exit_code: status.code().unwrap_or(-1),
                }
            }
            Err(e) => {
                buffer.push_error(format!("Command finished with error: {}", e));
                CommandStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };
        info!(pid = ?process.pid(), ?status, "command finished");
        session.finish(id, status.clone());
        status
    }
}

/// Completion barrier: both readers reach end-of-stream, then the exit
async fn drain_and_wait(
    process: &mut ProcessHandle,
    readers: &mut JoinSet<usize>,
) -> io::Result<ExitStatus> {
    while let Some(joined) = readers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "stream reader task failed");
        }
    }
    process.wait().await
}

/// Give readers the grace period to drain, then abort the rest
async fn settle(readers: &mut JoinSet<usize>) {
    let drained = tokio::time::timeout(KILL_GRACE, async {
        while readers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        debug!(remaining = readers.len(), "aborting stream readers");
        readers.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::OutputLine;

    fn runner_in(dir: &Path) -> (ProcessRunner, Arc<Session>, Arc<OutputBuffer>) {
        let session = Arc::new(Session::new(dir.to_path_buf(), Shell::new("/bin/sh")));
        let buffer = Arc::new(OutputBuffer::new(1000));
        let runner = ProcessRunner::new(Arc::clone(&session), Arc::clone(&buffer));
        (runner, session, buffer)
    }

    fn texts(buffer: &OutputBuffer) -> Vec<String> {
        buffer.snapshot().into_iter().map(|l| l.text).collect()
    }

    #[tokio::test]
    async fn process_runner_captures_stdout_then_success() {
        let (runner, session, buffer) = runner_in(Path::new("/"));

        let status = runner.run("echo hello").unwrap().await.unwrap();

        assert_eq!(status, CommandStatus::Finished { exit_code: 0 });
        assert_eq!(texts(&buffer), vec!["hello", SUCCESS_MESSAGE]);
        assert!(!session.is_running());
        assert!(session.last_status().unwrap().is_success());
    }

    #[tokio::test]
    async fn process_runner_captures_stderr_as_error() {
        let (runner, _session, buffer) = runner_in(Path::new("/"));

        runner.run("echo error >&2").unwrap().await.unwrap();

        let lines = buffer.snapshot();
        assert_eq!(lines[0], OutputLine::error("error"));
        assert_eq!(lines[1], OutputLine::normal(SUCCESS_MESSAGE));
    }

    #[tokio::test]
    async fn process_runner_preserves_order_within_stream() {
        let (runner, _session, buffer) = runner_in(Path::new("/"));

        runner
            .run("echo a; echo x >&2; echo b; echo y >&2; echo c")
            .unwrap()
            .await
            .unwrap();

        let stdout: Vec<_> = buffer
            .snapshot()
            .into_iter()
            .filter(|l| !l.is_error() && l.text != SUCCESS_MESSAGE)
            .map(|l| l.text)
            .collect();
        let stderr: Vec<_> = buffer
            .snapshot()
            .into_iter()
            .filter(|l| l.is_error())
            .map(|l| l.text)
            .collect();
        assert_eq!(stdout, vec!["a", "b", "c"]);
        assert_eq!(stderr, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn process_runner_reports_nonzero_exit() {
        let (runner, session, buffer) = runner_in(Path::new("/"));

        let status = runner.run("exit 42").unwrap().await.unwrap();

        assert_eq!(status, CommandStatus::Finished { exit_code: 42 });
        let last = buffer.snapshot().pop().unwrap();
        assert!(last.is_error());
        assert!(last.text.starts_with("Command finished with error:"));
        assert!(last.text.contains("42"));
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn process_runner_unknown_command_then_next_command_succeeds() {
        let (runner, session, buffer) = runner_in(Path::new("/"));

        let status = runner.run("doesnotexist123").unwrap().await.unwrap();
        assert_ne!(status, CommandStatus::Finished { exit_code: 0 });
        assert!(buffer.snapshot().iter().any(|l| l.is_error()));
        assert!(!session.is_running());

        buffer.clear();
        runner.run("echo ok").unwrap().await.unwrap();
        assert_eq!(texts(&buffer), vec!["ok", SUCCESS_MESSAGE]);
    }

    #[tokio::test]
    async fn process_runner_spawn_failure_appends_one_error_line() {
        let session = Arc::new(Session::new(
            "/".into(),
            Shell::new("/nonexistent/shell-binary"),
        ));
        let buffer = Arc::new(OutputBuffer::new(100));
        let runner = ProcessRunner::new(Arc::clone(&session), Arc::clone(&buffer));

        assert!(runner.run("echo hi").is_none());

        let lines = buffer.snapshot();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].is_error());
        assert!(lines[0].text.starts_with("Error starting command:"));
        assert!(!session.is_running());
        assert!(matches!(
            session.last_status(),
            Some(CommandStatus::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn process_runner_rejects_second_command_while_running() {
        let (runner, session, buffer) = runner_in(Path::new("/"));

        let first = runner.run("sleep 10").unwrap();
        assert!(session.is_running());

        let second = runner.spawn("echo second");
        assert!(matches!(second, Err(RunError::AlreadyRunning)));
        assert!(runner.run("echo second").is_none());
        assert_eq!(
            buffer.snapshot(),
            vec![OutputLine::error("a command is already running")]
        );
        assert!(session.is_running());

        assert!(runner.kill());
        first.await.unwrap();
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn process_runner_uses_working_directory_at_spawn_time() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = std::fs::canonicalize(tmp.path()).unwrap();
        let (runner, _session, buffer) = runner_in(&dir);

        runner.run("pwd").unwrap().await.unwrap();

        assert_eq!(buffer.snapshot()[0].text, dir.display().to_string());
    }

    #[tokio::test]
    async fn process_runner_kill_stops_output() {
        let (runner, session, buffer) = runner_in(Path::new("/"));

        let handle = runner
            .run("while true; do echo tick; sleep 0.05; done")
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(runner.kill());
        let status = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("supervisor finished")
            .unwrap();
        assert!(!status.is_success());
        assert!(!session.is_running());

        let settled = buffer.len();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(buffer.len(), settled);
        assert!(
            buffer
                .snapshot()
                .last()
                .unwrap()
                .text
                .starts_with("Command finished with error:")
        );
    }

    #[tokio::test]
    async fn process_runner_kill_is_idempotent() {
        let (runner, _session, _buffer) = runner_in(Path::new("/"));
        assert!(!runner.kill());

        let handle = runner.run("sleep 10").unwrap();
        assert!(runner.kill());
        assert!(!runner.kill());
        handle.await.unwrap();

        assert!(!runner.kill());
    }

    #[tokio::test]
    async fn process_runner_timeout_terminates_command() {
        let (runner, session, buffer) = runner_in(Path::new("/"));
        let runner = runner.with_timeout(Some(Duration::from_millis(200)));

        let status = tokio::time::timeout(Duration::from_secs(5), runner.run("sleep 10").unwrap())
            .await
            .expect("supervisor finished")
            .unwrap();

        assert!(!status.is_success());
        assert!(!session.is_running());
        assert!(
            texts(&buffer)
                .iter()
                .any(|l| l.starts_with("Command timed out after"))
        );
    }

    #[tokio::test]
    async fn process_handle_pid_returns_some() {
        let (process, _stdout, _stderr) =
            ProcessHandle::spawn(&Shell::new("/bin/sh"), "exit 0", Path::new("/")).unwrap();
        assert!(process.pid().is_some());
    }
}
