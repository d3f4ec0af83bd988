use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::session::shell::Shell;

/// Status of the most recent external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    /// Running
    Running,
    /// Finished with exit code (-1 when killed by a signal)
    Finished { exit_code: i32 },
    /// Failed to start
    Failed { reason: String },
}

impl CommandStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandStatus::Finished { exit_code: 0 })
    }
}

/// Failure of the `cd` built-in
#[derive(Debug, Error)]
pub enum CdError {
    #[error("Error: cannot determine home directory (HOME is not set)")]
    NoHome,
    #[error("Error: {}: no such file or directory", .0.display())]
    NotFound(PathBuf),
    #[error("Error: {}: not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("Error: {}: {}", .path.display(), .source)]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Control side of the running child process
///
/// The process itself is owned by the runner's supervisor task; the session
/// only keeps what it needs to identify and terminate it.
#[derive(Debug)]
pub(crate) struct ActiveProcess {
    id: u64,
    pid: Option<u32>,
    terminate: Option<oneshot::Sender<()>>,
}

impl ActiveProcess {
    pub(crate) fn new(id: u64, pid: Option<u32>, terminate: oneshot::Sender<()>) -> Self {
        Self {
            id,
            pid,
            terminate: Some(terminate),
        }
    }
}

#[derive(Debug)]
struct SessionState {
    working_dir: PathBuf,
    active: Option<ActiveProcess>,
    last_status: Option<CommandStatus>,
    next_id: u64,
}

/// Mutable record of one terminal view: working directory, shell and at
/// most one running process
#[derive(Debug)]
pub struct Session {
    shell: Shell,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(working_dir: PathBuf, shell: Shell) -> Self {
        Self {
            shell,
            state: Mutex::new(SessionState {
                working_dir,
                active: None,
                last_status: None,
                next_id: 0,
            }),
        }
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    pub fn working_directory(&self) -> PathBuf {
        self.state.lock().working_dir.clone()
    }

    /// Change the working directory, returning `false` and leaving the state
    /// untouched when the path is not a usable directory
    pub fn set_working_directory(&self, path: &str) -> bool {
        self.change_directory(path).is_ok()
    }

    /// Resolve `target` the way the `cd` built-in does and make it the
    /// working directory.
    ///
    /// An empty target, `~` and `~/...` resolve against the home directory;
    /// relative paths resolve against the current working directory.
    ///
    /// Resolution runs outside the lock; the result is only stored if the
    /// working directory has not moved meanwhile, otherwise it is resolved
    /// again against the new one.
    pub fn change_directory(&self, target: &str) -> Result<PathBuf, CdError> {
        let mut current = self.working_directory();
        loop {
            let resolved = resolve_directory(&current, target, |key| env::var_os(key))?;
            let mut state = self.state.lock();
            if state.working_dir == current {
                state.working_dir = resolved.clone();
                debug!(dir = %resolved.display(), "working directory changed");
                return Ok(resolved);
            }
            current = state.working_dir.clone();
        }
    }

    /// Process id of the running command, if any
    pub fn active_pid(&self) -> Option<u32> {
        self.state.lock().active.as_ref().and_then(|active| active.pid)
    }

    /// Whether an external command is currently running
    pub fn is_running(&self) -> bool {
        self.state.lock().active.is_some()
    }

    pub fn last_status(&self) -> Option<CommandStatus> {
        self.state.lock().last_status.clone()
    }

    /// Atomically check that no process is active and register the one
    /// produced by `spawn`.
    ///
    /// `spawn` receives the process id to use and the working directory
    /// captured at this instant. It runs under the session lock, so it must
    /// not block.
    pub(crate) fn begin<T, E, F>(&self, busy: E, spawn: F) -> Result<T, E>
    where
        F: FnOnce(u64, &Path) -> Result<(T, ActiveProcess), E>,
    {
        let mut state = self.state.lock();
        if state.active.is_some() {
            return Err(busy);
        }
        state.next_id += 1;
        let id = state.next_id;
        let (value, active) = spawn(id, &state.working_dir)?;
        state.active = Some(active);
        state.last_status = Some(CommandStatus::Running);
        Ok(value)
    }

    /// Record a spawn failure that never reached the running state
    pub(crate) fn record_failure(&self, reason: String) {
        self.state.lock().last_status = Some(CommandStatus::Failed { reason });
    }

    /// Clear the active process if it is still the one identified by `id`
    pub(crate) fn finish(&self, id: u64, status: CommandStatus) {
        let mut state = self.state.lock();
        if state.active.as_ref().is_some_and(|active| active.id == id) {
            state.active = None;
            state.last_status = Some(status);
        }
    }

    /// Ask the active process to terminate.
    ///
    /// Returns `true` when a termination request was delivered. Calling it
    /// again, or with no process active, does nothing.
    pub(crate) fn request_termination(&self) -> bool {
        let mut state = self.state.lock();
        let Some(active) = state.active.as_mut() else {
            return false;
        };
        match active.terminate.take() {
            Some(tx) => {
                debug!(pid = ?active.pid, "termination requested");
                tx.send(()).is_ok()
            }
            None => false,
        }
    }
}

/// Home directory from `HOME`, then `USERPROFILE`
fn home_dir<F>(lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<std::ffi::OsString>,
{
    ["HOME", "USERPROFILE"]
        .iter()
        .filter_map(|key| lookup(*key))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn resolve_directory<F>(current: &Path, target: &str, lookup: F) -> Result<PathBuf, CdError>
where
    F: Fn(&str) -> Option<std::ffi::OsString>,
{
    let target = target.trim();
    let raw = if target.is_empty() || target == "~" {
        home_dir(&lookup).ok_or(CdError::NoHome)?
    } else if let Some(rest) = target.strip_prefix("~/") {
        home_dir(&lookup).ok_or(CdError::NoHome)?.join(rest)
    } else {
        PathBuf::from(target)
    };
    let joined = if raw.is_absolute() {
        raw
    } else {
        current.join(raw)
    };

    let canonical = fs::canonicalize(&joined).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => CdError::NotFound(joined.clone()),
        _ => CdError::Inaccessible {
            path: joined.clone(),
            source,
        },
    })?;
    if !canonical.is_dir() {
        return Err(CdError::NotADirectory(joined));
    }
    fs::read_dir(&canonical).map_err(|source| CdError::Inaccessible {
        path: joined,
        source,
    })?;
    Ok(canonical)
}
