use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::buffer::DEFAULT_CAPACITY;

/// Settings for one terminal session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalConfig {
    /// Scroll-back capacity (0 for unlimited)
    pub max_lines: usize,
    /// Shell to use instead of the resolved default
    pub shell: Option<PathBuf>,
    /// Initial working directory
    pub working_dir: Option<PathBuf>,
    /// Terminate commands running longer than this
    pub timeout: Option<Duration>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_CAPACITY,
            shell: None,
            working_dir: None,
            timeout: None,
        }
    }
}

impl TerminalConfig {
    /// Configured directory, else the process's current directory, else the
    /// system temp directory
    pub fn initial_working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(env::temp_dir)
    }
}
