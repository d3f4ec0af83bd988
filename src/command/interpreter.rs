use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::buffer::{OutputBuffer, OutputLine};
use crate::command::runner::ProcessRunner;
use crate::session::{CommandStatus, Session, Shell};

/// Callback invoked by `exit`/`quit`
pub type CancelHandler = Box<dyn Fn() + Send + Sync>;

/// Commands handled without spawning a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builtin {
    Help,
    Clear,
    Exit,
    /// `cd` with its (possibly empty) target
    Cd(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Builtin(Builtin),
    /// Text handed to the shell as-is
    External(String),
}

/// A submitted line and its classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub raw: String,
    pub kind: CommandKind,
}

/// Classify a submitted line
///
/// Built-in names match case-insensitively after trimming; `cd` keeps the
/// case of its argument.
pub fn classify(line: &str) -> Command {
    let trimmed = line.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or_default();

    let builtin = if head.eq_ignore_ascii_case("cd") {
        Some(Builtin::Cd(rest.to_string()))
    } else if rest.is_empty() {
        match head.to_ascii_lowercase().as_str() {
            "help" => Some(Builtin::Help),
            "clear" => Some(Builtin::Clear),
            "exit" | "quit" => Some(Builtin::Exit),
            _ => None,
        }
    } else {
        None
    };

    let kind = match builtin {
        Some(builtin) => CommandKind::Builtin(builtin),
        None => CommandKind::External(trimmed.to_string()),
    };
    Command {
        raw: line.to_string(),
        kind,
    }
}

/// Usage block printed by `help`
pub fn help_lines(shell: &Shell) -> Vec<String> {
    vec![
        String::new(),
        "Available Commands:".to_string(),
        "  help      - Show this help message".to_string(),
        "  clear     - Clear terminal output".to_string(),
        "  exit/quit - Close terminal".to_string(),
        "  cd <dir>  - Change working directory".to_string(),
        String::new(),
        "Any other command will be executed in the shell".to_string(),
        format!("Current shell: {}", shell),
        String::new(),
    ]
}

/// Runs built-ins in place and hands everything else to the process runner
pub struct CommandInterpreter {
    buffer: Arc<OutputBuffer>,
    session: Arc<Session>,
    runner: ProcessRunner,
    on_cancel: Option<CancelHandler>,
}

impl CommandInterpreter {
    pub fn new(buffer: Arc<OutputBuffer>, session: Arc<Session>, runner: ProcessRunner) -> Self {
        Self {
            buffer,
            session,
            runner,
            on_cancel: None,
        }
    }

    pub fn set_cancel_handler(&mut self, handler: CancelHandler) {
        self.on_cancel = Some(handler);
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Echo and execute one submitted line
    ///
    /// Blank lines are ignored. Returns the supervisor task when an external
    /// command was started.
    pub fn submit(&self, line: &str) -> Option<JoinHandle<CommandStatus>> {
        if line.trim().is_empty() {
            return None;
        }
        self.buffer.push_normal(format!("> {}", line.trim()));
        self.execute(classify(line))
    }

    pub fn execute(&self, command: Command) -> Option<JoinHandle<CommandStatus>> {
        debug!(kind = ?command.kind, "executing");
        match command.kind {
            CommandKind::Builtin(builtin) => {
                self.run_builtin(builtin);
                None
            }
            CommandKind::External(text) => self.runner.run(&text),
        }
    }

    fn run_builtin(&self, builtin: Builtin) {
        match builtin {
            Builtin::Help => {
                let lines = help_lines(self.session.shell());
                self.buffer
                    .append_all(lines.into_iter().map(OutputLine::normal));
            }
            Builtin::Clear => self.buffer.clear(),
            Builtin::Exit => {
                if let Some(cancel) = &self.on_cancel {
                    cancel();
                }
            }
            Builtin::Cd(target) => match self.session.change_directory(&target) {
                Ok(dir) => self
                    .buffer
                    .push_normal(format!("Changed directory to: {}", dir.display())),
                Err(e) => self.buffer.push_error(e.to_string()),
            },
        }
    }
}
