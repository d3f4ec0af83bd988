//! Host-facing terminal view
//!
//! [`Terminal`] ties the scroll-back, the session and the command
//! interpreter together behind the small surface a UI needs: submit a line,
//! show or hide the view, take a snapshot for rendering, and shut down
//! without leaving a command behind.

use std::env;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::buffer::{OutputBuffer, OutputLine};
use crate::command::{CommandInterpreter, ProcessRunner};
use crate::config::TerminalConfig;
use crate::session::{CommandStatus, PlatformShellResolver, Session, ShellResolver};

/// One embedded terminal view
pub struct Terminal {
    buffer: Arc<OutputBuffer>,
    session: Arc<Session>,
    interpreter: CommandInterpreter,
    /// Supervisor of the most recently started command
    supervisor: Option<JoinHandle<CommandStatus>>,
    displayed: bool,
}

impl Terminal {
    /// Create a terminal using the platform shell resolver
    pub fn new(config: &TerminalConfig) -> Self {
        let resolver = PlatformShellResolver::new(config.shell.clone());
        Self::with_resolver(config, &resolver)
    }

    /// Create a terminal with a custom shell resolution strategy
    pub fn with_resolver(config: &TerminalConfig, resolver: &dyn ShellResolver) -> Self {
        let buffer = Arc::new(OutputBuffer::new(config.max_lines));
        let session = Arc::new(Session::new(
            config.initial_working_dir(),
            resolver.resolve(),
        ));
        let runner = ProcessRunner::new(Arc::clone(&session), Arc::clone(&buffer))
            .with_timeout(config.timeout);
        let interpreter =
            CommandInterpreter::new(Arc::clone(&buffer), Arc::clone(&session), runner);

        info!(
            shell = %session.shell(),
            cwd = %session.working_directory().display(),
            "terminal session created"
        );
        let terminal = Self {
            buffer,
            session,
            interpreter,
            supervisor: None,
            displayed: false,
        };
        terminal.print_banner();
        terminal
    }

    fn print_banner(&self) {
        self.buffer.append_all([
            OutputLine::normal(format!("vterm - {}", env::consts::OS)),
            OutputLine::normal(format!(
                "Working Directory: {}",
                self.session.working_directory().display()
            )),
            OutputLine::normal(format!("Shell: {}", self.session.shell())),
            OutputLine::normal("Type 'help' for available commands, 'clear' to clear output"),
            OutputLine::normal(""),
        ]);
    }

    /// Handle one line typed by the user
    ///
    /// Never blocks on the command; returns `true` when an external command
    /// was started. Must be called within a Tokio runtime.
    pub fn submit(&mut self, line: &str) -> bool {
        match self.interpreter.submit(line) {
            Some(handle) => {
                self.supervisor = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Wait for the most recently started command to be finalized
    ///
    /// Returns its final status, or `None` when no command was started since
    /// the last wait.
    pub async fn wait(&mut self) -> Option<CommandStatus> {
        let handle = self.supervisor.take()?;
        match handle.await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(error = %e, "command supervisor failed");
                None
            }
        }
    }

    /// Hide the view and wait until the running command, if any, has been
    /// terminated and finalized
    pub async fn shutdown(&mut self) {
        self.hide();
        if let Some(status) = self.wait().await {
            info!(?status, "terminal shut down");
        }
    }

    /// Set the callback run by `exit`/`quit`
    pub fn set_cancel_handler<F>(&mut self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.interpreter.set_cancel_handler(Box::new(handler));
    }

    pub fn display(&mut self) {
        self.displayed = true;
    }

    /// Hide the view, terminating any running command
    pub fn hide(&mut self) {
        self.displayed = false;
        self.kill();
    }

    pub fn is_displayed(&self) -> bool {
        self.displayed
    }

    /// Request termination of the running command, if any
    pub fn kill(&self) -> bool {
        self.interpreter.runner().kill()
    }

    /// Copy of the scroll-back for rendering
    pub fn snapshot(&self) -> Vec<OutputLine> {
        self.buffer.snapshot()
    }

    pub fn buffer(&self) -> &OutputBuffer {
        &self.buffer
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}
