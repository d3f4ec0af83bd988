mod shell;
mod state;

pub(crate) use state::ActiveProcess;
pub use shell::{PlatformShellResolver, SHELL_OVERRIDE_VAR, Shell, ShellFlavor, ShellResolver};
pub use state::{CdError, CommandStatus, Session};
