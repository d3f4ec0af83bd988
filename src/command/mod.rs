mod interpreter;
mod reader;
mod runner;

pub use interpreter::{
    Builtin, CancelHandler, Command, CommandInterpreter, CommandKind, classify, help_lines,
};
pub use reader::{MAX_LINE_BYTES, StreamKind, StreamReader};
pub use runner::{ProcessHandle, ProcessRunner, RunError, SUCCESS_MESSAGE};
