mod output;

pub use output::{DEFAULT_CAPACITY, OutputBuffer, OutputLine, Severity};
