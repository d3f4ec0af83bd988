//! Embeddable line-oriented terminal.
//!
//! A submitted line is either a built-in (`help`, `clear`, `exit`/`quit`,
//! `cd`) executed in place, or an external command run through the session's
//! shell. External output is captured from stdout and stderr concurrently
//! into a bounded scroll-back without blocking the caller.

pub mod app;
pub mod buffer;
pub mod command;
pub mod config;
pub mod session;
pub mod terminal;
pub mod tui;
