use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable that forces a specific shell
pub const SHELL_OVERRIDE_VAR: &str = "VTERM_SHELL";

/// Fallback shell on Unix-like systems
const POSIX_FALLBACK: &str = "/bin/sh";

/// How a shell expects to receive a one-shot command string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFlavor {
    /// `sh`, `bash`, `zsh`, ... (`-c`)
    Posix,
    /// Windows `cmd.exe` (`/C`)
    Cmd,
    /// `powershell.exe` / `pwsh` (`-NoProfile -Command`)
    PowerShell,
}

impl ShellFlavor {
    fn detect(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match stem.as_str() {
            "cmd" => ShellFlavor::Cmd,
            "powershell" | "pwsh" => ShellFlavor::PowerShell,
            _ => ShellFlavor::Posix,
        }
    }

    /// Flags placed between the shell path and the command text
    pub fn command_flags(self) -> &'static [&'static str] {
        match self {
            ShellFlavor::Posix => &["-c"],
            ShellFlavor::Cmd => &["/C"],
            ShellFlavor::PowerShell => &["-NoProfile", "-Command"],
        }
    }
}

/// A resolved shell program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    path: PathBuf,
    flavor: ShellFlavor,
}

impl Shell {
    /// Create a shell, inferring its flavor from the program name
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let flavor = ShellFlavor::detect(&path);
        Self { path, flavor }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flavor(&self) -> ShellFlavor {
        self.flavor
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Strategy for picking the shell a session runs commands with
pub trait ShellResolver {
    fn resolve(&self) -> Shell;
}

/// Default resolver: explicit override, then `VTERM_SHELL`, then the
/// platform default.
#[derive(Debug, Clone, Default)]
pub struct PlatformShellResolver {
    explicit: Option<PathBuf>,
}

impl PlatformShellResolver {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self { explicit }
    }

    /// Resolve using the given environment lookup instead of the process
    /// environment.
    pub fn resolve_with<F>(&self, lookup: F) -> Shell
    where
        F: Fn(&str) -> Option<OsString>,
    {
        if let Some(path) = &self.explicit {
            return Shell::new(path.clone());
        }
        if let Some(path) = non_empty(lookup(SHELL_OVERRIDE_VAR)) {
            return Shell::new(path);
        }
        if cfg!(windows) {
            windows_default(&lookup)
        } else {
            posix_default(&lookup)
        }
    }
}

impl ShellResolver for PlatformShellResolver {
    fn resolve(&self) -> Shell {
        self.resolve_with(|key| env::var_os(key))
    }
}

fn non_empty(value: Option<OsString>) -> Option<OsString> {
    value.filter(|v| !v.is_empty())
}

fn posix_default<F>(lookup: &F) -> Shell
where
    F: Fn(&str) -> Option<OsString>,
{
    match non_empty(lookup("SHELL")) {
        Some(path) => Shell::new(path),
        None => Shell::new(POSIX_FALLBACK),
    }
}

fn windows_default<F>(lookup: &F) -> Shell
where
    F: Fn(&str) -> Option<OsString>,
{
    let powershell = lookup("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join("powershell.exe"))
            .find(|candidate| candidate.is_file())
    });
    match powershell {
        Some(path) => Shell::new(path),
        None => Shell::new("cmd.exe"),
    }
}
