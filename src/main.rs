use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing_subscriber::EnvFilter;

use vterm::app::App;
use vterm::buffer::DEFAULT_CAPACITY;
use vterm::config::TerminalConfig;
use vterm::tui::{Renderer, handle_key};

/// Redraw interval while no input arrives (milliseconds)
const TICK_INTERVAL_MS: u64 = 50;

/// Environment variable holding the log filter
const LOG_FILTER_VAR: &str = "VTERM_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "vterm",
    author,
    version,
    about = "Line-oriented terminal that runs shell commands",
    long_about = None
)]
struct Args {
    /// Maximum scroll-back lines (0 for unlimited)
    #[arg(short = 'b', long, default_value_t = DEFAULT_CAPACITY)]
    max_lines: usize,

    /// Shell used to run commands (defaults to $VTERM_SHELL or the platform shell)
    #[arg(short, long)]
    shell: Option<PathBuf>,

    /// Initial working directory
    #[arg(short = 'C', long)]
    cwd: Option<PathBuf>,

    /// Terminate commands running longer than this many seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> io::Result<TerminalConfig> {
        let working_dir = match self.cwd {
            Some(dir) => Some(std::fs::canonicalize(&dir).map_err(|e| {
                io::Error::new(e.kind(), format!("{}: {}", dir.display(), e))
            })?),
            None => None,
        };
        Ok(TerminalConfig {
            max_lines: self.max_lines,
            shell: self.shell,
            working_dir,
            timeout: self.timeout.map(Duration::from_secs),
        })
    }
}

/// Install a file logger when requested; the TUI owns stdout
fn init_logging(path: Option<&Path>) -> io::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let filter =
        EnvFilter::try_from_env(LOG_FILTER_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Initialize the terminal for TUI
fn init_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restore the terminal to its original state
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}

/// Run the application
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut app: App,
) -> io::Result<()> {
    let mut events = EventStream::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));

    loop {
        // Update visible lines based on terminal size
        let size = terminal.size()?;
        app.set_visible_lines(size.height.saturating_sub(Renderer::CHROME_HEIGHT) as usize);

        terminal.draw(|frame| {
            Renderer::render(frame, &app);
        })?;

        // Output arrives from background tasks; the tick picks it up
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    handle_key(&mut app, key);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => break,
            },
            _ = ticker.tick() => {}
        }

        if app.should_quit() {
            break;
        }
    }

    app.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();

    init_logging(args.log_file.as_deref())?;
    let config = args.into_config()?;

    // Create app
    let app = App::new(&config);

    // Initialize terminal
    let mut terminal = init_terminal()?;

    // Run application
    let result = run_app(&mut terminal, app).await;

    // Restore terminal
    restore_terminal(&mut terminal)?;

    result
}
