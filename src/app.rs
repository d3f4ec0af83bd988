use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tui_input::{Input, InputRequest};

use crate::config::TerminalConfig;
use crate::terminal::Terminal;

/// Application state
pub struct App {
    terminal: Terminal,
    input: Input,
    /// Lines scrolled up from the bottom of the output (0 follows the tail)
    scroll_back: usize,
    visible_lines: usize,
    should_quit: Arc<AtomicBool>,
}

impl App {
    /// Initialize the application
    pub fn new(config: &TerminalConfig) -> Self {
        Self::from_terminal(Terminal::new(config))
    }

    /// Wrap an existing terminal, wiring `exit`/`quit` to the quit flag
    pub fn from_terminal(mut terminal: Terminal) -> Self {
        let should_quit = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&should_quit);
        terminal.set_cancel_handler(move || flag.store(true, Ordering::SeqCst));
        terminal.display();
        Self {
            terminal,
            input: Input::default(),
            scroll_back: 0,
            visible_lines: 0,
            should_quit,
        }
    }

    /// Submit the current input line and clear the field
    pub fn submit_input(&mut self) {
        let line = self.input.value().to_string();
        self.input.reset();
        self.scroll_back = 0;
        // The supervisor task reports into the buffer
        self.terminal.submit(&line);
    }

    /// Handle input request from tui-input
    pub fn handle_input(&mut self, req: InputRequest) {
        self.input.handle(req);
    }

    /// Scroll toward older output
    pub fn scroll_up(&mut self, lines: usize) {
        let max = self
            .terminal
            .buffer()
            .len()
            .saturating_sub(self.visible_lines);
        self.scroll_back = (self.scroll_back + lines).min(max);
    }

    /// Scroll toward the newest output
    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
    }

    pub fn scroll_back(&self) -> usize {
        self.scroll_back
    }

    /// Set the number of visible output lines
    pub fn set_visible_lines(&mut self, lines: usize) {
        self.visible_lines = lines;
    }

    pub fn visible_lines(&self) -> usize {
        self.visible_lines
    }

    /// Esc: behave like the host closing the view
    pub fn cancel(&mut self) {
        self.terminal.hide();
        self.quit();
    }

    /// Check if the application should quit
    pub fn should_quit(&self) -> bool {
        self.should_quit.load(Ordering::SeqCst)
    }

    /// Set the quit flag
    pub fn quit(&mut self) {
        self.should_quit.store(true, Ordering::SeqCst);
    }

    /// Stop any running command and wait until it is gone
    pub async fn shutdown(&mut self) {
        self.terminal.shutdown().await;
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub fn input(&self) -> &Input {
        &self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        let config = TerminalConfig {
            shell: Some("/bin/sh".into()),
            working_dir: Some("/".into()),
            ..TerminalConfig::default()
        };
        App::new(&config)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_input(InputRequest::InsertChar(c));
        }
    }

    #[test]
    fn app_new_displays_terminal() {
        let app = app();

        assert!(app.terminal().is_displayed());
        assert!(!app.should_quit());
        assert_eq!(app.input().value(), "");
    }

    #[test]
    fn app_submit_input_runs_builtin_and_clears_field() {
        let mut app = app();
        app.terminal().buffer().clear();
        type_text(&mut app, "help");

        app.submit_input();

        assert_eq!(app.input().value(), "");
        assert_eq!(app.terminal().snapshot()[0].text, "> help");
    }

    #[test]
    fn app_exit_builtin_sets_quit_flag() {
        let mut app = app();
        type_text(&mut app, "quit");

        app.submit_input();
        assert!(app.should_quit());
    }

    #[test]
    fn app_quit_sets_flag() {
        let mut app = app();

        assert!(!app.should_quit());

        app.quit();
        assert!(app.should_quit());
    }

    #[test]
    fn app_cancel_hides_and_quits() {
        let mut app = app();

        app.cancel();
        assert!(!app.terminal().is_displayed());
        assert!(app.should_quit());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn app_shutdown_waits_for_running_command() {
        let mut app = app();
        type_text(&mut app, "sleep 30");
        app.submit_input();
        assert!(app.terminal().session().is_running());

        app.shutdown().await;

        assert!(!app.terminal().session().is_running());
        assert!(!app.terminal().is_displayed());
        assert_eq!(
            app.terminal().session().last_status(),
            Some(crate::session::CommandStatus::Finished { exit_code: -1 })
        );
    }

    #[test]
    fn app_scroll_is_clamped() {
        let mut app = app();
        app.terminal().buffer().clear();
        for i in 0..20 {
            app.terminal().buffer().push_normal(format!("line{}", i));
        }
        app.set_visible_lines(5);

        app.scroll_up(100);
        assert_eq!(app.scroll_back(), 15);

        app.scroll_down(10);
        assert_eq!(app.scroll_back(), 5);

        app.scroll_down(10);
        assert_eq!(app.scroll_back(), 0);
    }

    #[test]
    fn app_submit_input_resets_scroll() {
        let mut app = app();
        for i in 0..20 {
            app.terminal().buffer().push_normal(format!("line{}", i));
        }
        app.set_visible_lines(5);
        app.scroll_up(3);
        type_text(&mut app, "clear");

        app.submit_input();
        assert_eq!(app.scroll_back(), 0);
    }
}
