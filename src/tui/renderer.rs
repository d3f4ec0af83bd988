use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};

use crate::app::App;
use crate::buffer::{OutputLine, Severity};
use crate::session::CommandStatus;

/// Prompt shown in front of the input field
const PROMPT: &str = "> ";

/// TUI rendering handler
pub struct Renderer;

impl Renderer {
    /// Rows taken by everything except the output lines
    pub const CHROME_HEIGHT: u16 = 6;

    /// Render application state
    pub fn render(frame: &mut Frame, app: &App) {
        let [output_area, input_area, status_area] = Layout::vertical([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        Self::render_output(frame, app, output_area);
        Self::render_input(frame, app, input_area);
        Self::render_status(frame, app, status_area);
    }

    fn render_output(frame: &mut Frame, app: &App, area: Rect) {
        let visible = area.height.saturating_sub(2) as usize;
        // One snapshot so appends and evictions cannot shift the window
        let mut snapshot = app.terminal().snapshot();
        let end = snapshot.len().saturating_sub(app.scroll_back());
        let start = end.saturating_sub(visible);
        snapshot.truncate(end);
        let lines: Vec<Line> = snapshot.drain(start..).map(styled_line).collect();

        let title = match app.scroll_back() {
            0 => " Terminal Output ".to_string(),
            n => format!(" Terminal Output [-{}] ", n),
        };
        let block = Block::bordered().title(title);
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_input(frame: &mut Frame, app: &App, area: Rect) {
        let input = app.input();
        let width = area.width.saturating_sub(2 + PROMPT.len() as u16) as usize;
        let scroll = input.visual_scroll(width);
        let line = Line::from(vec![
            Span::styled(PROMPT, Style::default().fg(Color::Green)),
            Span::raw(input.value().chars().skip(scroll).collect::<String>()),
        ]);
        frame.render_widget(Paragraph::new(line).block(Block::bordered()), area);

        let cursor = input.visual_cursor().saturating_sub(scroll) as u16;
        frame.set_cursor_position((area.x + 1 + PROMPT.len() as u16 + cursor, area.y + 1));
    }

    fn render_status(frame: &mut Frame, app: &App, area: Rect) {
        let session = app.terminal().session();
        let state = if session.is_running() {
            Span::styled("running", Style::default().fg(Color::Yellow))
        } else {
            match session.last_status() {
                Some(CommandStatus::Finished { exit_code: 0 }) | None => {
                    Span::styled("idle", Style::default().fg(Color::Green))
                }
                Some(CommandStatus::Finished { exit_code }) => Span::styled(
                    format!("idle (last exit {})", exit_code),
                    Style::default().fg(Color::Red),
                ),
                Some(CommandStatus::Failed { .. }) => Span::styled(
                    "idle (last spawn failed)",
                    Style::default().fg(Color::Red),
                ),
                Some(CommandStatus::Running) => Span::raw("running"),
            }
        };
        let line = Line::from(vec![
            Span::styled(
                format!(" {} ", session.working_directory().display()),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("| {} | ", session.shell())),
            state,
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }
}

fn styled_line(line: OutputLine) -> Line<'static> {
    match line.severity {
        Severity::Normal => Line::raw(line.text),
        Severity::Error => Line::styled(line.text, Style::default().fg(Color::Red)),
    }
}
