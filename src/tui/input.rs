use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use tui_input::backend::crossterm::to_input_request;

use crate::app::App;

/// Handle key event and update app state
pub fn handle_key(app: &mut App, key: KeyEvent) {
    // Ctrl-C quits regardless of the input field
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.quit();
        return;
    }

    let page = app.visible_lines().max(1);
    match key.code {
        KeyCode::Esc => app.cancel(),
        KeyCode::Enter => app.submit_input(),

        // Scroll-back navigation
        KeyCode::PageUp => app.scroll_up(page),
        KeyCode::PageDown => app.scroll_down(page),
        KeyCode::Up if key.modifiers.contains(KeyModifiers::SHIFT) => app.scroll_up(1),
        KeyCode::Down if key.modifiers.contains(KeyModifiers::SHIFT) => app.scroll_down(1),

        // Delegate to tui-input for text editing (Emacs-like keybindings)
        _ => {
            if let Some(req) = to_input_request(&Event::Key(key)) {
                app.handle_input(req);
            }
        }
    }
}
