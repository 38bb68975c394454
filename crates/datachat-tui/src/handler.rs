use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, Screen};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key)?,
        AppEvent::Resize => app.scroll_chat_to_bottom(),
        AppEvent::Tick => app.tick_animation(),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work on every screen
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => {
                app.should_quit = true;
                return Ok(());
            }
            KeyCode::Char('l') if app.screen != Screen::Login => {
                app.logout();
                return Ok(());
            }
            _ => {}
        }
    }

    match app.screen {
        // Forms are frozen until the account or dataset call returns
        Screen::Login | Screen::Dataset if app.is_working() => {}
        Screen::Login => handle_login(app, key),
        Screen::Dataset => handle_dataset(app, key),
        Screen::Chat => handle_chat(app, key),
    }
    Ok(())
}

fn handle_login(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.should_quit = true,
        KeyCode::F(2) => {
            app.login.toggle_signup();
            app.status = None;
        }
        KeyCode::Tab | KeyCode::Down => app.login.focus_next(),
        KeyCode::BackTab | KeyCode::Up => app.login.focus_prev(),
        KeyCode::Enter => app.submit_login(),
        KeyCode::Backspace => {
            app.login.focused_value_mut().pop();
        }
        KeyCode::Char(c) => app.login.focused_value_mut().push(c),
        _ => {}
    }
}

fn handle_dataset(app: &mut App, key: KeyEvent) {
    if app.dataset.shows_choice() {
        match key.code {
            KeyCode::Char('c') | KeyCode::Enter => app.open_chat(),
            KeyCode::Char('r') => app.dataset.replace = true,
            KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Esc => {
            if app.dataset.replace && app.dataset.dataset_exists == Some(true) {
                // back out of replacing, keep the current dataset
                app.dataset.replace = false;
            } else {
                app.should_quit = true;
            }
        }
        KeyCode::Tab => app.dataset.file_type = app.dataset.file_type.toggled(),
        KeyCode::Enter => app.upload_dataset(),
        KeyCode::F(5) => app.refresh_dataset_status(),
        KeyCode::Backspace => {
            let mut path = std::mem::take(&mut app.dataset.path);
            path.pop();
            app.dataset.set_path(path);
        }
        KeyCode::Char(c) => {
            let mut path = std::mem::take(&mut app.dataset.path);
            path.push(c);
            app.dataset.set_path(path);
        }
        _ => {}
    }
}

fn handle_chat(app: &mut App, key: KeyEvent) {
    let half_page = app.chat_height.max(2) / 2;
    match key.code {
        KeyCode::PageUp => return app.scroll_chat_up(half_page),
        KeyCode::PageDown => return app.scroll_chat_down(half_page),
        KeyCode::Enter => return app.submit_chat(),
        _ => {}
    }
    if app.is_redirecting() {
        return;
    }

    let cursor = app.input_cursor;
    // Input is locked while a transformation is in flight
    let Some(input) = app.chat.as_mut().and_then(|c| c.pending_input_mut()) else {
        return;
    };

    let char_count = input.chars().count();
    let cursor = cursor.min(char_count);
    let new_cursor = match key.code {
        KeyCode::Backspace if cursor > 0 => {
            let at = char_to_byte_index(input, cursor - 1);
            input.remove(at);
            cursor - 1
        }
        KeyCode::Delete if cursor < char_count => {
            let at = char_to_byte_index(input, cursor);
            input.remove(at);
            cursor
        }
        KeyCode::Left => cursor.saturating_sub(1),
        KeyCode::Right => (cursor + 1).min(char_count),
        KeyCode::Home => 0,
        KeyCode::End => char_count,
        KeyCode::Char(c) => {
            let at = char_to_byte_index(input, cursor);
            input.insert(at, c);
            cursor + 1
        }
        _ => cursor,
    };
    app.input_cursor = new_cursor;
}

#[cfg(test)]
mod tests {
    use super::*;
    use datachat_core::{Config, CredentialStore};
    use tempfile::tempdir;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_char_to_byte_index_multibyte() {
        let s = "añb";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 10), s.len());
    }

    #[tokio::test]
    async fn test_chat_input_editing() {
        let dir = tempdir().unwrap();
        let mut app = App::new(Config::new(), CredentialStore::new(dir.path())).unwrap();
        app.open_chat();

        for c in "sze".chars() {
            handle_chat(&mut app, press(KeyCode::Char(c)));
        }
        handle_chat(&mut app, press(KeyCode::Left));
        handle_chat(&mut app, press(KeyCode::Left));
        handle_chat(&mut app, press(KeyCode::Char('i')));

        let chat = app.chat.as_ref().unwrap();
        assert_eq!(chat.pending_input(), "size");
        assert_eq!(app.input_cursor, 2);
    }

    #[tokio::test]
    async fn test_typing_ignored_during_redirect() {
        let dir = tempdir().unwrap();
        let mut app = App::new(Config::new(), CredentialStore::new(dir.path())).unwrap();
        app.open_chat();
        app.chat.as_mut().unwrap().set_pending_input("change dataset");
        handle_chat(&mut app, press(KeyCode::Enter));
        assert!(app.is_redirecting());

        for c in "size".chars() {
            handle_chat(&mut app, press(KeyCode::Char(c)));
        }
        handle_chat(&mut app, press(KeyCode::Enter));

        let chat = app.chat.as_ref().unwrap();
        assert_eq!(chat.pending_input(), "");
        assert!(app.in_flight.is_none());
    }

    #[tokio::test]
    async fn test_login_form_frozen_while_working() {
        let dir = tempdir().unwrap();
        let mut app = App::new(Config::new(), CredentialStore::new(dir.path())).unwrap();
        app.login.email = "ana@example.com".to_string();
        app.login.password = "pw".to_string();
        handle_key(&mut app, press(KeyCode::Enter)).unwrap();
        assert!(app.is_working());

        handle_key(&mut app, press(KeyCode::Char('x'))).unwrap();
        assert_eq!(app.login.email, "ana@example.com");

        handle_key(&mut app, KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)).unwrap();
        assert!(app.should_quit);
    }

    #[test]
    fn test_ctrl_c_quits() {
        let dir = tempdir().unwrap();
        let mut app = App::new(Config::new(), CredentialStore::new(dir.path())).unwrap();
        handle_key(&mut app, KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)).unwrap();
        assert!(app.should_quit);
    }
}
