use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use crate::app::{App, LoginField, Screen, StatusKind};
use datachat_core::Sender;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, status, footer
    let [header_area, body_area, status_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Login => render_login_screen(app, frame, body_area),
        Screen::Dataset => render_dataset_screen(app, frame, body_area),
        Screen::Chat => render_chat_screen(app, frame, body_area),
    }

    render_status(app, frame, status_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let user = app
        .logged_in_as()
        .map(|email| format!(" {} ", email))
        .unwrap_or_default();

    let title = Line::from(vec![
        Span::styled(" Intelligent Data Transformation Service ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(user, Style::default().fg(Color::White)),
        Span::styled(format!(" {} ", app.client.base_url()), Style::default().fg(Color::Gray)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let Some(status) = &app.status else {
        return;
    };

    let color = match status.kind {
        StatusKind::Info => Color::Cyan,
        StatusKind::Success => Color::Green,
        StatusKind::Warning => Color::Yellow,
        StatusKind::Error => Color::Red,
    };
    let line = Paragraph::new(format!(" {}", status.text)).style(Style::default().fg(color));
    frame.render_widget(line, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_text = match app.screen {
        Screen::Login if app.login.signup => " SIGN UP ",
        Screen::Login => " LOGIN ",
        Screen::Dataset => " DATASET ",
        Screen::Chat => " CHAT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: Vec<(&str, &str)> = match app.screen {
        Screen::Login => vec![
            ("Tab", "next field"),
            ("Enter", "submit"),
            ("F2", if app.login.signup { "have an account" } else { "create account" }),
            ("Esc", "quit"),
        ],
        Screen::Dataset if app.dataset.shows_choice() => vec![
            ("c", "continue to chat"),
            ("r", "replace dataset"),
            ("^L", "logout"),
            ("q", "quit"),
        ],
        Screen::Dataset => vec![
            ("Enter", "upload"),
            ("Tab", "file type"),
            ("F5", "recheck"),
            ("^L", "logout"),
            ("Esc", if app.dataset.replace { "cancel" } else { "quit" }),
        ],
        Screen::Chat => vec![
            ("Enter", "send"),
            ("PgUp/PgDn", "scroll"),
            ("^L", "logout"),
            ("^C", "quit"),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, Style::default().bg(Color::Blue).fg(Color::White))];
    for (key, label) in hints {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Rect of the given size centered in `area`
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn render_login_screen(app: &App, frame: &mut Frame, area: Rect) {
    let form = &app.login;
    let fields = form.fields();
    let popup_area = centered(area, 60, fields.len() as u16 * 2 + 4);

    frame.render_widget(Clear, popup_area);

    let title = if form.signup { " Join Our Community - Sign Up " } else { " Login " };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(title);

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let subtitle = if form.signup { "Create an account to get started" } else { "Access your account" };
    frame.render_widget(
        Paragraph::new(subtitle).style(Style::default().fg(Color::Gray)),
        Rect::new(inner.x, inner.y, inner.width, 1),
    );

    for (i, field) in fields.iter().enumerate() {
        let (label, value) = match field {
            LoginField::Name => ("Name", form.name.clone()),
            LoginField::Email => ("Email", form.email.clone()),
            // Mask the password
            LoginField::Password => ("Password", "*".repeat(form.password.chars().count())),
        };
        let focused = form.focused() == *field;
        let label_style = if focused {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };

        let row = Rect::new(inner.x, inner.y + 2 + i as u16 * 2, inner.width, 1);
        let line = Line::from(vec![
            Span::styled(format!("{:>9}: ", label), label_style),
            Span::raw(value.clone()),
        ]);
        frame.render_widget(Paragraph::new(line), row);

        if focused {
            let cursor_x = (11 + value.chars().count()).min(row.width as usize) as u16;
            frame.set_cursor_position((row.x + cursor_x, row.y));
        }
    }
}

fn render_dataset_screen(app: &App, frame: &mut Frame, area: Rect) {
    let form = &app.dataset;
    let popup_area = centered(area, 70, 9);
    frame.render_widget(Clear, popup_area);

    let title = if form.shows_choice() { " Dataset Already Uploaded " } else { " Upload Your Dataset " };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(title);
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    if form.dataset_exists.is_none() {
        frame.render_widget(
            Paragraph::new("Checking dataset status...").style(Style::default().fg(Color::Gray)),
            inner,
        );
        return;
    }

    if form.shows_choice() {
        let text = Text::from(vec![
            Line::from("A dataset is already uploaded for this account."),
            Line::default(),
            Line::from(vec![
                Span::styled(" c ", Style::default().bg(Color::Green).fg(Color::Black)),
                Span::raw(" Continue to Chat"),
            ]),
            Line::from(vec![
                Span::styled(" r ", Style::default().bg(Color::Red).fg(Color::White)),
                Span::raw(" Replace Dataset"),
            ]),
        ]);
        frame.render_widget(Paragraph::new(text), inner);
        return;
    }

    let intro = if form.replace {
        "Choose a file to replace your current dataset."
    } else {
        "Choose a CSV or TSV file to upload."
    };
    frame.render_widget(
        Paragraph::new(intro).style(Style::default().fg(Color::Gray)),
        Rect::new(inner.x, inner.y, inner.width, 1),
    );

    let path_row = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("     File: ", Style::default().fg(Color::Cyan).bold()),
            Span::raw(form.path.as_str()),
        ])),
        path_row,
    );
    let cursor_x = (11 + form.path.chars().count()).min(path_row.width as usize) as u16;
    frame.set_cursor_position((path_row.x + cursor_x, path_row.y));

    let type_row = Rect::new(inner.x, inner.y + 4, inner.width, 1);
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("File Type: ", Style::default().fg(Color::Gray)),
            Span::styled(form.file_type.display_name(), Style::default().fg(Color::Yellow).bold()),
            Span::styled("  (Tab to switch)", Style::default().fg(Color::DarkGray)),
        ])),
        type_row,
    );
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let Some(chat) = &app.chat else {
        return;
    };

    let mut lines: Vec<Line> = Vec::new();
    for msg in chat.transcript() {
        let sender_style = match msg.sender {
            Sender::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            Sender::Ai => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            Sender::System => Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        };
        lines.push(Line::from(Span::styled(format!("{}:", msg.sender.label()), sender_style)));

        // verbatim, whitespace preserved
        for line in msg.text.lines() {
            lines.push(Line::from(line.to_string()));
        }

        if let Some(url) = &msg.download_url {
            lines.push(Line::from(vec![
                Span::styled("Download Dataset: ", Style::default().fg(Color::Green)),
                Span::styled(url.clone(), Style::default().fg(Color::Green).add_modifier(Modifier::UNDERLINED)),
            ]));
        }
        lines.push(Line::default());
    }

    if chat.is_busy() {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Transforming{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let mode = if chat.use_updated_dataset() { "updated dataset" } else { "original dataset" };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" Chat with Intelligent Service ({}) ", mode));

    let transcript = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(transcript, chat_area);

    let locked = chat.is_busy() || app.is_redirecting();
    let (input_title, border) = if chat.is_busy() {
        (" Waiting for the service... ", Color::DarkGray)
    } else if app.is_redirecting() {
        (" Redirecting... ", Color::DarkGray)
    } else if chat.awaiting_confirmation() {
        (" Answer yes or no ", Color::Magenta)
    } else {
        (" Type a command (e.g. 'filter rows where Age > 25') ", Color::Yellow)
    };

    let input = Paragraph::new(chat.pending_input())
        .style(Style::default().fg(if locked { Color::DarkGray } else { Color::White }))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(input_title),
        );
    frame.render_widget(input, input_area);

    if !locked {
        let inner_width = input_area.width.saturating_sub(2) as usize;
        let cursor_x = app.input_cursor.min(inner_width) as u16;
        frame.set_cursor_position((input_area.x + 1 + cursor_x, input_area.y + 1));
    }
}
