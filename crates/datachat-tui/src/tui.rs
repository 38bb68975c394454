use std::io::{self, Stderr};
use std::time::Duration;
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use futures_util::StreamExt;
use tokio::sync::mpsc;

pub type Tui = Terminal<CrosstermBackend<Stderr>>;

/// Tick period; drives the spinner and polling of in-flight work
const TICK_MS: u64 = 250;

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// Merges terminal input and the tick into one channel
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_events(tx));
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}

async fn pump_events(tx: mpsc::UnboundedSender<AppEvent>) {
    let mut reader = event::EventStream::new();
    let mut ticks = tokio::time::interval(Duration::from_millis(TICK_MS));

    loop {
        let next = tokio::select! {
            _ = ticks.tick() => Some(AppEvent::Tick),
            input = reader.next() => match input {
                // presses only; releases and repeats are noise
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => Some(AppEvent::Key(key)),
                Some(Ok(Event::Resize(..))) => Some(AppEvent::Resize),
                Some(Ok(_)) => None,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "terminal event error");
                    None
                }
                None => return,
            },
        };

        if let Some(event) = next {
            if tx.send(event).is_err() {
                return;
            }
        }
    }
}

pub fn init() -> Result<Tui> {
    enable_raw_mode()?;
    execute!(io::stderr(), EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(io::stderr());
    let terminal = Terminal::new(backend)?;

    Ok(terminal)
}

pub fn restore() -> Result<()> {
    execute!(io::stderr(), LeaveAlternateScreen)?;
    disable_raw_mode()?;
    Ok(())
}

/// Install panic hook to restore terminal on panic
pub fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = restore();
        original_hook(panic_info);
    }));
}
