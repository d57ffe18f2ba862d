use std::{
    error::Error,
    io::{self, Stdout},
    rc::Rc,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use beaconscan_discovery::{
    BleStack, ScanOptions, StartOptions,
    hub::Subscription,
    local::LocalStack,
    permission::{HostPermissions, check_location_permission},
    session::{Session, SessionInput, Toggle},
};
use beaconscan_domain::{event::EventKind, snapshot::Snapshot};
use beaconscan_sinks::history::{EventSink, EventSinkFormat, RecordedEvent, noop::NoopEventSink};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    widgets::{Block, Borders},
};
use ratatui::{
    prelude::*,
    widgets::{Cell, Paragraph, Row, Table, TableState},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, info};
use uuid::Uuid;

const CONNECTED: Color = Color::Rgb(0x06, 0x94, 0x00);
const BUTTON: Color = Color::Rgb(0x0a, 0x39, 0x8a);
const BODY: Color = Color::Rgb(0x00, 0x82, 0xfc);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// path to a .jsonl file to record host events to
    #[arg(short, long)]
    record: Option<String>,

    /// only list peripherals advertising this service uuid (repeatable)
    #[arg(short, long = "service")]
    services: Vec<Uuid>,

    /// how long each scan runs, e.g. "3s"
    #[arg(short, long, default_value = "3s", value_parser = humantime::parse_duration)]
    duration: Duration,

    /// report every advertisement, not just the first per peripheral
    #[arg(long)]
    allow_duplicates: bool,

    /// report loudly when Bluetooth is unavailable
    #[arg(long)]
    show_alert: bool,
}

impl Args {
    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            service_uuids: self.services.clone(),
            duration: self.duration,
            allow_duplicates: self.allow_duplicates,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let args = Args::parse();

    let stack = Arc::new(LocalStack::new());
    stack
        .start(StartOptions {
            show_alert: args.show_alert,
        })
        .await?;
    check_location_permission(&HostPermissions).await;

    let mut sink: Box<dyn EventSink> = sink(&args)?;
    let mut terminal = setup_terminal().context("setup failed")?;
    let session = Session::new(stack, args.scan_options());
    let outcome = run(&mut sink, &mut terminal, session).await;
    restore_terminal(&mut terminal).context("restore terminal failed")?;
    sink.close().await?;
    outcome
}

fn sink(args: &Args) -> Result<Box<dyn EventSink>, Box<dyn Error>> {
    match &args.record {
        Some(name) => EventSinkFormat::create_from_file(name)?.to_sink(),
        None => Ok(Box::<NoopEventSink>::default()),
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode().context("failed to enable raw mode")?;
    execute!(stdout, EnterAlternateScreen).context("unable to enter alternate screen")?;
    Terminal::new(CrosstermBackend::new(stdout)).context("creating terminal failed")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("unable to switch to main screen")?;
    terminal.show_cursor().context("unable to show cursor")
}

async fn run(
    sink: &mut Box<dyn EventSink>,
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut session: Session<LocalStack>,
) -> Result<(), Box<dyn Error>> {
    let (inputs_tx, mut inputs) = mpsc::unbounded_channel::<SessionInput>();
    let subscription = session.stack().events().subscribe(&EventKind::ALL);
    let forwarder = forward_events(subscription, inputs_tx.clone());
    let start = Instant::now();
    let mut selected: Option<String> = None;

    loop {
        let snapshot = session.snapshot();
        let scanning = session.is_scanning();
        let position = selected
            .as_deref()
            .and_then(|id| snapshot.0.iter().position(|r| r.id == id));
        terminal.draw(|f| draw(f, &snapshot, scanning, position, start))?;

        match read_key()? {
            Some(KeyCode::Char('q') | KeyCode::Esc) => break,
            Some(KeyCode::Char('s')) => {
                session.start_scan().await;
            }
            Some(KeyCode::Up) => selected = step(&snapshot, position, -1),
            Some(KeyCode::Down) => selected = step(&snapshot, position, 1),
            Some(KeyCode::Enter) => {
                if let Some(id) = &selected {
                    toggle(&mut session, id, &inputs_tx);
                }
            }
            _ => {}
        }

        let mut recorded = vec![];
        while let Ok(input) = inputs.try_recv() {
            if let SessionInput::Host(event) = &input {
                recorded.push(RecordedEvent::now(event.clone()));
            }
            session.apply(input);
        }
        if !recorded.is_empty() {
            sink.save(&recorded).await?;
        }
    }

    // dropping the task drops its subscription, which unsubscribes
    forwarder.abort();
    info!("unmount");
    Ok(())
}

/// Host events share the loop's queue with connect results so the session
/// sees both in the order they arrived.
fn forward_events(
    mut subscription: Subscription,
    inputs: mpsc::UnboundedSender<SessionInput>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            if inputs.send(SessionInput::Host(event)).is_err() {
                break;
            }
        }
    })
}

fn step(snapshot: &Snapshot, position: Option<usize>, delta: isize) -> Option<String> {
    if snapshot.is_empty() {
        return None;
    }
    let last = snapshot.len() - 1;
    let next = match position {
        None => 0,
        Some(p) => p.saturating_add_signed(delta).min(last),
    };
    Some(snapshot.0[next].id.clone())
}

/// Connects run on their own task; the result comes back through
/// `inputs` so only the event loop touches the session.
fn toggle(
    session: &mut Session<LocalStack>,
    id: &str,
    inputs: &mpsc::UnboundedSender<SessionInput>,
) {
    let stack = session.stack();
    let id = id.to_string();
    match session.toggle_target(&id) {
        Toggle::Disconnect => {
            tokio::spawn(async move {
                if let Err(e) = stack.disconnect(&id).await {
                    error!("Disconnect error {id}: {e}");
                }
            });
        }
        Toggle::Connect => {
            session.begin_connect(&id);
            let inputs = inputs.clone();
            tokio::spawn(async move {
                let result = stack.connect(&id).await;
                let _ = inputs.send(SessionInput::ConnectFinished { id, result });
            });
        }
    }
}

fn draw(
    frame: &mut Frame,
    snapshot: &Snapshot,
    scanning: bool,
    selected: Option<usize>,
    start: Instant,
) {
    use humantime::format_duration;

    let main_layout = layout(frame);
    frame.render_widget(Block::default().style(Style::default().bg(BODY)), frame.area());

    let button = Paragraph::new(if scanning {
        "Scanning..."
    } else {
        "Scan Bluetooth"
    })
    .alignment(Alignment::Center)
    .style(Style::default().fg(Color::White).bg(BUTTON))
    .block(Block::default().borders(Borders::ALL).title("press 's'"));
    frame.render_widget(button, main_layout[0]);

    if snapshot.is_empty() {
        let empty = Paragraph::new("No Peripherals, press \"s\" to scan")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::White))
            .block(Block::default().title("Peripherals").borders(Borders::ALL));
        frame.render_widget(empty, main_layout[1]);
    } else {
        let mut state = TableState::default().with_selected(selected);
        frame.render_stateful_widget(
            table(snapshot_to_table_rows(snapshot), "Peripherals"),
            main_layout[1],
            &mut state,
        );
    }

    let runtime = format_duration(Duration::from_secs(start.elapsed().as_secs()));
    let footer = Paragraph::new(format!(
        "Peripherals: {}, connected: {}, run time: {runtime}\n(↑/↓ select, enter connect/disconnect, 'q' quit)",
        snapshot.len(),
        snapshot.connected(),
    ))
    .block(Block::default().title("Context").borders(Borders::ALL))
    .style(Style::default().fg(Color::White));
    frame.render_widget(footer, main_layout[2]);
}

fn snapshot_to_table_rows<'a>(snapshot: &Snapshot) -> Vec<Row<'a>> {
    snapshot
        .rows()
        .iter()
        .map(|row| {
            let style = if row.record.connected {
                Style::default().fg(Color::White).bg(CONNECTED)
            } else {
                Style::default().fg(Color::White).bg(Color::Black)
            };
            let cells = vec![
                Cell::from(row.title()),
                Cell::from(format!("{}", row.record.rssi)),
                Cell::from(row.key().to_string()),
                Cell::from(row.major()),
                Cell::from(row.minor()),
            ];
            Row::new(cells).style(style)
        })
        .collect()
}

fn table<'a>(rows: Vec<Row<'a>>, title: &'a str) -> Table<'a> {
    Table::new(
        rows,
        &[
            Constraint::Length(32),
            Constraint::Length(6),
            Constraint::Length(38),
            Constraint::Length(6),
            Constraint::Length(6),
        ],
    )
    .style(Style::default().fg(Color::White))
    .block(Block::default().title(title).borders(Borders::ALL))
    .header(
        Row::new(vec!["Name", "RSSI", "Id", "Major", "Minor"])
            .style(Style::default().fg(Color::Yellow)),
    )
    .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
}

fn layout(frame: &mut Frame) -> Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(4),
            ]
            .as_ref(),
        )
        .split(frame.area())
}

fn read_key() -> Result<Option<KeyCode>> {
    if event::poll(Duration::from_millis(100)).context("event poll failed")?
        && let Event::Key(key) = event::read().context("event read failed")?
        && key.kind == KeyEventKind::Press
    {
        return Ok(Some(key.code));
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use beaconscan_domain::{peripheral::PeripheralRecord, snapshot::Snapshot};

    use super::step;

    fn snapshot(ids: &[&str]) -> Snapshot {
        Snapshot(ids.iter().map(|id| PeripheralRecord::new(*id)).collect())
    }

    #[test]
    fn nothing_to_select_in_empty_list() {
        assert_eq!(step(&snapshot(&[]), None, 1), None);
        assert_eq!(step(&snapshot(&[]), Some(3), -1), None);
    }

    #[test]
    fn first_move_selects_first_row() {
        let rows = snapshot(&["A", "B", "C"]);
        assert_eq!(step(&rows, None, 1).as_deref(), Some("A"));
        assert_eq!(step(&rows, None, -1).as_deref(), Some("A"));
    }

    #[test]
    fn moves_stop_at_the_ends() {
        let rows = snapshot(&["A", "B", "C"]);
        assert_eq!(step(&rows, Some(1), 1).as_deref(), Some("C"));
        assert_eq!(step(&rows, Some(2), 1).as_deref(), Some("C"));
        assert_eq!(step(&rows, Some(1), -1).as_deref(), Some("A"));
        assert_eq!(step(&rows, Some(0), -1).as_deref(), Some("A"));
    }
}
