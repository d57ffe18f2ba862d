use std::{
    collections::BTreeSet,
    error::Error,
    sync::Arc,
    time::{Duration, Instant},
};

use beaconscan_discovery::{
    BleStack, ScanOptions, StartOptions,
    error::StackError,
    hub::Subscription,
    local::LocalStack,
    permission::{HostPermissions, check_location_permission},
    session::Session,
};
use beaconscan_domain::{
    event::{EventKind, HostEvent},
    registry::PeripheralRegistry,
};
use beaconscan_sinks::history::{EventSink, EventSinkFormat, RecordedEvent, noop::NoopEventSink};
use clap::Parser;
use tracing::{info, warn};
use uuid::Uuid;

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

    /// number of scans to run, 0 scans until interrupted
    #[arg(long, default_value_t = 1)]
    scans: u32,

    /// connect to this peripheral id once it has been seen (repeatable)
    #[arg(short, long)]
    connect: Vec<String>,
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
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let stack = Arc::new(LocalStack::new());
    stack
        .start(StartOptions {
            show_alert: args.show_alert,
        })
        .await?;
    check_location_permission(&HostPermissions).await;

    let mut sink: Box<dyn EventSink> = sink(&args)?;
    let mut session = Session::new(stack, args.scan_options());
    run(&mut sink, &mut session, &args).await?;
    sink.close().await?;
    Ok(())
}

fn sink(args: &Args) -> Result<Box<dyn EventSink>, Box<dyn Error>> {
    match &args.record {
        Some(name) => EventSinkFormat::create_from_file(name)?.to_sink(),
        None => Ok(Box::<NoopEventSink>::default()),
    }
}

async fn run(
    sink: &mut Box<dyn EventSink>,
    session: &mut Session<LocalStack>,
    args: &Args,
) -> Result<(), Box<dyn Error>> {
    let mut subscription = session.stack().events().subscribe(&EventKind::ALL);
    let mut pending: BTreeSet<String> = args.connect.iter().cloned().collect();
    let start = Instant::now();
    let mut completed = 0;

    while args.scans == 0 || completed < args.scans {
        if !session.start_scan().await {
            break;
        }
        drain_scan(sink, session, &mut subscription).await?;
        completed += 1;

        for id in take_seen(&mut pending, session.registry()) {
            session.connect(&id).await;
        }

        print_scan_results(session, completed, start);
    }

    for id in &pending {
        warn!("{id} was never seen, not connecting");
    }
    subscription.unsubscribe();
    info!("unmount");
    Ok(())
}

/// Applies host events until the stack reports the scan stopped.
async fn drain_scan(
    sink: &mut Box<dyn EventSink>,
    session: &mut Session<LocalStack>,
    subscription: &mut Subscription,
) -> Result<(), Box<dyn Error>> {
    while let Some(event) = subscription.recv().await {
        session.handle_event(&event);
        let stopped = event == HostEvent::ScanStopped;
        sink.save(&[RecordedEvent::now(event)]).await?;
        if stopped {
            return Ok(());
        }
    }
    Err(StackError::ChannelClosed.into())
}

/// Removes and returns the pending ids the registry now knows about.
fn take_seen(pending: &mut BTreeSet<String>, registry: &PeripheralRegistry) -> Vec<String> {
    let seen: Vec<String> = pending
        .iter()
        .filter(|id| registry.get(id).is_some())
        .cloned()
        .collect();
    for id in &seen {
        pending.remove(id);
    }
    seen
}

fn print_scan_results(session: &Session<LocalStack>, scan: u32, start: Instant) {
    use humantime::format_duration;

    let runtime = format_duration(Duration::from_secs(start.elapsed().as_secs()));
    let snapshot = session.snapshot();
    println!("\n=== Scan {scan} (Runtime: {runtime}) ===");
    if snapshot.is_empty() {
        println!("No Peripherals");
        return;
    }
    println!(
        "{:<38} {:<32} {:>4} {:>5} {:>5}",
        "Id", "Name", "RSSI", "Major", "Minor"
    );
    println!("{}", "-".repeat(88));
    print!("{snapshot}");
    println!(
        "\nTotal peripherals: {} (connected: {})",
        snapshot.len(),
        snapshot.connected()
    );
}
