//! Replay a CSV event file through the engine and print the final book.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use tick_ladder::feed::read_events;
use tick_ladder::{Engine, EngineConfig, OutputEvent, Side};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Replay order events from CSV into a tick ladder book")]
struct Args {
    /// CSV file with header `order_id,kind,side,price,qty`
    input: PathBuf,

    /// Engine config (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Multiplier turning decimal prices into integer prices
    #[arg(long, default_value_t = 100)]
    price_mult: u64,

    /// Levels per side to print at the end
    #[arg(long, default_value_t = 10)]
    depth: usize,

    /// Stop at the first malformed row instead of skipping it
    #[arg(long)]
    strict: bool,
}

#[derive(Default)]
struct Tally {
    events: u64,
    skipped: u64,
    trades: u64,
    traded_qty: u64,
    rejected: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    tracing::info!(?config, input = %args.input.display(), "starting replay");

    let mut engine = Engine::new(config)?;
    let reader = BufReader::new(File::open(&args.input)?);
    let mut tally = Tally::default();
    let start = Instant::now();

    for (row, event) in read_events(reader, args.price_mult).enumerate() {
        let event = match event {
            Ok(event) => event,
            Err(e) if !args.strict => {
                tracing::warn!(row = row + 1, error = %e, "skipping row");
                tally.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        tally.events += 1;
        for out in engine.process(event) {
            match out {
                OutputEvent::Trade(t) => {
                    tally.trades += 1;
                    tally.traded_qty = tally.traded_qty.saturating_add(t.qty);
                }
                OutputEvent::Rejected(r) => {
                    tracing::debug!(order_id = r.order_id, reason = ?r.reason, "rejected");
                    tally.rejected += 1;
                }
                _ => {}
            }
        }
    }

    let elapsed = start.elapsed();
    tracing::info!(
        events = tally.events,
        skipped = tally.skipped,
        trades = tally.trades,
        traded_qty = tally.traded_qty,
        rejected = tally.rejected,
        elapsed_ms = elapsed.as_millis() as u64,
        "replay finished"
    );

    println!("resting orders: {}", engine.order_count());
    println!("index size:     {}", engine.book().index_size());
    println!("spread:         {:?}", engine.spread());
    println!("state hash:     {:016x}", engine.state_hash());
    println!();

    let book = engine.book();
    let asks: Vec<_> = book.levels(Side::Ask).take(args.depth).collect();
    for level in asks.iter().rev() {
        println!("ask {:>12} {:>12} ({})", level.price(), level.qty(), level.order_count());
    }
    println!("{:-<36}", "");
    for level in book.levels(Side::Bid).take(args.depth) {
        println!("bid {:>12} {:>12} ({})", level.price(), level.qty(), level.order_count());
    }
    Ok(())
}
