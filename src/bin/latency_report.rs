use std::time::{Duration, Instant};

use clap::Parser;
use hdrhistogram::Histogram;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tick_ladder::{Engine, EngineConfig, Side, TickEvent};

#[derive(Parser, Debug)]
#[command(about = "Per-event latency distribution of the engine")]
struct Args {
    /// Number of events to time
    #[arg(short, long, default_value_t = 1_000_000)]
    iterations: u64,

    /// Engine config (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Seed for the event generator
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    println!("Preparing Latency Benchmark...");

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let mut engine = Engine::new(config)?;
    engine.warm_up(100_000)?;

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 100_000, 3)?;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut resting: Vec<u64> = Vec::new();
    let mut total_duration = Duration::ZERO;

    println!("Running {} iterations...", args.iterations);

    for order_id in 1..=args.iterations {
        // Keep the book around a few hundred orders: place, cancel, modify
        let event = if resting.len() > 500 || (!resting.is_empty() && rng.gen_bool(0.3)) {
            let victim = resting.swap_remove(rng.gen_range(0..resting.len()));
            if rng.gen_bool(0.5) {
                TickEvent::cancel(victim)
            } else {
                resting.push(victim);
                TickEvent::modify(victim, 10_000 + rng.gen_range(-50..50), 10)
            }
        } else {
            let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
            let offset = rng.gen_range(1..100);
            let price = match side {
                Side::Bid => 10_000 - offset,
                Side::Ask => 10_000 + offset,
            };
            resting.push(order_id);
            TickEvent::place(order_id, side, price, rng.gen_range(1..100))
        };

        // Critical measurement section
        let start = Instant::now();
        let out = std::hint::black_box(engine.process(event));
        let elapsed = start.elapsed();
        drop(out);

        // Outliers beyond the histogram bound are discarded
        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total_duration += elapsed;

        resting.retain(|id| engine.contains(*id));
    }

    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {}", args.iterations);
    println!("Throughput: {:.2} ops/sec", args.iterations as f64 / total_duration.as_secs_f64());
    println!("Resting:    {}", engine.order_count());
    println!("Index size: {}", engine.book().index_size());
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");

    println!("\nDistribution:");
    for v in histogram.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:6} ns: {:10}", v.value_iterated_to(), count);
        }
    }
    Ok(())
}
