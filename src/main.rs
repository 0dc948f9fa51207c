use anyhow::{Context, Result};
use biosphere_core::{init_logging, Engine, SimConfig};
use biosphere_lib::Demo;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Simulation settings file
    #[arg(short, long, default_value = "biosphere.toml")]
    config: PathBuf,

    /// Composite declaration to run (TOML or JSON)
    #[arg(long, conflicts_with = "demo")]
    composite: Option<PathBuf>,

    /// Bundled demo to run when no composite is given
    #[arg(long, value_enum, default_value = "growth-division")]
    demo: Demo,

    /// Simulated time to run; defaults to `engine.stop_time`
    #[arg(short, long)]
    time: Option<f64>,

    /// Overrides `engine.seed`
    #[arg(long)]
    seed: Option<u64>,

    /// Print the final snapshot as JSON
    #[arg(long)]
    snapshot: bool,

    /// Print the digest of the final snapshot
    #[arg(long)]
    digest: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = SimConfig::load(&args.config)?;
    if let Some(seed) = args.seed {
        config.engine.seed = seed;
    }
    init_logging(&config.logging.level);

    let spec = match &args.composite {
        Some(path) => biosphere_lib::load_composite(path)?,
        None => args.demo.composite(),
    };
    let total = args.time.unwrap_or(config.engine.stop_time);
    let description = match &args.composite {
        Some(path) => format!("composite {}", path.display()),
        None => format!("demo {:?}", args.demo),
    };

    let mut engine = Engine::from_spec(&spec, biosphere_lib::registry()?, config)
        .context("Failed to build the experiment")?
        .with_description(&description);
    let summary = engine.run(total).context("Simulation failed")?;

    let metrics = engine.metrics();
    tracing::info!(
        experiment = %engine.info().experiment_id,
        rounds = summary.rounds,
        time = summary.end_time,
        reason = ?summary.reason,
        processes = engine.process_ids().len(),
        divisions = metrics.divisions(),
        elapsed_ms = metrics.elapsed().as_millis() as u64,
        "experiment finished"
    );

    let snapshot = engine.snapshot();
    if args.snapshot {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    if args.digest {
        println!("{}", snapshot.digest());
    }
    Ok(())
}
