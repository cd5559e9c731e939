use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use underwriting_core::artifacts::{train_or_evaluate, Provenance, TrainingReport};
use underwriting_core::config::Config;

/// Train (or re-evaluate) the underwriting ensemble offline.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// 模型目录；默认取 UNDERWRITING_MODEL_DIR 或 ./models
    #[arg(long)]
    model_dir: Option<PathBuf>,

    #[arg(long)]
    samples: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Retrain and overwrite even if artifacts load cleanly.
    #[arg(long, default_value_t = false)]
    force: bool,
}

fn print_report(report: &TrainingReport) {
    for (name, e) in report.entries() {
        println!(
            "{:<18} mse={:>16.2} mae={:>10.2} r2={:>6.2}",
            name, e.mse, e.mae, e.r2
        );
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut cfg = Config::from_env();
    if let Some(dir) = args.model_dir {
        cfg.model_dir = dir;
    }
    if let Some(n) = args.samples {
        cfg.training.n_samples = n;
    }
    if let Some(seed) = args.seed {
        cfg.training.seed = seed;
    }
    cfg.validate()?;

    let (provenance, report) = train_or_evaluate(&cfg, args.force)?;
    match provenance {
        Provenance::Loaded => println!("loaded models from {}", cfg.model_dir.display()),
        Provenance::Trained => println!("trained models saved to {}", cfg.model_dir.display()),
    }
    print_report(&report);
    Ok(())
}
