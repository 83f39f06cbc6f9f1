use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use echokey::monte_carlo::{run_monte_carlo, summarize, MonteCarloConfig, MonteCarloSummary};
use echokey::output::{create_timestamped_output_dir, write_run_outputs};
use echokey::{run_protocol, ProtocolConfig, ProtocolReport, StopReason};

/// Reverberant-channel key agreement simulation
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file; missing fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Alice's stream seed
    #[arg(long)]
    alice_seed: Option<u64>,

    /// Bob's stream seed
    #[arg(long)]
    bob_seed: Option<u64>,

    /// Eavesdropper's stream seed
    #[arg(long)]
    eve_seed: Option<u64>,

    /// Feedback mixing gain
    #[arg(long)]
    mixing_gain: Option<f64>,

    /// Channel noise standard deviation
    #[arg(long)]
    noise_std: Option<f64>,

    /// Iteration cap for the convergence loop
    #[arg(long)]
    max_iters: Option<usize>,

    /// Early-stop threshold on the reference distance
    #[arg(long)]
    stop_threshold: Option<f64>,

    /// Also run a seeded Monte Carlo batch of this many trials
    #[arg(long)]
    trials: Option<usize>,

    /// First seed of the Monte Carlo batch (defaults to the Alice seed)
    #[arg(long)]
    base_seed: Option<u64>,

    /// Write CSV/JSON artefacts into a timestamped directory under this path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Suppress the human-readable report
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn build_config(cli: &Cli) -> Result<ProtocolConfig> {
    let mut cfg = match &cli.config {
        Some(path) => ProtocolConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => ProtocolConfig::default(),
    };

    if let Some(v) = cli.alice_seed {
        cfg.alice_seed = v;
    }
    if let Some(v) = cli.bob_seed {
        cfg.bob_seed = v;
    }
    if let Some(v) = cli.eve_seed {
        cfg.eve_seed = v;
    }
    if let Some(v) = cli.mixing_gain {
        cfg.mixing_gain = v;
    }
    if let Some(v) = cli.noise_std {
        cfg.noise_std = v;
    }
    if let Some(v) = cli.max_iters {
        cfg.max_iters = v;
    }
    if let Some(v) = cli.stop_threshold {
        cfg.stop_threshold = v;
    }

    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) => format!("{x:.3}"),
        None => "undefined".to_string(),
    }
}

fn fmt_samples(samples: &[f64]) -> String {
    let parts: Vec<String> = samples.iter().map(|v| format!("{v:.3}")).collect();
    format!("[{}]", parts.join(", "))
}

fn print_report(report: &ProtocolReport) {
    println!("ECHOKEY PROTOCOL RUN");
    println!("====================");
    println!(
        "Seeds: alice={} bob={} eve={}",
        report.alice_seed, report.bob_seed, report.eve_seed
    );
    println!(
        "\nInitial A/B correlation: {}",
        fmt_opt(report.initial_correlation)
    );
    println!("  A[0..5]: {}", fmt_samples(&report.alice_head));
    println!("  B[0..5]: {}", fmt_samples(&report.bob_head));

    println!("\nConvergence:");
    let head = &report.norms[..report.norms.len().min(5)];
    let tail = &report.norms[report.norms.len().saturating_sub(5)..];
    println!("  Norm trend: {} ... {}", fmt_samples(head), fmt_samples(tail));
    match report.stop {
        StopReason::Threshold { iteration } => {
            println!("  Stopped at iteration {iteration} (threshold)")
        }
        StopReason::IterationCap => {
            println!("  Ran all {} iterations", report.iterations)
        }
    }
    println!("  Final norm: {:.3}", report.final_norm);

    println!("\nReconciliation:");
    println!(
        "  Raw bit correlation: {}{}",
        fmt_opt(report.raw_bit_correlation),
        if report.polarity_flipped {
            " (bob flipped)"
        } else {
            ""
        }
    );
    println!(
        "  Mismatches dropped: {} ({:.1}%)",
        report.mismatches, report.mismatch_percent
    );
    println!("  Agreed bits: {}", report.reconciled_len);

    println!("\nKeys:");
    println!("  Alice: {}", report.alice_key);
    println!("  Bob:   {}", report.bob_key);
    println!("  Match: {}", report.keys_match);

    println!(
        "\nEavesdropper correlation with Alice: {}",
        fmt_opt(report.eavesdropper_correlation)
    );
}

fn print_summary(summary: &MonteCarloSummary) {
    println!("\nMONTE CARLO SUMMARY ({} trials)", summary.trials);
    println!("==============================");
    println!(
        "  Final/initial norm ratio: mean {:.3} | min {:.3} | max {:.3}",
        summary.mean_norm_ratio, summary.min_norm_ratio, summary.max_norm_ratio
    );
    println!("  Threshold stops: {}", summary.threshold_stops);
    println!("  Key match rate: {:.3}", summary.key_match_rate);
    println!("  Mean mismatches: {:.1}", summary.mean_mismatches);
    println!(
        "  Eavesdropper: mean corr {:.3} | |corr| < {} in {:.1}% of trials",
        summary.mean_eavesdropper_correlation,
        summary.eavesdropper_band,
        100.0 * summary.fraction_within_band
    );
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = build_config(&cli)?;

    let run = run_protocol(&cfg).context("protocol run failed")?;
    if !cli.quiet {
        print_report(&run.report);
    }

    let batch = match cli.trials {
        Some(trials) => {
            let mc = MonteCarloConfig::for_protocol(&cfg, trials, cli.base_seed);
            let records = run_monte_carlo(&mc).context("monte carlo batch failed")?;
            let summary = summarize(&mc, &records);
            if !cli.quiet {
                print_summary(&summary);
            }
            Some((records, summary))
        }
        None => None,
    };

    if let Some(root) = &cli.output {
        let output_dir = create_timestamped_output_dir(root).with_context(|| {
            format!("failed to create output directory under {}", root.display())
        })?;
        let outputs = write_run_outputs(
            &output_dir,
            &run.report,
            batch.as_ref().map(|(r, s)| (r.as_slice(), s)),
        )
        .context("failed to write run outputs")?;
        println!("\nRun directory: {}", outputs.output_dir.display());
    }

    Ok(())
}
