use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::Writer;
use serde::Serialize;

use crate::error::Result;
use crate::monte_carlo::{MonteCarloSummary, TrialRecord};
use crate::sim::ProtocolReport;

fn fmt_f64(value: f64) -> String {
    format!("{value:.10}")
}

/// Create `<root>/<UTC timestamp>`, adding a numeric suffix on collision
pub fn create_timestamped_output_dir(root: &Path) -> Result<PathBuf> {
    fs::create_dir_all(root)?;

    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let mut output_dir = root.join(&timestamp);
    let mut counter = 1_u32;

    while output_dir.exists() {
        output_dir = root.join(format!("{timestamp}-{counter:02}"));
        counter += 1;
    }

    fs::create_dir_all(&output_dir)?;
    Ok(output_dir)
}

pub fn write_norms_csv(path: &Path, norms: &[f64]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(["iteration", "norm"])?;

    for (iteration, norm) in norms.iter().enumerate() {
        writer.write_record([iteration.to_string(), fmt_f64(*norm)])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_trials_csv(path: &Path, records: &[TrialRecord]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)?;
    fs::write(path, payload)?;
    Ok(())
}

/// Paths of the files written for one run
#[derive(Debug, Clone)]
pub struct RunOutputs {
    pub output_dir: PathBuf,
    pub norms_path: PathBuf,
    pub report_path: PathBuf,
    pub trials_path: Option<PathBuf>,
    pub summary_path: Option<PathBuf>,
}

pub fn write_run_outputs(
    output_dir: &Path,
    report: &ProtocolReport,
    batch: Option<(&[TrialRecord], &MonteCarloSummary)>,
) -> Result<RunOutputs> {
    let norms_path = output_dir.join("norms.csv");
    let report_path = output_dir.join("report.json");
    write_norms_csv(&norms_path, &report.norms)?;
    write_json(&report_path, report)?;

    let (trials_path, summary_path) = match batch {
        Some((records, summary)) => {
            let trials_path = output_dir.join("trials.csv");
            let summary_path = output_dir.join("summary.json");
            write_trials_csv(&trials_path, records)?;
            write_json(&summary_path, summary)?;
            (Some(trials_path), Some(summary_path))
        }
        None => (None, None),
    };

    Ok(RunOutputs {
        output_dir: output_dir.to_path_buf(),
        norms_path,
        report_path,
        trials_path,
        summary_path,
    })
}
