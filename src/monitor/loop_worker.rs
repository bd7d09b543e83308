use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use log::{error, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::analysis::coverage_percent;
use crate::capture::{run_capture, CycleDirs};
use crate::db::Database;
use crate::driver::PageDriver;
use crate::models::CoverageObservation;
use crate::push::PushClient;
use crate::settings::Settings;
use crate::timegrid::{forecast_from, round_to_grid};

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// How a single cycle ended. Capture and analysis failures are expected
/// outcomes, not errors; they skip persistence for the cycle and nothing
/// more.
#[derive(Debug)]
pub enum CycleOutcome {
    Stored(CoverageObservation),
    CaptureFailed,
    AnalysisFailed,
}

/// The indefinite capture→classify→persist→push loop. Exits only on
/// cancellation; every per-cycle failure is contained to its cycle.
pub async fn monitor_loop(
    driver: Arc<dyn PageDriver>,
    db: Database,
    push: Arc<PushClient>,
    settings: Arc<Settings>,
    cancel_token: CancellationToken,
) {
    loop {
        info!(
            "Starting capture cycle at {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        match run_cycle(driver.as_ref(), &db, &push, &settings).await {
            Ok(CycleOutcome::Stored(observation)) => {
                info!(
                    "Cycle complete: {} at {} -> {}",
                    observation.city,
                    observation.timestamp_str(),
                    observation.values
                );
            }
            Ok(CycleOutcome::CaptureFailed) => {
                warn!(
                    "No cropped region this cycle; backing off {}s before pacing",
                    settings.fallback_interval_secs
                );
                tokio::select! {
                    () = sleep(Duration::from_secs(settings.fallback_interval_secs)) => {}
                    () = cancel_token.cancelled() => break,
                }
            }
            Ok(CycleOutcome::AnalysisFailed) => {
                warn!("Coverage analysis failed; nothing stored or pushed this cycle");
            }
            Err(err) => {
                error!("Error in capture cycle: {err:#}");
            }
        }

        tokio::select! {
            () = sleep(Duration::from_secs(settings.cycle_interval_secs)) => {}
            () = cancel_token.cancelled() => break,
        }
    }

    info!("Monitor loop shutting down");
}

/// One full cycle. Returns `Err` only for faults outside the expected
/// degraded paths (e.g. the artifact directory cannot be created).
pub async fn run_cycle(
    driver: &dyn PageDriver,
    db: &Database,
    push: &PushClient,
    settings: &Settings,
) -> Result<CycleOutcome> {
    let now = Local::now().naive_local();
    let cycle_ts = round_to_grid(now, settings.grid_minutes);
    let forecast_ts = forecast_from(cycle_ts, settings.horizon_minutes);
    let stamp = forecast_ts.format(STAMP_FORMAT).to_string();
    info!("Cycle timestamp {cycle_ts}, forecast timestamp {forecast_ts}");

    let dirs = CycleDirs::create(&settings.artifact_root, &stamp)
        .context("could not prepare artifact directories")?;

    let capture = run_capture(driver, settings, &dirs).await;
    let Some(cropped) = capture.cropped else {
        return Ok(CycleOutcome::CaptureFailed);
    };

    let crop_for_analysis = cropped.clone();
    let percent = match tokio::task::spawn_blocking(move || coverage_percent(&crop_for_analysis))
        .await
        .context("analysis worker join failed")?
    {
        Ok(percent) => percent,
        Err(err) => {
            error!("Analysis of {} failed: {err:#}", cropped.display());
            return Ok(CycleOutcome::AnalysisFailed);
        }
    };

    let observation = CoverageObservation::new(
        settings.city.clone(),
        forecast_ts,
        percent,
        settings.observation_type.clone(),
    );

    // Persistence, the local artifact, and the push are independent sinks:
    // one failing must not block the others.
    if let Err(err) = db.upsert_observation(&observation).await {
        error!("Failed to store observation: {err:#}");
    }

    if let Err(err) = write_json_artifact(&dirs, &observation) {
        error!("Failed to write JSON artifact: {err:#}");
    }

    if let Err(err) = push.push(&observation).await {
        error!("Failed to push observation: {err:#}");
    }

    Ok(CycleOutcome::Stored(observation))
}

fn write_json_artifact(dirs: &CycleDirs, observation: &CoverageObservation) -> Result<()> {
    let path = dirs.json_path();
    let serialized = serde_json::to_string_pretty(observation)?;
    fs::write(&path, serialized)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("JSON artifact saved to {}", path.display());
    Ok(())
}
