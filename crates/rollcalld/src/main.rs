use anyhow::{Context, Result};
use rollcall_core::{FaceEncoder, OnnxFaceEncoder};
use rollcall_hw::{CameraProvider, V4lCameraProvider};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

mod capture;
mod config;
mod dbus_interface;
mod ledger;
mod roster;
mod session;
#[cfg(test)]
mod testing;

use capture::SessionSettings;
use config::{BusKind, Config};
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};
use ledger::{AttendanceLedger, JsonLedger, LocalClock};
use roster::{PhotoRoster, RosterSource};
use session::{Collaborators, SessionController};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rollcalld starting");

    let config = Config::load()?;
    tracing::info!(
        camera = config.camera_device.as_deref().unwrap_or("probe"),
        threshold = config.acceptance_threshold,
        "configuration loaded"
    );

    let encoder = OnnxFaceEncoder::load(&config.model_dir, config.max_faces)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    tracing::info!(dir = %config.model_dir.display(), "face models loaded");

    let roster = Arc::new(PhotoRoster::new(&config.student_dir, config.encoding_cache()));
    let ledger = Arc::new(JsonLedger::new(&config.attendance_file));
    tracing::debug!(
        roster = %roster.dir().display(),
        ledger = %ledger.path().display(),
        "stores opened"
    );
    let cameras = V4lCameraProvider::new(config.camera_device.clone(), config.capture_timeout());
    let encoder: Box<dyn FaceEncoder> = Box::new(encoder);

    let controller = SessionController::new(
        Collaborators {
            roster: Arc::clone(&roster) as Arc<dyn RosterSource>,
            ledger: Arc::clone(&ledger) as Arc<dyn AttendanceLedger>,
            cameras: Arc::new(cameras) as Arc<dyn CameraProvider>,
            encoder: Arc::new(Mutex::new(encoder)),
            clock: Arc::new(LocalClock),
        },
        SessionSettings {
            acceptance_threshold: config.acceptance_threshold,
            frame_interval: config.frame_interval(),
            cooldown: config.cooldown(),
            skip_dark_frames: config.skip_dark_frames,
        },
    );

    let service = AttendanceService::new(controller.clone(), roster, ledger);
    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .with_context(|| format!("registering {BUS_NAME} on the {:?} bus", config.bus))?;

    tracing::info!(name = BUS_NAME, bus = ?config.bus, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    if controller.is_running() {
        let stopping = controller.clone();
        match tokio::task::spawn_blocking(move || stopping.stop()).await? {
            Ok(report) => tracing::info!(
                recognized = report.recognized_students.len(),
                "session stopped for shutdown"
            ),
            Err(e) => tracing::warn!(error = %e, "failed to stop session cleanly"),
        }
    }

    Ok(())
}
