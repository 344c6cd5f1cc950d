use crate::ledger::{JsonLedger, LedgerError};
use crate::roster::{PhotoRoster, RosterError};
use crate::session::{SessionController, SessionError};
use std::path::PathBuf;
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus interface for the rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
///
/// Structured results are returned as JSON strings. Failures are
/// `org.freedesktop.DBus.Error.Failed` carrying `"<Kind>: <message>"`.
pub struct AttendanceService {
    controller: SessionController,
    roster: Arc<PhotoRoster>,
    ledger: Arc<JsonLedger>,
}

impl AttendanceService {
    pub fn new(controller: SessionController, roster: Arc<PhotoRoster>, ledger: Arc<JsonLedger>) -> Self {
        Self {
            controller,
            roster,
            ledger,
        }
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Start a recognition session.
    async fn start_session(&self) -> zbus::fdo::Result<String> {
        tracing::info!("start_session requested");
        let controller = self.controller.clone();
        let started = run_blocking(move || controller.start()).await?;
        Ok(serde_json::json!({
            "success": true,
            "message": format!("session started with {} students", started.students_loaded),
            "sessionId": started.session_id,
            "startedAt": started.started_at,
            "studentsLoaded": started.students_loaded,
            "device": started.device,
        })
        .to_string())
    }

    /// Stop the running session and return the students it recognized.
    async fn stop_session(&self) -> zbus::fdo::Result<String> {
        tracing::info!("stop_session requested");
        let controller = self.controller.clone();
        let report = run_blocking(move || controller.stop()).await?;
        to_json(&report)
    }

    async fn session_status(&self) -> zbus::fdo::Result<String> {
        let mut status = serde_json::to_value(self.controller.status()).map_err(internal)?;
        status["version"] = env!("CARGO_PKG_VERSION").into();
        Ok(status.to_string())
    }

    /// Registered students in registration order.
    async fn list_students(&self) -> zbus::fdo::Result<String> {
        let roster = Arc::clone(&self.roster);
        let students = run_blocking(move || roster.entries()).await?;
        Ok(serde_json::json!({ "students": students }).to_string())
    }

    /// Copy a photo into the roster. Takes effect at the next session start.
    async fn register_student(&self, roll_number: &str, photo_path: &str) -> zbus::fdo::Result<String> {
        tracing::info!(roll = roll_number, photo = photo_path, "register_student requested");
        let roster = Arc::clone(&self.roster);
        let roll_number = roll_number.to_string();
        let photo = PathBuf::from(photo_path);
        let entry = run_blocking(move || roster.register(&roll_number, &photo)).await?;
        Ok(entry
            .image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    /// Remove every student. Attendance goes with them.
    async fn clear_students(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("clear_students requested");
        let roster = Arc::clone(&self.roster);
        let ledger = Arc::clone(&self.ledger);
        run_blocking(move || -> Result<(), zbus::fdo::Error> {
            roster.clear()?;
            ledger.clear()?;
            Ok(())
        })
        .await?;
        Ok(true)
    }

    /// Every attendance record on file.
    async fn attendance(&self) -> zbus::fdo::Result<String> {
        let ledger = Arc::clone(&self.ledger);
        let sheet = run_blocking(move || ledger.sheet()).await?;
        to_json(&sheet)
    }

    async fn clear_attendance(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("clear_attendance requested");
        let ledger = Arc::clone(&self.ledger);
        run_blocking(move || ledger.clear()).await?;
        Ok(true)
    }
}

/// Run controller or filesystem work off the async executor.
async fn run_blocking<T, E, F>(f: F) -> zbus::fdo::Result<T>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<zbus::fdo::Error> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(internal)?
        .map_err(Into::into)
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(internal)
}

fn internal(e: impl std::fmt::Display) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(format!("Internal: {e}"))
}

fn failed(kind: &str, e: impl std::fmt::Display) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(format!("{kind}: {e}"))
}

impl From<SessionError> for zbus::fdo::Error {
    fn from(e: SessionError) -> Self {
        tracing::warn!(kind = e.kind(), error = %e, "session request failed");
        failed(e.kind(), &e)
    }
}

impl From<RosterError> for zbus::fdo::Error {
    fn from(e: RosterError) -> Self {
        let kind = match e {
            RosterError::InvalidRollNumber(_) | RosterError::UnsupportedImage(_) => "InvalidArgument",
            RosterError::Io { .. } => "RosterError",
        };
        failed(kind, &e)
    }
}

impl From<LedgerError> for zbus::fdo::Error {
    fn from(e: LedgerError) -> Self {
        failed("LedgerError", &e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(e: zbus::fdo::Error) -> String {
        match e {
            zbus::fdo::Error::Failed(msg) => msg,
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn test_session_errors_carry_kind() {
        let msg = message(SessionError::NotActive.into());
        assert_eq!(msg, "NotActive: no recognition session is active");

        let msg = message(SessionError::DeviceLost("ENODEV".into()).into());
        assert!(msg.starts_with("DeviceLost: "));
    }

    #[test]
    fn test_roster_argument_errors() {
        let msg = message(RosterError::InvalidRollNumber("../x".into()).into());
        assert!(msg.starts_with("InvalidArgument: "));
    }
}
