//! Recognition session controller.
//!
//! At most one session runs at a time. The capture loop runs on its own OS
//! thread and owns the camera while it runs; the controller holds a small
//! state machine behind a mutex that is never held across camera, encoder or
//! ledger work. Records the ledger refused wait in a backlog that outlives
//! the session and is retried at every stop and start.

use crate::capture::{CaptureLoop, ExitReason, LoopExit, MarkedToday, SessionSettings};
use crate::ledger::{AttendanceLedger, AttendanceRecord, Clock, LedgerError};
use crate::roster::{RosterError, RosterSource};
use chrono::{DateTime, FixedOffset};
use rollcall_core::FaceEncoder;
use rollcall_hw::{CameraError, CameraProvider, FrameSource};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a recognition session is already active")]
    AlreadyActive,
    #[error("no recognition session is active")]
    NotActive,
    #[error("session is {0}; try again")]
    Busy(&'static str),
    #[error("camera unavailable: {0}")]
    CameraUnavailable(#[from] CameraError),
    #[error("camera lost during session: {0}")]
    DeviceLost(String),
    #[error("no registered student has a usable face photo")]
    NoStudents,
    #[error("roster: {0}")]
    Roster(#[from] RosterError),
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("capture worker failed: {0}")]
    WorkerFailed(String),
}

impl SessionError {
    /// Stable name for the error, used as the prefix of D-Bus error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyActive => "AlreadyActive",
            Self::NotActive => "NotActive",
            Self::Busy(_) => "Busy",
            Self::CameraUnavailable(_) => "CameraUnavailable",
            Self::DeviceLost(_) => "DeviceLost",
            Self::NoStudents => "NoStudents",
            Self::Roster(_) => "RosterError",
            Self::Ledger(_) => "LedgerError",
            Self::WorkerFailed(_) => "WorkerFailed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Snapshot returned by [`SessionController::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: SessionState,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub students_loaded: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Set after the camera was lost, until the next stop or start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    pub session_id: Uuid,
    pub started_at: DateTime<FixedOffset>,
    pub students_loaded: usize,
    pub device: String,
}

/// Result of a stopped session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: Uuid,
    pub started_at: DateTime<FixedOffset>,
    pub stopped_at: DateTime<FixedOffset>,
    pub recognized_students: Vec<AttendanceRecord>,
}

/// Everything the controller talks to.
pub struct Collaborators {
    pub roster: Arc<dyn RosterSource>,
    pub ledger: Arc<dyn AttendanceLedger>,
    pub cameras: Arc<dyn CameraProvider>,
    pub encoder: Arc<Mutex<Box<dyn FaceEncoder>>>,
    pub clock: Arc<dyn Clock>,
}

struct ActiveSession {
    id: Uuid,
    started_at: DateTime<FixedOffset>,
    students: usize,
    device: String,
    cancel: Arc<AtomicBool>,
    worker: JoinHandle<Option<WorkerExit>>,
}

enum Phase {
    Idle { lost: Option<String> },
    Starting,
    Running(ActiveSession),
    Stopping { id: Uuid, started_at: DateTime<FixedOffset> },
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Idle { .. } => SessionState::Idle,
            Phase::Starting => SessionState::Starting,
            Phase::Running(_) => SessionState::Running,
            Phase::Stopping { .. } => SessionState::Stopping,
        }
    }
}

/// Handed from the capture thread to whoever joins it.
struct WorkerExit {
    camera: Option<Box<dyn FrameSource>>,
    exit: LoopExit,
}

/// Everything gathered before the capture thread can start.
struct Prepared {
    loop_: CaptureLoop,
    camera: Box<dyn FrameSource>,
    students: usize,
}

struct Inner {
    phase: Mutex<Phase>,
    backlog: Mutex<Vec<AttendanceRecord>>,
    deps: Collaborators,
    settings: SessionSettings,
}

impl Inner {
    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Retry records the ledger refused earlier. Returns those still failing.
    fn flush(&self, pending: Vec<AttendanceRecord>) -> Vec<AttendanceRecord> {
        pending
            .into_iter()
            .filter(|record| match self.deps.ledger.append(record) {
                Ok(_) => false,
                Err(e) => {
                    tracing::error!(roll = %record.roll_number, error = %e, "attendance still not persisted");
                    true
                }
            })
            .collect()
    }

    fn backlog(&self) -> MutexGuard<'_, Vec<AttendanceRecord>> {
        self.backlog.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn defer(&self, records: Vec<AttendanceRecord>) {
        if !records.is_empty() {
            tracing::warn!(count = records.len(), "attendance queued until the ledger recovers");
            self.backlog().extend(records);
        }
    }

    /// Retry the backlog. Returns the records still waiting.
    ///
    /// The backlog lock is held across the retry so a concurrent start
    /// cannot seed its marked set while records are in flight.
    fn retry_backlog(&self) -> Vec<AttendanceRecord> {
        let mut backlog = self.backlog();
        if backlog.is_empty() {
            return Vec::new();
        }
        let pending = std::mem::take(&mut *backlog);
        *backlog = self.flush(pending);
        backlog.clone()
    }
}

/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(deps: Collaborators, settings: SessionSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                phase: Mutex::new(Phase::Idle { lost: None }),
                backlog: Mutex::new(Vec::new()),
                deps,
                settings,
            }),
        }
    }

    /// Begin a session: snapshot the roster, open the camera and start the
    /// capture thread. Blocks while encodings are computed.
    pub fn start(&self) -> Result<SessionStarted, SessionError> {
        {
            let mut phase = self.inner.phase();
            match &mut *phase {
                Phase::Idle { lost } => {
                    if let Some(reason) = lost.take() {
                        tracing::debug!(%reason, "discarding unreported camera loss");
                    }
                }
                _ => return Err(SessionError::AlreadyActive),
            }
            *phase = Phase::Starting;
        }

        let id = Uuid::new_v4();
        let prepared = match self.prepare(id) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "session start failed");
                *self.inner.phase() = Phase::Idle { lost: None };
                return Err(e);
            }
        };

        let started_at = self.inner.deps.clock.now();
        let students = prepared.students;
        let device = prepared.camera.device().to_string();
        let cancel = Arc::new(AtomicBool::new(false));

        // Spawn under the lock so the worker cannot observe `Starting`.
        let mut phase = self.inner.phase();
        let worker = {
            let inner = Arc::clone(&self.inner);
            let cancel = Arc::clone(&cancel);
            let Prepared { loop_, camera, .. } = prepared;
            std::thread::Builder::new()
                .name("rollcall-capture".into())
                .spawn(move || run_worker(inner, id, loop_, camera, cancel))
        };
        let worker = match worker {
            Ok(handle) => handle,
            Err(e) => {
                *phase = Phase::Idle { lost: None };
                return Err(SessionError::WorkerFailed(format!("spawn: {e}")));
            }
        };

        *phase = Phase::Running(ActiveSession {
            id,
            started_at,
            students,
            device: device.clone(),
            cancel,
            worker,
        });
        drop(phase);

        tracing::info!(session = %id, students, %device, "session started");
        Ok(SessionStarted {
            session_id: id,
            started_at,
            students_loaded: students,
            device,
        })
    }

    fn prepare(&self, id: Uuid) -> Result<Prepared, SessionError> {
        let deps = &self.inner.deps;

        let roster = {
            let mut encoder = deps.encoder.lock().unwrap_or_else(|e| e.into_inner());
            deps.roster.students(&mut **encoder)?
        };
        if roster.is_empty() {
            return Err(SessionError::NoStudents);
        }
        let students = roster.len();

        let camera = deps.cameras.open()?;
        tracing::info!(device = camera.device(), "camera opened");

        let pending = self.inner.retry_backlog();
        let mut marked = MarkedToday::seed(deps.ledger.as_ref(), deps.clock.today())?;
        marked.include(&pending);

        let loop_ = CaptureLoop::new(
            id,
            roster,
            Arc::clone(&deps.encoder),
            Arc::clone(&deps.ledger),
            Arc::clone(&deps.clock),
            self.inner.settings.clone(),
            marked,
        );
        Ok(Prepared {
            loop_,
            camera,
            students,
        })
    }

    /// End the running session. Returns once the capture thread has exited
    /// and the camera is closed.
    ///
    /// If the camera was lost since the last call, the loss is reported here
    /// once as [`SessionError::DeviceLost`].
    pub fn stop(&self) -> Result<SessionReport, SessionError> {
        let active = {
            let mut phase = self.inner.phase();
            match std::mem::replace(&mut *phase, Phase::Idle { lost: None }) {
                Phase::Running(active) => {
                    *phase = Phase::Stopping {
                        id: active.id,
                        started_at: active.started_at,
                    };
                    active
                }
                Phase::Idle { lost: Some(reason) } => {
                    drop(phase);
                    self.inner.retry_backlog();
                    return Err(SessionError::DeviceLost(reason));
                }
                Phase::Idle { lost: None } => return Err(SessionError::NotActive),
                other => {
                    let busy = match other.state() {
                        SessionState::Starting => "starting",
                        _ => "stopping",
                    };
                    *phase = other;
                    return Err(SessionError::Busy(busy));
                }
            }
        };

        tracing::info!(session = %active.id, "stopping session");
        active.cancel.store(true, Ordering::Release);
        let joined = active.worker.join();
        let stopped_at = self.inner.deps.clock.now();

        let result = match joined {
            Ok(Some(WorkerExit { camera, exit })) => {
                drop(camera);
                if let ExitReason::DeviceLost(reason) = &exit.reason {
                    tracing::warn!(session = %active.id, %reason, "camera was lost while stopping");
                }
                self.inner.defer(exit.unpersisted);
                let waiting = self.inner.retry_backlog();
                if !waiting.is_empty() {
                    tracing::error!(count = waiting.len(), "records missing from ledger after stop");
                }
                tracing::info!(
                    session = %active.id,
                    recognized = exit.records.len(),
                    "session stopped"
                );
                Ok(SessionReport {
                    session_id: active.id,
                    started_at: active.started_at,
                    stopped_at,
                    recognized_students: exit.records,
                })
            }
            // The worker only keeps its result when a stop is waiting for it.
            Ok(None) => Err(SessionError::DeviceLost("session ended before stop".into())),
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".into());
                tracing::error!(session = %active.id, error = %msg, "capture thread panicked");
                Err(SessionError::WorkerFailed(msg))
            }
        };

        *self.inner.phase() = Phase::Idle { lost: None };
        result
    }

    /// Current state. Never waits on the capture thread.
    pub fn status(&self) -> SessionStatus {
        let phase = self.inner.phase();
        let state = phase.state();
        let mut status = SessionStatus {
            state,
            active: state == SessionState::Running,
            session_id: None,
            started_at: None,
            students_loaded: None,
            device: None,
            last_error: None,
        };
        match &*phase {
            Phase::Idle { lost } => status.last_error = lost.clone(),
            Phase::Starting => {}
            Phase::Running(active) => {
                status.session_id = Some(active.id);
                status.started_at = Some(active.started_at);
                status.students_loaded = Some(active.students);
                status.device = Some(active.device.clone());
            }
            Phase::Stopping { id, started_at } => {
                status.session_id = Some(*id);
                status.started_at = Some(*started_at);
            }
        }
        status
    }

    pub fn is_running(&self) -> bool {
        matches!(&*self.inner.phase(), Phase::Running(_))
    }
}

/// Body of the capture thread.
///
/// On cancellation the camera is handed back to `stop`. On device loss the
/// thread releases the camera, queues unpersisted records in the backlog
/// and, unless a stop is already waiting, moves the controller to idle.
fn run_worker(
    inner: Arc<Inner>,
    id: Uuid,
    capture: CaptureLoop,
    mut camera: Box<dyn FrameSource>,
    cancel: Arc<AtomicBool>,
) -> Option<WorkerExit> {
    let mut exit = capture.run(camera.as_mut(), &cancel);

    let reason = match exit.reason.clone() {
        ExitReason::Cancelled => {
            return Some(WorkerExit {
                camera: Some(camera),
                exit,
            })
        }
        ExitReason::DeviceLost(reason) => reason,
    };

    drop(camera);
    inner.defer(std::mem::take(&mut exit.unpersisted));
    inner.retry_backlog();

    let mut phase = inner.phase();
    if matches!(&*phase, Phase::Running(active) if active.id == id) {
        tracing::warn!(
            session = %id,
            recognized = exit.records.len(),
            %reason,
            "session ended by camera loss"
        );
        // Dropping the active session detaches this thread's own handle.
        *phase = Phase::Idle { lost: Some(reason) };
        None
    } else {
        Some(WorkerExit { camera: None, exit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    struct Harness {
        controller: SessionController,
        cameras: Arc<FakeProvider>,
        ledger: Arc<MemoryLedger>,
        clock: Arc<StepClock>,
    }

    fn harness_with(cameras: FakeProvider, ledger: MemoryLedger, students: Vec<rollcall_core::Student>) -> Harness {
        let cameras = Arc::new(cameras);
        let ledger = Arc::new(ledger);
        let clock = Arc::new(StepClock::new("2026-10-19T09:00:00+02:00", ChronoDuration::seconds(1)));
        let encoder: Box<dyn FaceEncoder> = Box::new(PixelEncoder);
        let controller = SessionController::new(
            Collaborators {
                roster: Arc::new(FixedRoster(students)),
                ledger: Arc::clone(&ledger) as Arc<dyn AttendanceLedger>,
                cameras: Arc::clone(&cameras) as Arc<dyn CameraProvider>,
                encoder: Arc::new(Mutex::new(encoder)),
                clock: Arc::clone(&clock) as Arc<dyn Clock>,
            },
            SessionSettings {
                frame_interval: Duration::from_millis(1),
                cooldown: Duration::ZERO,
                skip_dark_frames: false,
                ..SessionSettings::default()
            },
        );
        Harness {
            controller,
            cameras,
            ledger,
            clock,
        }
    }

    fn harness(scripts: Vec<Vec<Step>>) -> Harness {
        harness_with(
            FakeProvider::new(scripts),
            MemoryLedger::default(),
            vec![student("A1", 1), student("B2", 2)],
        )
    }

    #[test]
    fn test_stop_when_idle() {
        let h = harness(vec![]);
        assert!(matches!(h.controller.stop(), Err(SessionError::NotActive)));
        let status = h.controller.status();
        assert_eq!(status.state, SessionState::Idle);
        assert!(!status.active);
    }

    #[test]
    fn test_start_stop_reports_first_sightings() {
        let h = harness(vec![vec![Step::Face(1), Step::Face(1), Step::Face(2), Step::Face(0)]]);

        let started = h.controller.start().unwrap();
        assert_eq!(started.students_loaded, 2);
        let status = h.controller.status();
        assert!(status.active);
        assert_eq!(status.session_id, Some(started.session_id));

        h.cameras.wait_script_consumed();
        let report = h.controller.stop().unwrap();

        assert_eq!(report.session_id, started.session_id);
        let rolls: Vec<_> = report.recognized_students.iter().map(|r| r.roll_number.as_str()).collect();
        assert_eq!(rolls, vec!["A1", "B2"]);
        // Clock readings: seed, start time, A1, A1 again, B2.
        assert_eq!(report.recognized_students[0].timestamp, h.clock.at(2));
        assert_eq!(report.recognized_students[1].timestamp, h.clock.at(4));
        assert_eq!(h.ledger.snapshot(), report.recognized_students);

        assert_eq!(h.cameras.open_count(), 0);
        assert_eq!(h.controller.status().state, SessionState::Idle);
    }

    #[test]
    fn test_second_start_rejected() {
        let h = harness(vec![vec![]]);
        h.controller.start().unwrap();
        assert!(matches!(h.controller.start(), Err(SessionError::AlreadyActive)));
        h.controller.stop().unwrap();
    }

    #[test]
    fn test_restart_immediately_after_stop() {
        let h = harness(vec![vec![Step::Face(1), Step::Face(0)], vec![Step::Face(2), Step::Face(0)]]);

        h.controller.start().unwrap();
        h.cameras.wait_script_consumed();
        let first = h.controller.stop().unwrap();
        assert_eq!(h.cameras.open_count(), 0);

        h.controller.start().unwrap();
        h.cameras.wait_script_consumed();
        let second = h.controller.stop().unwrap();

        assert_eq!(first.recognized_students[0].roll_number, "A1");
        assert_eq!(second.recognized_students[0].roll_number, "B2");
        assert_eq!(h.cameras.opened_total.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_camera_unavailable_stays_idle() {
        let h = harness_with(
            FakeProvider::unavailable(),
            MemoryLedger::default(),
            vec![student("A1", 1)],
        );
        assert!(matches!(h.controller.start(), Err(SessionError::CameraUnavailable(_))));
        assert_eq!(h.controller.status().state, SessionState::Idle);
        assert!(matches!(h.controller.stop(), Err(SessionError::NotActive)));
    }

    #[test]
    fn test_empty_roster_rejected() {
        let h = harness_with(FakeProvider::new(vec![vec![]]), MemoryLedger::default(), vec![]);
        assert!(matches!(h.controller.start(), Err(SessionError::NoStudents)));
        assert_eq!(h.cameras.opened_total.load(Ordering::SeqCst), 0);
        assert_eq!(h.controller.status().state, SessionState::Idle);
    }

    #[test]
    fn test_device_loss_forces_idle() {
        let h = harness(vec![vec![Step::Face(1), Step::Disconnect]]);
        h.controller.start().unwrap();

        wait_until(|| h.controller.status().state == SessionState::Idle);
        let status = h.controller.status();
        assert!(!status.active);
        assert_eq!(status.last_error.as_deref(), Some("ENODEV"));
        assert_eq!(h.cameras.open_count(), 0);
        // Record made before the loss is kept.
        assert_eq!(h.ledger.snapshot().len(), 1);

        assert!(matches!(h.controller.stop(), Err(SessionError::DeviceLost(_))));
        assert!(matches!(h.controller.stop(), Err(SessionError::NotActive)));
        assert!(h.controller.status().last_error.is_none());
    }

    #[test]
    fn test_start_after_device_loss() {
        let h = harness(vec![vec![Step::Disconnect], vec![Step::Face(2), Step::Face(0)]]);
        h.controller.start().unwrap();
        wait_until(|| h.controller.status().state == SessionState::Idle);

        h.controller.start().unwrap();
        h.cameras.wait_script_consumed();
        let report = h.controller.stop().unwrap();
        assert_eq!(report.recognized_students.len(), 1);
    }

    #[test]
    fn test_marked_earlier_today_not_repeated() {
        let earlier = AttendanceRecord::new(
            "A1",
            DateTime::parse_from_rfc3339("2026-10-19T08:00:00+02:00").unwrap(),
        );
        let h = harness_with(
            FakeProvider::new(vec![vec![Step::Face(1), Step::Face(2), Step::Face(0)]]),
            MemoryLedger::with(vec![earlier]),
            vec![student("A1", 1), student("B2", 2)],
        );

        h.controller.start().unwrap();
        h.cameras.wait_script_consumed();
        let report = h.controller.stop().unwrap();
        let rolls: Vec<_> = report.recognized_students.iter().map(|r| r.roll_number.as_str()).collect();
        assert_eq!(rolls, vec!["B2"]);
        assert_eq!(h.ledger.snapshot().len(), 2);
    }

    #[test]
    fn test_unpersisted_records_retried_on_stop() {
        let h = harness(vec![vec![Step::Face(1), Step::Face(0)]]);
        h.ledger.failing.store(true, Ordering::SeqCst);

        h.controller.start().unwrap();
        h.cameras.wait_script_consumed();
        assert!(h.ledger.snapshot().is_empty());
        h.ledger.failing.store(false, Ordering::SeqCst);

        let report = h.controller.stop().unwrap();
        assert_eq!(report.recognized_students.len(), 1);
        assert_eq!(h.ledger.snapshot(), report.recognized_students);
    }

    #[test]
    fn test_records_survive_device_loss_with_failing_ledger() {
        let h = harness(vec![vec![Step::Face(1), Step::Disconnect], vec![Step::Face(1), Step::Face(0)]]);
        h.ledger.failing.store(true, Ordering::SeqCst);

        h.controller.start().unwrap();
        wait_until(|| h.controller.status().state == SessionState::Idle);
        assert!(h.ledger.snapshot().is_empty());
        h.ledger.failing.store(false, Ordering::SeqCst);

        h.controller.start().unwrap();
        h.cameras.wait_script_consumed();
        let report = h.controller.stop().unwrap();

        assert!(report.recognized_students.is_empty());
        let ledger = h.ledger.snapshot();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].roll_number, "A1");
        assert_eq!(ledger[0].timestamp, h.clock.at(2));
    }

    #[test]
    fn test_device_loss_report_flushes_backlog() {
        let h = harness(vec![vec![Step::Face(1), Step::Disconnect]]);
        h.ledger.failing.store(true, Ordering::SeqCst);

        h.controller.start().unwrap();
        wait_until(|| h.controller.status().state == SessionState::Idle);
        h.ledger.failing.store(false, Ordering::SeqCst);

        assert!(matches!(h.controller.stop(), Err(SessionError::DeviceLost(_))));
        let ledger = h.ledger.snapshot();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].timestamp, h.clock.at(2));
    }

    #[test]
    fn test_backlog_kept_while_ledger_fails() {
        let h = harness(vec![vec![Step::Face(1), Step::Face(0)]]);
        h.ledger.failing.store(true, Ordering::SeqCst);

        h.controller.start().unwrap();
        h.cameras.wait_script_consumed();
        let report = h.controller.stop().unwrap();
        assert_eq!(report.recognized_students.len(), 1);
        assert!(h.ledger.snapshot().is_empty());
        assert_eq!(h.controller.inner.backlog().len(), 1);

        h.ledger.failing.store(false, Ordering::SeqCst);
        assert!(h.controller.inner.retry_backlog().is_empty());
        assert_eq!(h.ledger.snapshot(), report.recognized_students);
    }

    #[test]
    fn test_status_serialization() {
        let h = harness(vec![]);
        let json = serde_json::to_value(h.controller.status()).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["active"], false);
        assert!(json.get("sessionId").is_none());
    }
}
