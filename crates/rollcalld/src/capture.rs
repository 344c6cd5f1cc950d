//! The recognition loop run on the capture thread.
//!
//! Reads frames, encodes every face, matches each against the roster snapshot
//! and records first sightings of the day. The loop borrows the camera; it
//! never closes it, so the controller decides when the device is released.

use crate::ledger::{AttendanceLedger, AttendanceRecord, Clock, LedgerError};
use chrono::NaiveDate;
use rollcall_core::{FaceEncoder, FaceMatch, RosterMatcher, Student};
use rollcall_hw::{CaptureError, Frame, FrameSource};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Share of near-black pixels above which a frame is skipped.
const DARK_FRAME_PCT: f32 = 0.95;

/// Transient read failures are logged at warn level once per this many.
const TRANSIENT_WARN_EVERY: u32 = 50;

/// Tunables for one recognition session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub acceptance_threshold: f32,
    /// Pause between loop iterations.
    pub frame_interval: Duration,
    /// After a match, the same roll number is ignored for this long.
    pub cooldown: Duration,
    pub skip_dark_frames: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            acceptance_threshold: rollcall_core::DEFAULT_ACCEPTANCE_THRESHOLD,
            frame_interval: Duration::from_millis(100),
            cooldown: Duration::from_secs(5),
            skip_dark_frames: true,
        }
    }
}

/// Roll numbers already marked on one calendar day.
#[derive(Debug)]
pub struct MarkedToday {
    date: NaiveDate,
    rolls: HashSet<String>,
}

impl MarkedToday {
    /// Seed from the ledger's records for `date`.
    pub fn seed(ledger: &dyn AttendanceLedger, date: NaiveDate) -> Result<Self, LedgerError> {
        let rolls = ledger.list(date)?.into_iter().map(|r| r.roll_number).collect();
        Ok(Self { date, rolls })
    }

    /// Reseed when the clock has crossed into another day.
    fn roll_over(&mut self, date: NaiveDate, ledger: &dyn AttendanceLedger) {
        if date == self.date {
            return;
        }
        tracing::info!(from = %self.date, to = %date, "day changed; resetting marked set");
        *self = Self::seed(ledger, date).unwrap_or_else(|e| {
            tracing::warn!(error = %e, %date, "could not read ledger for new day");
            Self {
                date,
                rolls: HashSet::new(),
            }
        });
    }

    /// Returns `false` if the roll number was already present.
    fn insert(&mut self, roll_number: &str) -> bool {
        self.rolls.insert(roll_number.to_string())
    }

    /// Count records from an earlier session that are still waiting for
    /// the ledger. Records for other days are ignored.
    pub fn include(&mut self, pending: &[AttendanceRecord]) {
        for record in pending.iter().filter(|r| r.date() == self.date) {
            self.rolls.insert(record.roll_number.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.rolls.len()
    }
}

/// Why the loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Cancelled,
    DeviceLost(String),
}

/// What a finished loop hands back.
#[derive(Debug)]
pub struct LoopExit {
    pub reason: ExitReason,
    /// Records created this session, in the order they were made.
    pub records: Vec<AttendanceRecord>,
    /// Subset of `records` the ledger has not accepted yet.
    pub unpersisted: Vec<AttendanceRecord>,
}

pub struct CaptureLoop {
    session_id: Uuid,
    roster: Vec<Student>,
    matcher: RosterMatcher,
    encoder: Arc<Mutex<Box<dyn FaceEncoder>>>,
    ledger: Arc<dyn AttendanceLedger>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    marked: MarkedToday,
    cooldowns: HashMap<String, Instant>,
    records: Vec<AttendanceRecord>,
    unpersisted: Vec<AttendanceRecord>,
}

impl CaptureLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: Uuid,
        roster: Vec<Student>,
        encoder: Arc<Mutex<Box<dyn FaceEncoder>>>,
        ledger: Arc<dyn AttendanceLedger>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
        marked: MarkedToday,
    ) -> Self {
        Self {
            session_id,
            roster,
            matcher: RosterMatcher::new(settings.acceptance_threshold),
            encoder,
            ledger,
            clock,
            settings,
            marked,
            cooldowns: HashMap::new(),
            records: Vec::new(),
            unpersisted: Vec::new(),
        }
    }

    /// Run until `cancel` is raised or the camera disconnects.
    pub fn run(mut self, camera: &mut dyn FrameSource, cancel: &AtomicBool) -> LoopExit {
        tracing::info!(
            session = %self.session_id,
            device = camera.device(),
            students = self.roster.len(),
            already_marked = self.marked.len(),
            "capture loop started"
        );

        let mut failures: u32 = 0;
        let reason = loop {
            if cancel.load(Ordering::Acquire) {
                break ExitReason::Cancelled;
            }

            match camera.capture_frame() {
                Ok(frame) => {
                    if failures > 0 {
                        tracing::debug!(failures, "camera recovered");
                    }
                    failures = 0;
                    self.process_frame(&frame);
                }
                Err(CaptureError::Transient(msg)) => {
                    failures += 1;
                    if failures == 1 || failures % TRANSIENT_WARN_EVERY == 0 {
                        tracing::warn!(error = %msg, failures, "frame read failed");
                    } else {
                        tracing::debug!(error = %msg, failures, "frame read failed");
                    }
                }
                Err(CaptureError::Disconnected(msg)) => {
                    tracing::error!(session = %self.session_id, error = %msg, "camera disconnected");
                    break ExitReason::DeviceLost(msg);
                }
            }

            if !self.settings.frame_interval.is_zero() {
                std::thread::sleep(self.settings.frame_interval);
            }
        };

        tracing::info!(
            session = %self.session_id,
            recognized = self.records.len(),
            reason = ?reason,
            "capture loop finished"
        );
        LoopExit {
            reason,
            records: self.records,
            unpersisted: self.unpersisted,
        }
    }

    fn process_frame(&mut self, frame: &Frame) {
        if self.settings.skip_dark_frames && frame.is_dark(DARK_FRAME_PCT) {
            tracing::trace!(seq = frame.sequence, "dark frame skipped");
            return;
        }

        let probes = {
            let mut encoder = self.encoder.lock().unwrap_or_else(|e| e.into_inner());
            match encoder.encode(&frame.image) {
                Ok(probes) => probes,
                Err(e) => {
                    tracing::warn!(seq = frame.sequence, error = %e, "face encoding failed");
                    return;
                }
            }
        };

        let seen_at = Instant::now();
        for probe in &probes {
            let Some(found) = self.matcher.best_match(probe, &self.roster) else {
                continue;
            };
            if self.cooling_down(&found.roll_number, seen_at) {
                continue;
            }
            self.cooldowns.insert(found.roll_number.clone(), seen_at);
            self.mark(found);
        }
    }

    fn cooling_down(&self, roll_number: &str, now: Instant) -> bool {
        self.cooldowns
            .get(roll_number)
            .is_some_and(|last| now.duration_since(*last) < self.settings.cooldown)
    }

    fn mark(&mut self, found: FaceMatch) {
        let now = self.clock.now();
        self.marked.roll_over(now.date_naive(), self.ledger.as_ref());
        let roll_number = found.roll_number.to_uppercase();
        if !self.marked.insert(&roll_number) {
            tracing::debug!(roll = %roll_number, "already marked today");
            return;
        }

        let record = AttendanceRecord::new(roll_number, now);
        match self.ledger.append(&record) {
            Ok(true) => {
                tracing::info!(
                    session = %self.session_id,
                    roll = %record.roll_number,
                    distance = found.distance,
                    "attendance marked"
                );
                self.records.push(record);
            }
            Ok(false) => {
                tracing::debug!(roll = %record.roll_number, "ledger already holds a record for today");
            }
            Err(e) => {
                tracing::error!(roll = %record.roll_number, error = %e, "failed to persist attendance; will retry at stop");
                self.records.push(record.clone());
                self.unpersisted.push(record);
            }
        }
    }
}
