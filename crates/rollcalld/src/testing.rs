//! In-memory collaborators for controller and capture loop tests.

use crate::ledger::{AttendanceLedger, AttendanceRecord, Clock, LedgerError};
use crate::roster::{RosterError, RosterSource};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate};
use image::{Rgb, RgbImage};
use rollcall_core::{EncoderError, Embedding, FaceEncoder, Student};
use rollcall_hw::{CameraError, CameraProvider, CaptureError, Frame, FrameSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// What the scripted camera yields on each read.
#[derive(Debug, Clone)]
pub enum Step {
    /// A frame showing the student with this face id (1-based; 0 = nobody).
    Face(u8),
    Transient,
    Disconnect,
}

/// Encoding used for face id `n`: a unit vector on axis `n - 1`.
pub fn face_encoding(n: u8) -> Embedding {
    let mut values = vec![0.0; 4];
    values[(n - 1) as usize] = 1.0;
    Embedding::new(values)
}

pub fn student(roll: &str, face: u8) -> Student {
    Student::new(roll, vec![face_encoding(face)])
}

/// Reads the face id from the red channel of pixel (0, 0).
pub struct PixelEncoder;

impl FaceEncoder for PixelEncoder {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, EncoderError> {
        let id = image.get_pixel(0, 0).0[0];
        Ok(if id == 0 { vec![] } else { vec![face_encoding(id)] })
    }
}

pub struct ScriptedCamera {
    steps: VecDeque<Step>,
    open: Arc<AtomicUsize>,
    /// Raised once the script runs out; used to end loops run inline.
    done: Option<Arc<AtomicBool>>,
    remaining: Arc<AtomicUsize>,
}

impl ScriptedCamera {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            remaining: Arc::new(AtomicUsize::new(steps.len())),
            steps: steps.into(),
            open: Arc::new(AtomicUsize::new(1)),
            done: None,
        }
    }

    pub fn cancel_when_done(mut self, flag: Arc<AtomicBool>) -> Self {
        self.done = Some(flag);
        self
    }
}

impl FrameSource for ScriptedCamera {
    fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        let step = self.steps.pop_front();
        self.remaining.store(self.steps.len(), Ordering::SeqCst);
        if self.steps.is_empty() {
            if let Some(flag) = &self.done {
                flag.store(true, Ordering::SeqCst);
            }
        }
        match step.unwrap_or(Step::Face(0)) {
            Step::Face(id) => Ok(Frame::new(RgbImage::from_pixel(2, 2, Rgb([id, 0, 0])), 0)),
            Step::Transient => Err(CaptureError::Transient("bad frame".into())),
            Step::Disconnect => Err(CaptureError::Disconnected("ENODEV".into())),
        }
    }

    fn device(&self) -> &str {
        "/dev/video-fake"
    }
}

impl Drop for ScriptedCamera {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Hands out scripted cameras and tracks how many are open.
pub struct FakeProvider {
    pub available: AtomicBool,
    pub open: Arc<AtomicUsize>,
    pub opened_total: AtomicUsize,
    pub remaining: Arc<AtomicUsize>,
    scripts: Mutex<VecDeque<Vec<Step>>>,
}

impl FakeProvider {
    pub fn new(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            available: AtomicBool::new(true),
            open: Arc::new(AtomicUsize::new(0)),
            opened_total: AtomicUsize::new(0),
            remaining: Arc::new(AtomicUsize::new(0)),
            scripts: Mutex::new(scripts.into()),
        }
    }

    pub fn unavailable() -> Self {
        let p = Self::new(vec![]);
        p.available.store(false, Ordering::SeqCst);
        p
    }

    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Wait until the current camera has consumed its script.
    pub fn wait_script_consumed(&self) {
        wait_until(|| self.remaining.load(Ordering::SeqCst) == 0);
    }
}

impl CameraProvider for FakeProvider {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CameraError::NoDeviceAvailable);
        }
        if self.open.load(Ordering::SeqCst) > 0 {
            return Err(CameraError::DeviceBusy("/dev/video-fake".into()));
        }
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let mut camera = ScriptedCamera::new(script);
        camera.open = Arc::clone(&self.open);
        camera.remaining = Arc::clone(&self.remaining);
        camera.remaining.store(camera.steps.len(), Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(camera))
    }
}

pub struct FixedRoster(pub Vec<Student>);

impl RosterSource for FixedRoster {
    fn students(&self, _encoder: &mut dyn FaceEncoder) -> Result<Vec<Student>, RosterError> {
        Ok(self.0.clone())
    }
}

/// Ledger in memory; can be told to fail appends.
#[derive(Default)]
pub struct MemoryLedger {
    pub records: Mutex<Vec<AttendanceRecord>>,
    pub failing: AtomicBool,
}

impl MemoryLedger {
    pub fn with(records: Vec<AttendanceRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            failing: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> Vec<AttendanceRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AttendanceLedger for MemoryLedger {
    fn append(&self, record: &AttendanceRecord) -> Result<bool, LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Io {
                path: "memory".into(),
                source: std::io::Error::other("disk full"),
            });
        }
        let mut records = self.records.lock().unwrap();
        if records
            .iter()
            .any(|r| r.roll_number == record.roll_number && r.date() == record.date())
        {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    fn list(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.date() == date)
            .cloned()
            .collect())
    }
}

/// Advances by `step` on every reading, starting at `start`.
pub struct StepClock {
    start: DateTime<FixedOffset>,
    step: ChronoDuration,
    ticks: AtomicUsize,
}

impl StepClock {
    pub fn new(start: &str, step: ChronoDuration) -> Self {
        Self {
            start: DateTime::parse_from_rfc3339(start).unwrap(),
            step,
            ticks: AtomicUsize::new(0),
        }
    }

    pub fn at(&self, tick: i32) -> DateTime<FixedOffset> {
        self.start + self.step * tick
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) as i32;
        self.at(tick)
    }
}

pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached within 5s");
        std::thread::sleep(Duration::from_millis(2));
    }
}
