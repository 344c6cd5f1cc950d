use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{FaceEncoder, OnnxFaceEncoder, RosterMatcher, Student};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn start_session(&self) -> zbus::Result<String>;
    async fn stop_session(&self) -> zbus::Result<String>;
    async fn session_status(&self) -> zbus::Result<String>;
    async fn list_students(&self) -> zbus::Result<String>;
    async fn register_student(&self, roll_number: &str, photo_path: &str) -> zbus::Result<String>;
    async fn clear_students(&self) -> zbus::Result<bool>;
    async fn attendance(&self) -> zbus::Result<String>;
    async fn clear_attendance(&self) -> zbus::Result<bool>;
}

const PHOTO_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a recognition session
    Start,
    /// Stop the session and list who was recognized
    Stop,
    /// Show session state
    Status,
    /// List registered students
    Students,
    /// Register a student photo
    Register {
        /// Roll number of the student
        #[arg(short, long)]
        roll: String,
        /// Photo showing the student's face
        photo: PathBuf,
    },
    /// Remove all students and their attendance
    ClearStudents,
    /// Show recorded attendance
    Attendance,
    /// Remove all attendance records
    ClearAttendance,
    /// List video capture devices
    Cameras,
    /// Match a photo against a directory of student photos, without the daemon
    Identify {
        photo: PathBuf,
        /// Directory of `<rollNumber>.<ext>` photos
        #[arg(long)]
        students: PathBuf,
        /// Directory containing the ONNX models
        #[arg(long)]
        models: Option<PathBuf>,
        /// Maximum cosine distance for a match
        #[arg(long, default_value_t = rollcall_core::DEFAULT_ACCEPTANCE_THRESHOLD)]
        threshold: f32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let system = cli.system;

    match cli.command {
        Commands::Cameras => list_cameras(),
        Commands::Identify {
            photo,
            students,
            models,
            threshold,
        } => {
            let models = models.unwrap_or_else(rollcall_core::default_model_dir);
            identify(&photo, &students, &models, threshold)?;
        }
        command => run_remote(command, system).await?,
    }

    Ok(())
}

/// Commands served by rollcalld over D-Bus.
async fn run_remote(command: Commands, system: bool) -> Result<()> {
    let conn = if system {
        zbus::Connection::system().await?
    } else {
        zbus::Connection::session().await?
    };
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("rollcalld is not reachable on the bus")?;

    match command {
        Commands::Start => {
            let reply = parse(&proxy.start_session().await?)?;
            println!("{}", reply["message"].as_str().unwrap_or("session started"));
            if let Some(id) = reply["sessionId"].as_str() {
                println!("session: {id}");
            }
        }
        Commands::Stop => {
            let report = parse(&proxy.stop_session().await?)?;
            let records = records(&report);
            println!("Session stopped; {} student(s) recognized", records.len());
            print_records(records);
        }
        Commands::Status => {
            let status = parse(&proxy.session_status().await?)?;
            println!("state:    {}", status["state"].as_str().unwrap_or("unknown"));
            for (label, key) in [
                ("session:  ", "sessionId"),
                ("started:  ", "startedAt"),
                ("device:   ", "device"),
                ("error:    ", "lastError"),
            ] {
                if let Some(v) = status[key].as_str() {
                    println!("{label}{v}");
                }
            }
            if let Some(n) = status["studentsLoaded"].as_u64() {
                println!("students: {n}");
            }
        }
        Commands::Students => {
            let listing = parse(&proxy.list_students().await?)?;
            let students = listing["students"].as_array().cloned().unwrap_or_default();
            if students.is_empty() {
                println!("No students registered");
            }
            for s in &students {
                println!(
                    "{:<12} {}",
                    s["rollNo"].as_str().unwrap_or("?"),
                    s["image"].as_str().unwrap_or("")
                );
            }
        }
        Commands::Register { roll, photo } => {
            let photo = std::fs::canonicalize(&photo)
                .with_context(|| format!("cannot access {}", photo.display()))?;
            let stored = proxy
                .register_student(&roll, &photo.to_string_lossy())
                .await?;
            println!("Registered {roll} as {stored}");
        }
        Commands::ClearStudents => {
            proxy.clear_students().await?;
            println!("All students and attendance removed");
        }
        Commands::Attendance => {
            let sheet = parse(&proxy.attendance().await?)?;
            let records = records(&sheet);
            if records.is_empty() {
                println!("No attendance recorded");
            }
            print_records(records);
        }
        Commands::ClearAttendance => {
            proxy.clear_attendance().await?;
            println!("Attendance cleared");
        }
        Commands::Cameras | Commands::Identify { .. } => unreachable!("runs locally"),
    }

    Ok(())
}

fn parse(json: &str) -> Result<Value> {
    serde_json::from_str(json).context("daemon returned malformed JSON")
}

fn records(doc: &Value) -> &[Value] {
    doc["recognizedStudents"].as_array().map(Vec::as_slice).unwrap_or(&[])
}

fn print_records(records: &[Value]) {
    for r in records {
        println!(
            "{:<28} {}",
            r["timestamp"].as_str().unwrap_or("?"),
            r["rollNo"].as_str().unwrap_or("?")
        );
    }
}

fn list_cameras() {
    let devices = rollcall_hw::V4lCamera::list_devices();
    if devices.is_empty() {
        println!("No video capture devices found");
        return;
    }
    for d in devices {
        println!("{}  {} ({})", d.path, d.name, d.driver);
    }
}

/// Encode `photo` and report the closest registered student.
fn identify(photo: &Path, students_dir: &Path, models: &Path, threshold: f32) -> Result<()> {
    let mut encoder = OnnxFaceEncoder::load(models, 8)
        .with_context(|| format!("loading models from {}", models.display()))?;

    let image = image::open(photo)
        .with_context(|| format!("cannot decode {}", photo.display()))?
        .to_rgb8();
    let faces = encoder.encode(&image)?;
    if faces.is_empty() {
        bail!("no face found in {}", photo.display());
    }
    println!("{} face(s) in {}", faces.len(), photo.display());

    let roster = load_students(students_dir, &mut encoder)?;
    if roster.is_empty() {
        bail!("no usable student photos in {}", students_dir.display());
    }

    let matcher = RosterMatcher::new(threshold);
    for (i, face) in faces.iter().enumerate() {
        match matcher.best_match(face, &roster) {
            Some(m) => println!("face {}: {} (distance {:.3})", i + 1, m.roll_number, m.distance),
            None => println!("face {}: no match below {threshold}", i + 1),
        }
    }
    if let Some(best) = matcher.match_frame(&faces, &roster) {
        println!("best: {} (distance {:.3})", best.roll_number, best.distance);
    }
    Ok(())
}

/// Student photos in registration order: modification time, then path.
fn load_students(dir: &Path, encoder: &mut dyn FaceEncoder) -> Result<Vec<Student>> {
    let mut photos = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))? {
        let path = entry?.path();
        let is_photo = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| PHOTO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if !is_photo {
            continue;
        }
        let modified = std::fs::metadata(&path)?.modified()?;
        photos.push((modified, path));
    }
    photos.sort();

    let mut students = Vec::new();
    for (_, path) in photos {
        let Some(roll) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        let image = match image::open(&path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping undecodable photo");
                continue;
            }
        };
        match encoder.encode_primary(&image) {
            Ok(Some(encoding)) => students.push(Student::new(roll, vec![encoding])),
            Ok(None) => tracing::warn!(path = %path.display(), "no face in student photo"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping photo that failed to encode"),
        }
    }
    Ok(students)
}
