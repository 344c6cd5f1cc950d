//! Student roster backed by a directory of registration photos.
//!
//! Each photo is named `<rollNumber>.<ext>`. Registration order is photo
//! modification time, oldest first. Reference encodings are cached in a JSON
//! file keyed by the SHA-256 of the photo bytes.

use rollcall_core::{Embedding, FaceEncoder, Student};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("roster I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid roll number {0:?}")]
    InvalidRollNumber(String),
    #[error("unsupported image type: {0} (expected png, jpg, jpeg, gif or bmp)")]
    UnsupportedImage(String),
}

/// A registered photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    #[serde(rename = "rollNo")]
    pub roll_number: String,
    #[serde(rename = "image")]
    pub image_path: PathBuf,
}

/// Source of the students eligible for recognition.
pub trait RosterSource: Send + Sync {
    /// Registered students with their reference encodings, in registration
    /// order. Students whose photo yields no face are left out.
    fn students(&self, encoder: &mut dyn FaceEncoder) -> Result<Vec<Student>, RosterError>;
}

pub struct PhotoRoster {
    dir: PathBuf,
    cache_path: PathBuf,
}

impl PhotoRoster {
    pub fn new(dir: impl Into<PathBuf>, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache_path: cache_path.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Registered photos in registration order.
    pub fn entries(&self) -> Result<Vec<RosterEntry>, RosterError> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_error(&self.dir, source)),
        };

        let mut found: Vec<(SystemTime, RosterEntry)> = Vec::new();
        for dirent in read_dir {
            let dirent = dirent.map_err(|source| self.io_error(&self.dir, source))?;
            let path = dirent.path();
            if !path.is_file() || image_extension(&path).is_none() {
                continue;
            }
            let Some(roll_number) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = dirent
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((
                modified,
                RosterEntry {
                    roll_number: roll_number.to_string(),
                    image_path: path.clone(),
                },
            ));
        }

        found.sort_by(|(ta, a), (tb, b)| ta.cmp(tb).then_with(|| a.image_path.cmp(&b.image_path)));
        Ok(found.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Store `photo` as the registration photo for `roll_number`, replacing
    /// any earlier photo of that student.
    pub fn register(&self, roll_number: &str, photo: &Path) -> Result<RosterEntry, RosterError> {
        validate_roll_number(roll_number)?;
        let ext = image_extension(photo)
            .ok_or_else(|| RosterError::UnsupportedImage(photo.display().to_string()))?;

        std::fs::create_dir_all(&self.dir).map_err(|source| self.io_error(&self.dir, source))?;
        for existing in self.entries()? {
            if existing.roll_number == roll_number {
                std::fs::remove_file(&existing.image_path)
                    .map_err(|source| self.io_error(&existing.image_path, source))?;
            }
        }

        let target = self.dir.join(format!("{roll_number}.{ext}"));
        std::fs::copy(photo, &target).map_err(|source| self.io_error(photo, source))?;
        tracing::info!(roll = roll_number, path = %target.display(), "student registered");

        Ok(RosterEntry {
            roll_number: roll_number.to_string(),
            image_path: target,
        })
    }

    /// Remove every registration photo and the encoding cache.
    pub fn clear(&self) -> Result<usize, RosterError> {
        let entries = self.entries()?;
        for entry in &entries {
            std::fs::remove_file(&entry.image_path)
                .map_err(|source| self.io_error(&entry.image_path, source))?;
        }
        match std::fs::remove_file(&self.cache_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(self.io_error(&self.cache_path, source)),
        }
        tracing::info!(removed = entries.len(), "roster cleared");
        Ok(entries.len())
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> RosterError {
        RosterError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl RosterSource for PhotoRoster {
    fn students(&self, encoder: &mut dyn FaceEncoder) -> Result<Vec<Student>, RosterError> {
        let entries = self.entries()?;
        let mut cache = EncodingCache::load(&self.cache_path);
        let mut kept = BTreeMap::new();
        let mut students = Vec::with_capacity(entries.len());
        let mut computed = 0usize;

        for entry in entries {
            let bytes = match std::fs::read(&entry.image_path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(roll = %entry.roll_number, error = %e, "cannot read registration photo");
                    continue;
                }
            };
            let key = fingerprint(&bytes);

            let encodings = match cache.entries.remove(&key) {
                Some(cached) => cached.encodings,
                None => match encode_photo(&bytes, encoder) {
                    Ok(encodings) => {
                        computed += 1;
                        encodings
                    }
                    Err(e) => {
                        tracing::warn!(roll = %entry.roll_number, error = %e, "cannot encode registration photo");
                        continue;
                    }
                },
            };

            kept.insert(
                key,
                CachedEncodings {
                    roll_number: entry.roll_number.clone(),
                    encodings: encodings.clone(),
                },
            );

            if encodings.is_empty() {
                tracing::warn!(roll = %entry.roll_number, "no face detected in registration photo");
                continue;
            }
            students.push(Student::new(entry.roll_number, encodings));
        }

        if computed > 0 || !cache.entries.is_empty() {
            cache.entries = kept;
            if let Err(e) = cache.save(&self.cache_path) {
                tracing::warn!(path = %self.cache_path.display(), error = %e, "failed to write encoding cache");
            }
        }

        tracing::info!(students = students.len(), computed, "roster loaded");
        Ok(students)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEncodings {
    #[serde(rename = "rollNo")]
    roll_number: String,
    encodings: Vec<Embedding>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EncodingCache {
    entries: BTreeMap<String, CachedEncodings>,
}

impl EncodingCache {
    fn load(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable encoding cache");
            Self::default()
        })
    }

    fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string(self).map_err(std::io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)
    }
}

/// Decode a registration photo and encode its most prominent face.
/// An empty result means the photo contains no usable face.
fn encode_photo(bytes: &[u8], encoder: &mut dyn FaceEncoder) -> Result<Vec<Embedding>, String> {
    let image = match image::load_from_memory(bytes) {
        Ok(img) => img.to_rgb8(),
        Err(e) => {
            tracing::warn!(error = %e, "registration photo is not a decodable image");
            return Ok(Vec::new());
        }
    };
    let primary = encoder.encode_primary(&image).map_err(|e| e.to_string())?;
    Ok(primary.into_iter().collect())
}

fn fingerprint(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().fold(String::with_capacity(64), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

fn image_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn validate_roll_number(roll_number: &str) -> Result<(), RosterError> {
    let ok = !roll_number.is_empty()
        && roll_number.len() <= 64
        && !roll_number.starts_with('.')
        && roll_number
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(RosterError::InvalidRollNumber(roll_number.to_string()))
    }
}
