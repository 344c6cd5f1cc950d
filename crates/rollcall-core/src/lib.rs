//! rollcall-core: Face encoding and roster matching.
//!
//! Faces are detected with SCRFD and encoded with ArcFace, both via ONNX
//! Runtime on CPU. Matching compares encodings by cosine distance.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod matcher;
pub mod recognizer;
pub mod types;

use ort::session::Session;
use std::path::{Path, PathBuf};

pub use encoder::{EncoderError, FaceEncoder, OnnxFaceEncoder};
pub use matcher::{RosterMatcher, DEFAULT_ACCEPTANCE_THRESHOLD};
pub use types::{BoundingBox, Embedding, FaceMatch, Student};

/// System-wide model location used when no override is configured.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/rollcall/models")
}

/// CPU inference session for one model file.
pub(crate) fn cpu_session(model: &Path) -> Result<Session, ort::Error> {
    Session::builder()?.with_intra_threads(2)?.commit_from_file(model)
}
