//! Frame → face encodings.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Computes one encoding per face found in an image.
pub trait FaceEncoder: Send {
    /// Encodings for every detected face, most confident detection first.
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, EncoderError>;

    /// Encoding of the most prominent face, used for registration photos.
    fn encode_primary(&mut self, image: &RgbImage) -> Result<Option<Embedding>, EncoderError> {
        Ok(self.encode(image)?.into_iter().next())
    }
}

/// SCRFD detection + ArcFace embedding.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    max_faces: usize,
}

impl OnnxFaceEncoder {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path, max_faces: usize) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
            max_faces: max_faces.max(1),
        })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, EncoderError> {
        let faces = self.detector.detect(image)?;
        if faces.len() > self.max_faces {
            tracing::debug!(detected = faces.len(), limit = self.max_faces, "dropping low-confidence faces");
        }

        let mut encodings = Vec::with_capacity(faces.len().min(self.max_faces));
        for face in faces.iter().take(self.max_faces) {
            match self.recognizer.encode_face(image, face) {
                Ok(embedding) => encodings.push(embedding),
                // Faces decoded without landmarks cannot be aligned; skip them.
                Err(RecognizerError::NoLandmarks) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(encodings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<Embedding>);

    impl FaceEncoder for Scripted {
        fn encode(&mut self, _image: &RgbImage) -> Result<Vec<Embedding>, EncoderError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_encode_primary_takes_first_face() {
        let mut enc = Scripted(vec![Embedding::new(vec![1.0]), Embedding::new(vec![2.0])]);
        let primary = enc.encode_primary(&RgbImage::new(4, 4)).unwrap();
        assert_eq!(primary, Some(Embedding::new(vec![1.0])));
    }

    #[test]
    fn test_encode_primary_no_face() {
        let mut enc = Scripted(vec![]);
        assert_eq!(enc.encode_primary(&RgbImage::new(4, 4)).unwrap(), None);
    }

    #[test]
    fn test_load_reports_missing_model() {
        let dir = std::env::temp_dir().join("rollcall-core-no-models");
        match OnnxFaceEncoder::load(&dir, 4) {
            Err(EncoderError::Detector(DetectorError::ModelNotFound(path))) => {
                assert!(path.ends_with(SCRFD_MODEL_FILE));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("models should not exist in {}", dir.display()),
        }
    }
}
