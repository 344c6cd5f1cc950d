//! ArcFace (w600k_r50) face encodings.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// ArcFace normalises symmetrically around mid-grey.
const PIXEL_CENTER: f32 = 127.5;
const PIXEL_SCALE: f32 = 127.5;
pub const ARCFACE_EMBEDDING_DIM: usize = 512;
const MODEL_TAG: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("ArcFace model missing at {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("unexpected ArcFace output: {0}")]
    BadOutput(String),
    #[error("detection carries no landmarks; cannot align")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.is_file() {
            return Err(RecognizerError::ModelNotFound(model_path.to_path_buf()));
        }
        let session = crate::cpu_session(model_path)?;
        tracing::info!(path = %model_path.display(), "ArcFace recognizer ready");
        Ok(Self { session })
    }

    /// Align the detected face to 112×112 and compute its unit-length encoding.
    pub fn encode_face(&mut self, frame: &RgbImage, face: &BoundingBox) -> Result<Embedding, RecognizerError> {
        let Some(landmarks) = face.landmarks.as_ref() else {
            return Err(RecognizerError::NoLandmarks);
        };
        let tensor = to_nchw(&alignment::align_face(frame, landmarks));

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(tensor.view())?])?;
        let (_, values) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::BadOutput(e.to_string()))?;
        if values.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::BadOutput(format!(
                "{} values, wanted {ARCFACE_EMBEDDING_DIM}",
                values.len()
            )));
        }

        let mut embedding = Embedding::new(unit_length(values));
        embedding.model_version = Some(MODEL_TAG.to_string());
        Ok(embedding)
    }
}

fn to_nchw(crop: &RgbImage) -> Array4<f32> {
    let side = ALIGNED_SIZE as usize;
    Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        let value = crop.get_pixel(x as u32, y as u32).0[c];
        (value as f32 - PIXEL_CENTER) / PIXEL_SCALE
    })
}

fn unit_length(values: &[f32]) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return values.to_vec();
    }
    values.iter().map(|v| v / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_tensor_layout() {
        let crop = RgbImage::from_pixel(ALIGNED_SIZE, ALIGNED_SIZE, Rgb([255, 127, 0]));
        let t = to_nchw(&crop);
        assert_eq!(t.shape(), &[1, 3, 112, 112]);
        assert!((t[[0, 0, 7, 3]] - 1.0).abs() < 1e-6);
        assert!((t[[0, 1, 7, 3]] - (127.0 - PIXEL_CENTER) / PIXEL_SCALE).abs() < 1e-6);
        assert!((t[[0, 2, 7, 3]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_tensor_uses_column_as_x() {
        let mut crop = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
        crop.put_pixel(10, 2, Rgb([255, 255, 255]));
        let t = to_nchw(&crop);
        assert!(t[[0, 0, 2, 10]] > 0.99);
        assert!(t[[0, 0, 10, 2]] < -0.99);
    }

    #[test]
    fn test_unit_length() {
        let v = unit_length(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        assert_eq!(unit_length(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_missing_model() {
        let path = std::env::temp_dir().join("rollcall-absent").join("w600k_r50.onnx");
        assert!(matches!(
            FaceRecognizer::load(&path),
            Err(RecognizerError::ModelNotFound(p)) if p == path
        ));
    }
}
