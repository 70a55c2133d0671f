//! ONNX Runtime binding for the learned scorer (`onnx` feature).
//!
//! Two graphs are loaded once per process:
//! - backbone: `(1, 3, H, W)` → field `(1, 1, H/8, W/8)` and features `(1, C, H/8, W/8)`
//! - head: `(1, C, k, k)` → one scalar per tile
//!
//! Leading unit dimensions are squeezed, so backbones emitting `(H/8, W/8)`
//! or `(C, H/8, W/8)` work too.

use std::path::Path;

use ndarray::{Array2, Array3, Array4, ArrayD, ArrayView3, Axis};
use ort::session::Session;
use ort::value::Value;

use super::learned::{ComplexityModel, ModelOutput};
use crate::error::{TileError, TileResult};

pub struct OnnxComplexityModel {
    backbone: Session,
    head: Session,
}

fn ort_error(stage: &str, e: impl std::fmt::Display) -> TileError {
    TileError::inference("learned", format!("{}: {}", stage, e))
}

fn load_session(path: &Path) -> TileResult<Session> {
    Session::builder()
        .and_then(|builder| builder.commit_from_file(path))
        .map_err(|e| {
            TileError::config("model", path.display().to_string(), format!("cannot load: {}", e))
        })
}

/// Drop leading unit axes until `rank` axes remain.
fn squeeze_to(mut arr: ArrayD<f32>, rank: usize) -> Option<ArrayD<f32>> {
    while arr.ndim() > rank {
        if arr.shape()[0] != 1 {
            return None;
        }
        arr = arr.index_axis_move(Axis(0), 0);
    }
    (arr.ndim() == rank).then_some(arr)
}

impl OnnxComplexityModel {
    /// Load both graphs. Failures here are configuration errors: the run
    /// cannot start without its model.
    pub fn load(backbone: &Path, head: &Path) -> TileResult<Self> {
        log::info!(
            "Loading learned scorer: backbone {}, head {}",
            backbone.display(),
            head.display()
        );
        Ok(Self {
            backbone: load_session(backbone)?,
            head: load_session(head)?,
        })
    }
}

impl ComplexityModel for OnnxComplexityModel {
    fn infer(&mut self, image: ArrayView3<'_, f32>) -> TileResult<ModelOutput> {
        let input: Array4<f32> = image.to_owned().insert_axis(Axis(0));
        let value = Value::from_array(input).map_err(|e| ort_error("backbone input", e))?;
        let input_name = self
            .backbone
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "image".into());
        let outputs = self
            .backbone
            .run(ort::inputs![input_name => value])
            .map_err(|e| ort_error("backbone", e))?;
        if outputs.len() < 2 {
            return Err(ort_error("backbone", "expected field and feature outputs"));
        }

        let field = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| ort_error("field output", e))?
            .to_owned();
        let features = outputs[1]
            .try_extract_array::<f32>()
            .map_err(|e| ort_error("feature output", e))?
            .to_owned();

        let field: Array2<f32> = squeeze_to(field, 2)
            .and_then(|a| a.into_dimensionality().ok())
            .ok_or_else(|| ort_error("field output", "malformed tensor shape"))?;
        let features: Array3<f32> = squeeze_to(features, 3)
            .and_then(|a| a.into_dimensionality().ok())
            .ok_or_else(|| ort_error("feature output", "malformed tensor shape"))?;

        Ok(ModelOutput { field, features })
    }

    fn regress(&mut self, features: ArrayView3<'_, f32>) -> TileResult<f32> {
        let input: Array4<f32> = features.to_owned().insert_axis(Axis(0));
        let value = Value::from_array(input).map_err(|e| ort_error("head input", e))?;
        let input_name = self
            .head
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "features".into());
        let outputs = self
            .head
            .run(ort::inputs![input_name => value])
            .map_err(|e| ort_error("head", e))?;
        let score = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| ort_error("head output", e))?;
        score
            .iter()
            .next()
            .copied()
            .ok_or_else(|| ort_error("head output", "empty tensor"))
    }
}
