#[cfg(feature = "tensorflow")]
mod native;

#[cfg(feature = "tensorflow")]
pub use self::native::TensorflowClassifier;

use std::path::Path;

use log::debug;
use tract_onnx::prelude::*;

use crate::normalize::{NormalizedImage, SHAPE};
use crate::{Error, Result};

/// A loaded model able to score a normalized leaf image.
///
/// Implementations must not mutate shared state during `scores` so a
/// single handle can serve concurrent requests.
pub trait Classifier: Send + Sync {
    /// Run the forward pass and return one score per class.
    fn scores(&self, image: &NormalizedImage) -> Result<Vec<f32>>;

    /// Number of classes the model declares, if known before running it.
    fn output_classes(&self) -> Option<usize>;
}

type Plan = TypedRunnableModel<TypedModel>;

/// Pure Rust engine for TensorFlow frozen graphs and ONNX models.
pub struct TractClassifier {
    plan: Plan,
    outputs: Option<usize>,
}

fn load_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::ModelLoad {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

impl TractClassifier {
    pub fn load(path: &Path) -> Result<Self> {
        let model = match path.extension().and_then(|ext| ext.to_str()) {
            Some("pb") => tract_tensorflow::tensorflow().model_for_path(path),
            Some("onnx") => tract_onnx::onnx().model_for_path(path),
            _ => return Err(Error::UnsupportedModelFormat(path.to_path_buf())),
        }
        .map_err(|e| load_error(path, e))?;

        let model = model
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(SHAPE[0], SHAPE[1], SHAPE[2], SHAPE[3])),
            )
            .and_then(|m| m.into_optimized())
            .map_err(|e| load_error(path, e))?;

        let outputs = model
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().and_then(|s| s.last().copied()));

        debug!("{}: declared output classes {:?}", path.display(), outputs);

        let plan = model.into_runnable().map_err(|e| load_error(path, e))?;

        Ok(TractClassifier { plan, outputs })
    }
}

impl Classifier for TractClassifier {
    fn scores(&self, image: &NormalizedImage) -> Result<Vec<f32>> {
        let input = Tensor::from_shape(&image.shape(), image.as_slice())
            .map_err(|e| Error::Inference(e.to_string()))?;

        let result = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| Error::Inference(e.to_string()))?;

        let output = result
            .first()
            .ok_or_else(|| Error::Inference("model returned no outputs".to_owned()))?;

        let scores = output
            .as_slice::<f32>()
            .map_err(|e| Error::Inference(e.to_string()))?;

        Ok(scores.to_vec())
    }

    fn output_classes(&self) -> Option<usize> {
        self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_is_rejected_before_reading() {
        let err = TractClassifier::load(Path::new("/nonexistent/model.h5"))
            .err()
            .unwrap();

        assert!(matches!(err, Error::UnsupportedModelFormat(_)));
    }

    #[test]
    fn corrupt_artifact_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"<html>quota exceeded</html>").unwrap();

        let err = TractClassifier::load(&path).err().unwrap();

        assert!(matches!(err, Error::ModelLoad { .. }));
    }
}
