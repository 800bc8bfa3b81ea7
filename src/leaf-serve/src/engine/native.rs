use std::path::Path;

use tensorflow::{
    Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Status, Tensor,
};

use super::Classifier;
use crate::normalize::{NormalizedImage, SHAPE};
use crate::{Error, Result};

/// Frozen graph classifier backed by libtensorflow
pub struct TensorflowClassifier {
    /// TensorFlow model graph
    graph: Graph,

    /// TensorFlow session
    session: Session,

    /// Name of the input placeholder operation
    input_op: String,

    /// Name of the operation holding the class scores
    output_op: String,
}

fn inference_error(status: Status) -> Error {
    Error::Inference(status.to_string())
}

impl TensorflowClassifier {
    pub fn load(path: &Path, input_op: &str, output_op: &str) -> Result<Self> {
        let proto = std::fs::read(path).map_err(|e| Error::io(path, e))?;

        let load_error = |status: Status| Error::ModelLoad {
            path: path.to_path_buf(),
            reason: status.to_string(),
        };

        let mut graph = Graph::new();
        graph
            .import_graph_def(&proto, &ImportGraphDefOptions::new())
            .map_err(load_error)?;

        let session = Session::new(&SessionOptions::new(), &graph).map_err(load_error)?;

        Ok(TensorflowClassifier {
            graph,
            session,
            input_op: input_op.to_owned(),
            output_op: output_op.to_owned(),
        })
    }
}

impl Classifier for TensorflowClassifier {
    fn scores(&self, image: &NormalizedImage) -> Result<Vec<f32>> {
        let dims: Vec<u64> = SHAPE.iter().map(|d| *d as u64).collect();
        let input = Tensor::new(&dims)
            .with_values(image.as_slice())
            .map_err(inference_error)?;

        let mut args = SessionRunArgs::new();

        args.add_feed(
            &self
                .graph
                .operation_by_name_required(&self.input_op)
                .map_err(inference_error)?,
            0,
            &input,
        );

        let result = args.request_fetch(
            &self
                .graph
                .operation_by_name_required(&self.output_op)
                .map_err(inference_error)?,
            0,
        );

        self.session.run(&mut args).map_err(inference_error)?;
        let output: Tensor<f32> = args.fetch(result).map_err(inference_error)?;

        Ok(output.iter().copied().collect())
    }

    fn output_classes(&self) -> Option<usize> {
        None
    }
}
