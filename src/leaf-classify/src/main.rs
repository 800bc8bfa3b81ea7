use std::error::Error;
use std::path::PathBuf;
use structopt::StructOpt;

use leaf_serve::provision::{Engine, ModelLoader};
use leaf_serve::{Classification, CsvLookup, ImageClassifier, LabelCatalog, MetadataLookup, Record};
use log::info;
use serde::Serialize;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "leaf-classify",
    about = "CLI app identifying the plant species of a leaf photograph"
)]
struct CmdArgs {
    #[structopt(help = "Path to the model (.pb frozen graph or .onnx)", parse(from_os_str))]
    model_path: PathBuf,

    #[structopt(help = "Path to the leaf image", parse(from_os_str))]
    image_path: PathBuf,

    #[structopt(
        long,
        help = "CSV reference table with a 'Common Name' column",
        parse(from_os_str)
    )]
    data_path: Option<PathBuf>,

    #[cfg(feature = "tensorflow")]
    #[structopt(long, help = "Load the graph with libtensorflow instead of tract")]
    tensorflow: bool,

    #[cfg(feature = "tensorflow")]
    #[structopt(long, default_value = "x", help = "Graph operation fed with the image")]
    input_op: String,

    #[cfg(feature = "tensorflow")]
    #[structopt(
        long,
        default_value = "Identity",
        help = "Graph operation holding the class scores"
    )]
    output_op: String,
}

impl CmdArgs {
    fn engine(&self) -> Engine {
        #[cfg(feature = "tensorflow")]
        if self.tensorflow {
            return Engine::Tensorflow {
                input_op: self.input_op.clone(),
                output_op: self.output_op.clone(),
            };
        }

        Engine::Tract
    }
}

#[derive(Serialize)]
struct Output {
    #[serde(flatten)]
    classification: Classification,

    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Vec<Record>>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let model = args.engine().load(&args.model_path)?;
    let classifier = ImageClassifier::bind(model, LabelCatalog::default())?;

    let raw = std::fs::read(&args.image_path)?;
    let classification = classifier.classify_from_raw(&raw)?;

    info!("{} ({:.3})", classification.label, classification.confidence);

    let data = match &args.data_path {
        Some(path) => CsvLookup::open(path)?.resolve(&classification.label)?,
        None => None,
    };

    println!(
        "{}",
        serde_json::to_string(&Output {
            classification,
            data
        })?
    );

    Ok(())
}
