use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use leaf_serve::provision::{Engine, DEFAULT_MODEL_FILE, DEFAULT_MODEL_URL};
use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone)]
#[structopt(
    name = "leaf-web",
    about = "Web app identifying plant species from a photographed leaf"
)]
pub struct Config {
    #[structopt(long, env = "LEAF_HOST", default_value = "0.0.0.0", help = "Address to listen on")]
    pub host: IpAddr,

    #[structopt(long, env = "LEAF_PORT", default_value = "5000", help = "Port to listen on")]
    pub port: u16,

    #[structopt(
        long,
        env = "LEAF_MODELS_DIR",
        default_value = "../models",
        parse(from_os_str),
        help = "Directory holding the downloaded model"
    )]
    pub models_dir: PathBuf,

    #[structopt(
        long,
        env = "LEAF_MODEL_FILE",
        default_value = DEFAULT_MODEL_FILE,
        help = "Model file name, .pb (frozen graph) or .onnx"
    )]
    pub model_file: String,

    #[structopt(
        long,
        env = "LEAF_MODEL_URL",
        default_value = DEFAULT_MODEL_URL,
        help = "Where to download the model from when it is missing"
    )]
    pub model_url: String,

    #[structopt(
        long,
        env = "LEAF_DATA_PATH",
        default_value = "../data/database.csv",
        parse(from_os_str),
        help = "CSV reference table with a 'Common Name' column"
    )]
    pub data_path: PathBuf,

    #[structopt(
        long,
        env = "LEAF_UPLOADS_DIR",
        default_value = "uploads",
        parse(from_os_str),
        help = "Directory storing uploaded images"
    )]
    pub uploads_dir: PathBuf,

    #[structopt(
        long,
        env = "LEAF_MAX_UPLOADS",
        default_value = "500",
        help = "Number of uploads kept before the oldest are evicted"
    )]
    pub max_uploads: usize,

    #[structopt(
        long,
        env = "LEAF_BODY_LIMIT",
        default_value = "16777216",
        help = "Maximum request body size in bytes"
    )]
    pub body_limit: usize,

    #[cfg(feature = "tensorflow")]
    #[structopt(
        long,
        env = "LEAF_ENGINE",
        default_value = "tract",
        possible_values = &["tract", "tensorflow"],
        help = "Inference backend"
    )]
    pub engine: String,

    #[cfg(feature = "tensorflow")]
    #[structopt(
        long,
        env = "LEAF_INPUT_OP",
        default_value = "x",
        help = "Graph operation fed with the image (tensorflow engine)"
    )]
    pub input_op: String,

    #[cfg(feature = "tensorflow")]
    #[structopt(
        long,
        env = "LEAF_OUTPUT_OP",
        default_value = "Identity",
        help = "Graph operation holding the class scores (tensorflow engine)"
    )]
    pub output_op: String,
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Backend selected on the command line; tract unless built with the
    /// `tensorflow` feature and asked for it.
    pub fn engine(&self) -> Engine {
        #[cfg(feature = "tensorflow")]
        if self.engine == "tensorflow" {
            return Engine::Tensorflow {
                input_op: self.input_op.clone(),
                output_op: self.output_op.clone(),
            };
        }

        Engine::Tract
    }
}
