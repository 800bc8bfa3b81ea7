use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::OnceCell;

use crate::engine::{Classifier, TractClassifier};
use crate::{Error, Result, Timer};

/// File name of the leaf model inside the models directory
pub const DEFAULT_MODEL_FILE: &str = "E35_D5_LeakyRelu_0.0005_A94.pb";

/// Public Google Drive file holding the leaf model
pub const DEFAULT_MODEL_URL: &str =
    "https://drive.usercontent.google.com/download?id=1AYaUN4QAskXZaN8kjv7Y92WjSgrUsCNC&export=download&confirm=t";

const HDF5_MAGIC: &[u8; 8] = b"\x89HDF\r\n\x1a\n";

const HDF5_HINT: &str = "artifact is a Keras HDF5 (.h5) save; export it to a frozen graph (.pb) or ONNX (.onnx) and point the model URL at that file";

/// Somewhere a model artifact can be fetched from.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Write the artifact to `destination`, returning the number of bytes
    /// written.
    async fn fetch(&self, destination: &Path) -> Result<u64>;
}

/// Turns an artifact on disk into a runnable model.
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Classifier>>;
}

/// Downloads the artifact over HTTP(S).
pub struct HttpArtifactSource {
    client: reqwest::Client,
    url: String,
}

impl HttpArtifactSource {
    pub fn new(url: &str) -> Self {
        HttpArtifactSource {
            client: reqwest::Client::new(),
            url: url.to_owned(),
        }
    }
}

#[async_trait]
impl ArtifactSource for HttpArtifactSource {
    async fn fetch(&self, destination: &Path) -> Result<u64> {
        let mut resp = self.client.get(&self.url).send().await?.error_for_status()?;

        let html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.starts_with("text/html"));

        if html {
            return Err(Error::Download(format!(
                "{} returned an HTML page instead of the model",
                self.url
            )));
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| Error::io(destination, e))?;

        let mut written: u64 = 0;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io(destination, e))?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| Error::io(destination, e))?;

        Ok(written)
    }
}

/// Inference backend used to load the artifact.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Engine {
    /// Pure Rust; loads `.pb` and `.onnx` artifacts.
    #[default]
    Tract,

    /// libtensorflow; loads frozen graphs fed and fetched by operation name.
    #[cfg(feature = "tensorflow")]
    Tensorflow { input_op: String, output_op: String },
}

impl ModelLoader for Engine {
    fn load(&self, path: &Path) -> Result<Arc<dyn Classifier>> {
        match self {
            Engine::Tract => Ok(Arc::new(TractClassifier::load(path)?)),
            #[cfg(feature = "tensorflow")]
            Engine::Tensorflow {
                input_op,
                output_op,
            } => Ok(Arc::new(crate::engine::TensorflowClassifier::load(
                path, input_op, output_op,
            )?)),
        }
    }
}

/// Whether the file starts with the HDF5 signature, as Keras `.h5` saves do.
async fn is_hdf5(path: &Path) -> Result<bool> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::io(path, e))?;

    let mut magic = [0u8; 8];
    match file.read_exact(&mut magic).await {
        Ok(_) => Ok(&magic == HDF5_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

async fn remove_partial(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("could not remove {}: {}", partial.display(), e);
        }
    }
}

/// Makes sure the model artifact is on disk and loaded, at most once.
pub struct ModelProvisioner {
    models_dir: PathBuf,
    file_name: String,
    source: Box<dyn ArtifactSource>,
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn Classifier>>,
}

impl ModelProvisioner {
    pub fn new<S, L>(models_dir: &Path, file_name: &str, source: S, loader: L) -> Self
    where
        S: ArtifactSource + 'static,
        L: ModelLoader + 'static,
    {
        ModelProvisioner {
            models_dir: models_dir.to_path_buf(),
            file_name: file_name.to_owned(),
            source: Box::new(source),
            loader: Arc::new(loader),
            model: OnceCell::new(),
        }
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.models_dir.join(&self.file_name)
    }

    /// Download the artifact unless a file with its name already exists.
    ///
    /// The download goes to a `.part` sibling first and is renamed into
    /// place only once complete. Keras HDF5 files are refused, whether
    /// downloaded or already present.
    pub async fn ensure_artifact(&self) -> Result<PathBuf> {
        let destination = self.artifact_path();

        if tokio::fs::try_exists(&destination).await.unwrap_or(false) {
            info!("Model file already exists: {}", destination.display());

            if is_hdf5(&destination).await? {
                return Err(Error::ModelLoad {
                    path: destination,
                    reason: HDF5_HINT.to_owned(),
                });
            }

            return Ok(destination);
        }

        tokio::fs::create_dir_all(&self.models_dir)
            .await
            .map_err(|e| Error::io(&self.models_dir, e))?;

        let partial = self.models_dir.join(format!("{}.part", self.file_name));

        let mut t = Timer::new_start("Downloading model");

        let written = match self.source.fetch(&partial).await {
            Ok(written) => written,
            Err(err) => {
                remove_partial(&partial).await;
                return Err(err);
            }
        };

        // neither engine reads HDF5, keep it from landing under the model name
        match is_hdf5(&partial).await {
            Ok(false) => {}
            Ok(true) => {
                remove_partial(&partial).await;
                return Err(Error::Download(HDF5_HINT.to_owned()));
            }
            Err(err) => {
                remove_partial(&partial).await;
                return Err(err);
            }
        }

        tokio::fs::rename(&partial, &destination)
            .await
            .map_err(|e| Error::io(&destination, e))?;

        t.stop();
        info!("Downloaded {} bytes to {}", written, destination.display());

        Ok(destination)
    }

    /// Handle to the loaded model. Concurrent first callers wait for a
    /// single download and load; a failure is not cached.
    pub async fn ensure_model_ready(&self) -> Result<Arc<dyn Classifier>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let path = self.ensure_artifact().await?;
                let loader = Arc::clone(&self.loader);

                let mut t = Timer::new_start("Loading model");

                let load_path = path.clone();
                let model = tokio::task::spawn_blocking(move || loader.load(&load_path))
                    .await
                    .map_err(|e| Error::ModelLoad {
                        path,
                        reason: e.to_string(),
                    })??;

                t.stop();

                Ok::<_, Error>(model)
            })
            .await?;

        Ok(Arc::clone(model))
    }
}
