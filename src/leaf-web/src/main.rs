use std::error::Error;
use std::sync::Arc;

use leaf_serve::provision::HttpArtifactSource;
use leaf_serve::{CsvLookup, ImageClassifier, LabelCatalog, ModelProvisioner};
use leaf_web::config::Config;
use leaf_web::uploads::UploadStore;
use leaf_web::{router, AppContext};
use log::{error, info};
use structopt::StructOpt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let config = Config::from_args();

    let provisioner = ModelProvisioner::new(
        &config.models_dir,
        &config.model_file,
        HttpArtifactSource::new(&config.model_url),
        config.engine(),
    );

    let model = provisioner.ensure_model_ready().await?;
    let classifier = ImageClassifier::bind(model, LabelCatalog::default())?;

    let metadata = Arc::new(CsvLookup::open(&config.data_path)?);
    let uploads = UploadStore::open(&config.uploads_dir, config.max_uploads).await?;

    let ctx = Arc::new(AppContext::new(classifier, metadata, uploads));
    let app = router(ctx, config.body_limit);

    let addr = config.socket_addr();
    info!("Listening on http://{}", addr);

    let server = hyper::Server::bind(&addr).serve(app.into_make_service());

    if let Err(e) = server.await {
        error!("server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
