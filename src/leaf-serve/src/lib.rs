use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::Serialize;

pub mod dispatch;
pub mod engine;
mod error;
pub mod labels;
pub mod metadata;
pub mod normalize;
pub mod provision;

pub use crate::dispatch::{predict, Prediction};
pub use crate::engine::Classifier;
pub use crate::error::{Error, Result};
pub use crate::labels::LabelCatalog;
pub use crate::metadata::{CsvLookup, MetadataLookup, Record};
pub use crate::normalize::{normalize, NormalizedImage};
pub use crate::provision::ModelProvisioner;

pub struct Timer {
    name: String,
    tstamp: Option<DateTime<Utc>>,
    duration: Option<Duration>,
}

impl Timer {
    /// Create a new timer
    pub fn new(name: &str) -> Self {
        Timer {
            name: name.to_owned(),
            tstamp: None,
            duration: None,
        }
    }

    pub fn new_start(name: &str) -> Self {
        let mut t = Timer::new(name);
        t.start();
        t
    }

    /// Start the timer
    pub fn start(&mut self) {
        info!("{}: starting", self.name);

        self.tstamp = Some(Utc::now());
        self.duration = None;
    }

    /// Stop the timer
    pub fn stop(&mut self) {
        match self.tstamp {
            None => debug!("{}: not running!", self.name),
            Some(tstamp) => {
                let d = Utc::now() - tstamp;

                self.duration = Some(d);
                self.tstamp = None;
                info!("{} duration: {} msec", self.name, d.num_milliseconds());
            }
        }
    }

    /// Get duration in milliseconds
    pub fn duration(&self) -> i64 {
        match self.duration {
            None => 0,
            Some(dur) => dur.num_milliseconds(),
        }
    }
}

/// A loaded model bound to the catalog that names its outputs
#[derive(Clone)]
pub struct ImageClassifier {
    model: Arc<dyn Classifier>,
    catalog: LabelCatalog,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Classification {
    /// Predicted species
    pub label: String,

    /// Probability of the predicted species
    pub confidence: f32,

    /// Time spent decoding the image
    pub time_image_load: i64,

    /// Time resizing image
    pub time_image_resize: i64,

    /// Time spent on running session
    pub time_session_run: i64,
}

impl ImageClassifier {
    /// Bind a model to its label catalog, failing when the model declares
    /// a different number of classes than the catalog holds.
    pub fn bind(model: Arc<dyn Classifier>, catalog: LabelCatalog) -> Result<Self> {
        match model.output_classes() {
            Some(outputs) => catalog.check_outputs(outputs)?,
            None => warn!(
                "model does not declare its output size, cannot check it against {} labels",
                catalog.len()
            ),
        }

        Ok(ImageClassifier { model, catalog })
    }

    pub fn run(&self, image: &NormalizedImage) -> Result<Classification> {
        let mut t = Timer::new_start("Running session");

        let prediction = predict(image, self.model.as_ref(), &self.catalog)?;

        t.stop();

        Ok(Classification {
            label: prediction.label,
            confidence: prediction.confidence,
            time_session_run: t.duration(),
            ..Default::default()
        })
    }

    pub fn classify(&self, rgb: &image::RgbImage) -> Result<Classification> {
        let mut t = Timer::new_start("Resizing image");

        let image = normalize::resize_and_scale(rgb);

        t.stop();

        let mut classification = self.run(&image)?;
        classification.time_image_resize = t.duration();

        Ok(classification)
    }

    pub fn classify_from_raw(&self, data: &[u8]) -> Result<Classification> {
        let mut t = Timer::new_start("Load image from memory");

        let rgb = normalize::decode(data)?;

        t.stop();

        let mut classification = self.classify(&rgb)?;
        classification.time_image_load = t.duration();

        Ok(classification)
    }
}
