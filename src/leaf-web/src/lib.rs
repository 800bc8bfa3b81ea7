use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use leaf_serve::{Classification, Error, ImageClassifier, MetadataLookup, Record};
use log::{debug, error, info, warn};

pub mod config;
pub mod uploads;
pub mod views;

use crate::uploads::{secure_filename, UploadStore};

const NO_IMAGE: &str = "No image uploaded.";
const TOO_LARGE: &str = "The uploaded file is too large.";

/// Everything a request needs, built once at startup
pub struct AppContext {
    classifier: ImageClassifier,
    metadata: Arc<dyn MetadataLookup>,
    uploads: UploadStore,
}

impl AppContext {
    pub fn new(
        classifier: ImageClassifier,
        metadata: Arc<dyn MetadataLookup>,
        uploads: UploadStore,
    ) -> Self {
        AppContext {
            classifier,
            metadata,
            uploads,
        }
    }
}

pub fn router(ctx: Arc<AppContext>, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(index).post(upload_and_predict))
        .route("/uploads/:filename", get(uploaded_file))
        .route("/about", get(about))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(ctx)
}

struct Upload {
    filename: String,
    data: Bytes,
}

async fn read_image_field(mut multipart: Multipart) -> Result<Option<Upload>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }

        let filename = field.file_name().map(secure_filename).unwrap_or_default();
        let data = field.bytes().await?;

        if filename.is_empty() || data.is_empty() {
            return Ok(None);
        }

        return Ok(Some(Upload { filename, data }));
    }

    Ok(None)
}

fn form_error(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Html(views::index(Some(message)))).into_response()
}

fn internal_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(views::error_page(message)),
    )
        .into_response()
}

async fn index() -> Html<String> {
    Html(views::index(None))
}

async fn about() -> Html<String> {
    Html(views::about())
}

async fn upload_and_predict(
    State(ctx): State<Arc<AppContext>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(err) => {
            debug!("rejected upload: {}", err);
            return form_error(NO_IMAGE);
        }
    };

    let upload = match read_image_field(multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => return form_error(NO_IMAGE),
        Err(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            warn!("upload over the body limit: {}", err);
            return (StatusCode::PAYLOAD_TOO_LARGE, Html(views::index(Some(TOO_LARGE))))
                .into_response();
        }
        Err(err) => {
            warn!("malformed multipart body: {}", err);
            return form_error(NO_IMAGE);
        }
    };

    info!(
        "received '{}' ({} bytes)",
        upload.filename,
        upload.data.len()
    );

    let classification = match classify(Arc::clone(&ctx), upload.data.clone()).await {
        Ok(classification) => classification,
        Err(err) if err.is_user_error() => return form_error(&err.to_string()),
        Err(err) => {
            error!("classification of '{}' failed: {}", upload.filename, err);
            return internal_error("The image could not be classified.");
        }
    };

    if let Err(err) = ctx.uploads.save(&upload.filename, &upload.data).await {
        error!("could not store '{}': {}", upload.filename, err);
        return internal_error("The upload could not be stored.");
    }

    let data = match resolve(Arc::clone(&ctx), classification.label.clone()).await {
        Ok(data) => data,
        Err(err) => {
            error!("metadata lookup for '{}' failed: {}", classification.label, err);
            return internal_error("Reference data could not be read.");
        }
    };

    Html(views::result(
        &classification.label,
        classification.confidence,
        data.as_deref(),
        &format!("/uploads/{}", upload.filename),
    ))
    .into_response()
}

async fn classify(ctx: Arc<AppContext>, data: Bytes) -> leaf_serve::Result<Classification> {
    tokio::task::spawn_blocking(move || ctx.classifier.classify_from_raw(&data))
        .await
        .map_err(|e| Error::Inference(e.to_string()))?
}

async fn resolve(ctx: Arc<AppContext>, label: String) -> leaf_serve::Result<Option<Vec<Record>>> {
    tokio::task::spawn_blocking(move || ctx.metadata.resolve(&label))
        .await
        .map_err(|e| Error::Inference(e.to_string()))?
}

async fn uploaded_file(
    State(ctx): State<Arc<AppContext>>,
    Path(filename): Path<String>,
) -> Response {
    match ctx.uploads.read(&filename).await {
        Some((name, data)) => {
            let content_type = image::ImageFormat::from_path(&name)
                .map(|format| format.to_mime_type())
                .unwrap_or("application/octet-stream");

            ([(header::CONTENT_TYPE, content_type)], data).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use leaf_serve::{CsvLookup, LabelCatalog, NormalizedImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const BOUNDARY: &str = "leafboundary";

    const TABLE: &str = "\
Common Name,Botanical Name,Family
Tomato,Solanum lycopersicum,Solanaceae
Tulsi,Ocimum tenuiflorum,Lamiaceae
";

    /// Always predicts the same class, or always fails
    struct FixedModel {
        hot: usize,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl leaf_serve::Classifier for FixedModel {
        fn scores(&self, _image: &NormalizedImage) -> leaf_serve::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Inference("session run failed".to_owned()));
            }

            let mut scores = vec![0.0; 85];
            scores[self.hot] = 1.0;
            Ok(scores)
        }

        fn output_classes(&self) -> Option<usize> {
            Some(85)
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        app: Router,
        calls: Arc<AtomicUsize>,
    }

    impl Harness {
        fn uploads_dir(&self) -> std::path::PathBuf {
            self.dir.path().join("uploads")
        }

        fn stored_uploads(&self) -> usize {
            std::fs::read_dir(self.uploads_dir()).unwrap().count()
        }
    }

    async fn harness(predicted: &str) -> Harness {
        build_harness(predicted, false, 1024 * 1024).await
    }

    async fn build_harness(predicted: &str, fail: bool, body_limit: usize) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("database.csv");
        std::fs::write(&table, TABLE).unwrap();

        let catalog = LabelCatalog::default();
        let hot = (0..catalog.len())
            .find(|i| catalog.get(*i).unwrap() == predicted)
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let model = Arc::new(FixedModel {
            hot,
            fail,
            calls: Arc::clone(&calls),
        });

        let classifier = ImageClassifier::bind(model, catalog).unwrap();
        let metadata = Arc::new(CsvLookup::open(&table).unwrap());
        let uploads = UploadStore::open(&dir.path().join("uploads"), 10)
            .await
            .unwrap();

        let ctx = Arc::new(AppContext::new(classifier, metadata, uploads));

        Harness {
            app: router(ctx, body_limit),
            dir,
            calls,
        }
    }

    fn jpeg_bytes() -> Vec<u8> {
        let img = ImageBuffer::from_fn(300, 200, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));

        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(field, filename, data)))
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        (status, body.to_vec())
    }

    fn text(body: &[u8]) -> String {
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn form_and_about_render() {
        let h = harness("Tomato").await;

        let (status, body) = send(&h.app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(text(&body).contains(r#"name="image""#));

        let (status, body) = send(&h.app, Request::get("/about").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(text(&body).contains("About"));
    }

    #[tokio::test]
    async fn tomato_upload_renders_prediction_and_record() {
        let h = harness("Tomato").await;
        let photo = jpeg_bytes();

        let (status, body) = send(&h.app, upload_request("image", "my leaf.jpg", &photo)).await;
        let html = text(&body);

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains(r#"<span class="class-name">Tomato</span>"#));
        assert_eq!(html.matches("<table").count(), 1);
        assert!(html.contains("<td>Solanum lycopersicum</td>"));
        assert!(html.contains(r#"src="/uploads/my_leaf.jpg""#));
        assert!(!html.contains(views::NO_DATA));

        let (status, stored) = send(
            &h.app,
            Request::get("/uploads/my_leaf.jpg").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stored, photo);
    }

    #[tokio::test]
    async fn prediction_without_reference_rows_says_no_data() {
        let h = harness("Ganike").await;

        let (status, body) = send(&h.app, upload_request("image", "g.jpg", &jpeg_bytes())).await;
        let html = text(&body);

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains(r#"<span class="class-name">Ganike</span>"#));
        assert!(html.contains(views::NO_DATA));
    }

    #[tokio::test]
    async fn text_renamed_to_jpg_rerenders_form() {
        let h = harness("Tomato").await;

        let (status, body) = send(
            &h.app,
            upload_request("image", "notes.jpg", b"these are my notes, not a photo"),
        )
        .await;
        let html = text(&body);

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(html.contains("Unsupported image format"));
        assert!(html.contains("<form"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.stored_uploads(), 0);
    }

    #[tokio::test]
    async fn missing_image_field_rerenders_form() {
        let h = harness("Tomato").await;

        let (status, body) = send(&h.app, upload_request("photo", "leaf.jpg", &jpeg_bytes())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(text(&body).contains(NO_IMAGE));
        assert_eq!(h.stored_uploads(), 0);
    }

    #[tokio::test]
    async fn non_multipart_post_rerenders_form() {
        let h = harness("Tomato").await;

        let req = Request::post("/")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let (status, body) = send(&h.app, req).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(text(&body).contains(NO_IMAGE));
    }

    #[tokio::test]
    async fn unknown_upload_is_not_found() {
        let h = harness("Tomato").await;

        let (status, _) = send(
            &h.app,
            Request::get("/uploads/nothing.png").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn model_failure_is_a_server_error() {
        let h = build_harness("Tomato", true, 1024 * 1024).await;

        let (status, body) = send(&h.app, upload_request("image", "leaf.jpg", &jpeg_bytes())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(text(&body).contains("Something went wrong"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.stored_uploads(), 0);
    }

    #[tokio::test]
    async fn oversized_upload_is_payload_too_large() {
        let h = build_harness("Tomato", false, 512).await;
        let photo = jpeg_bytes();
        assert!(photo.len() > 512);

        let (status, body) = send(&h.app, upload_request("image", "big.jpg", &photo)).await;
        let html = text(&body);

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(html.contains(TOO_LARGE));
        assert!(html.contains("<form"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.stored_uploads(), 0);
    }
}
