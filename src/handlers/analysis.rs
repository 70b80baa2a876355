//! # Emotion Analysis Handlers
//!
//! ## Available Endpoints:
//! - `POST /analyze/audio` - classify one audio clip (form field `file`)
//! - `POST /analyze/image` - classify one face image (form field `file`)
//! - `POST /analyze/batch-images` - classify up to `max_batch_size` images (form field `files`)
//!
//! Every upload is staged to its own temp file, handed to the model on the
//! blocking thread pool, and removed before the response is built.

use crate::emotion::{
    predict_with_confidence, round2, to_percentage, FaceEmotionModel, ModelType, Prediction,
};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::upload::{read_batch, read_single, suffix_for, StagedUpload, UploadedFile};
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

const AUDIO_SUFFIX: &str = ".webm";
const IMAGE_SUFFIX: &str = ".jpg";

const INVALID_AUDIO_TYPE: &str = "Invalid file type. Please upload an audio file.";
const INVALID_IMAGE_TYPE: &str = "Invalid file type. Please upload an image file.";
const NO_FACE: &str = "No face detected in the image. Please upload an image with a clear face.";

/// Response for a single-file analysis.
///
/// ```json
/// {
///   "success": true,
///   "emotion": "happy",
///   "confidence": 87.65,
///   "filename": "me.jpg",
///   "model_type": "deepface"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub emotion: String,
    /// Percentage, 0–100, two decimals
    pub confidence: f32,
    pub filename: Option<String>,
    pub model_type: ModelType,
}

/// One entry of a batch response; failed items carry `error` instead of a prediction.
#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub filename: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    fn succeeded(filename: Option<String>, prediction: &Prediction) -> Self {
        Self {
            filename,
            success: true,
            emotion: Some(prediction.label.to_lowercase()),
            confidence: Some(face_confidence(prediction.confidence)),
            error: None,
        }
    }

    fn failed(filename: Option<String>, error: &str) -> Self {
        Self {
            filename,
            success: false,
            emotion: None,
            confidence: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub results: Vec<BatchItem>,
    pub total_processed: usize,
    pub successful_analyses: usize,
}

/// Face scores are already percentages.
fn face_confidence(score: f32) -> f32 {
    round2(score).clamp(0.0, 100.0)
}

fn ensure_size(upload: &UploadedFile, limit: usize) -> AppResult<()> {
    if upload.too_large {
        return Err(AppError::Validation(format!(
            "File too large. Maximum size is {} bytes.",
            limit
        )));
    }
    Ok(())
}

/// Stage `upload` and run the face model on it. The temp file is gone when this returns.
async fn run_face_model(
    model: Arc<dyn FaceEmotionModel>,
    upload: &UploadedFile,
    staging_dir: &Path,
) -> AppResult<Option<Prediction>> {
    let staged = StagedUpload::stage(
        &upload.bytes,
        &suffix_for(upload.filename.as_deref(), IMAGE_SUFFIX),
        staging_dir,
    )
    .map_err(|e| AppError::internal("Image analysis", e))?;

    let path = staged.path().to_path_buf();
    let result = web::block(move || predict_with_confidence(model.as_ref(), &path)).await;
    drop(staged);

    result.map_err(|e| AppError::internal("Image analysis", e))
}

/// Analyze emotion from an uploaded audio file.
///
/// ## Endpoint: `POST /analyze/audio`
///
/// ## Errors:
/// - 503 if the audio model did not load at startup
/// - 400 for a non-`audio/*` upload, a missing file or an oversize file
/// - 500 if decoding or inference fails
pub async fn analyze_audio(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    let span = info_span!("analyze_audio", request_id = %Uuid::new_v4());
    audio_analysis(state, payload).instrument(span).await
}

async fn audio_analysis(state: web::Data<AppState>, mut payload: Multipart) -> AppResult<HttpResponse> {
    let model = state.models.audio.get().ok_or_else(|| {
        AppError::ModelUnavailable("Audio emotion model not available. Please check server logs.".to_string())
    })?;

    let limit = state.config.uploads.max_file_size_bytes;
    let upload = read_single(&mut payload, "file", limit).await?;
    ensure_size(&upload, limit)?;
    if !upload.has_mime_prefix("audio/") {
        return Err(AppError::Validation(INVALID_AUDIO_TYPE.to_string()));
    }

    let staged = StagedUpload::stage(
        &upload.bytes,
        &suffix_for(upload.filename.as_deref(), AUDIO_SUFFIX),
        &state.staging_dir(),
    )
    .map_err(|e| AppError::internal("Audio analysis", e))?;

    let path = staged.path().to_path_buf();
    let result = web::block(move || model.predict_file(&path)).await;
    drop(staged);

    let prediction = match result {
        Ok(Ok(prediction)) => prediction,
        Ok(Err(e)) => {
            state.record_failed_analysis();
            return Err(AppError::internal("Audio analysis", format!("{:#}", e)));
        }
        Err(e) => {
            state.record_failed_analysis();
            return Err(AppError::internal("Audio analysis", e));
        }
    };

    state.record_prediction(ModelType::AudioCnn, &prediction.label);
    info!(
        filename = ?upload.filename,
        emotion = %prediction.label,
        confidence = prediction.confidence,
        "Audio emotion predicted"
    );

    Ok(HttpResponse::Ok().json(AnalysisResponse {
        success: true,
        emotion: prediction.label,
        confidence: to_percentage(prediction.confidence),
        filename: upload.filename,
        model_type: ModelType::AudioCnn,
    }))
}

/// Analyze emotion from an uploaded image file.
///
/// ## Endpoint: `POST /analyze/image`
///
/// ## Errors:
/// - 503 if the face model did not load at startup
/// - 400 for a non-`image/*` upload, a missing file or an oversize file
/// - 422 if no face could be classified
/// - 500 if the upload cannot be staged
pub async fn analyze_image(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    let span = info_span!("analyze_image", request_id = %Uuid::new_v4());
    image_analysis(state, payload).instrument(span).await
}

async fn image_analysis(state: web::Data<AppState>, mut payload: Multipart) -> AppResult<HttpResponse> {
    let model = state.models.image.get().ok_or_else(|| {
        AppError::ModelUnavailable("Image emotion model not available. Please check server logs.".to_string())
    })?;

    let limit = state.config.uploads.max_file_size_bytes;
    let upload = read_single(&mut payload, "file", limit).await?;
    ensure_size(&upload, limit)?;
    if !upload.has_mime_prefix("image/") {
        return Err(AppError::Validation(INVALID_IMAGE_TYPE.to_string()));
    }

    let prediction = match run_face_model(model, &upload, &state.staging_dir()).await {
        Ok(Some(prediction)) => prediction,
        Ok(None) => {
            state.record_no_face();
            return Err(AppError::NoDetection(NO_FACE.to_string()));
        }
        Err(e) => {
            state.record_failed_analysis();
            return Err(e);
        }
    };

    let emotion = prediction.label.to_lowercase();
    state.record_prediction(ModelType::FaceEmotion, &emotion);
    info!(
        filename = ?upload.filename,
        emotion = %emotion,
        confidence = prediction.confidence,
        "Face emotion predicted"
    );

    Ok(HttpResponse::Ok().json(AnalysisResponse {
        success: true,
        emotion,
        confidence: face_confidence(prediction.confidence),
        filename: upload.filename,
        model_type: ModelType::FaceEmotion,
    }))
}

/// Analyze emotions from multiple image files.
///
/// ## Endpoint: `POST /analyze/batch-images`
///
/// Files are processed one after another. A failure on one file becomes an
/// entry in `results` and does not stop the others:
///
/// ```json
/// {
///   "success": true,
///   "results": [
///     {"filename": "a.jpg", "success": true, "emotion": "happy", "confidence": 91.2},
///     {"filename": "b.txt", "success": false, "error": "Invalid file type"}
///   ],
///   "total_processed": 2,
///   "successful_analyses": 1
/// }
/// ```
pub async fn analyze_batch_images(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    let span = info_span!("analyze_batch_images", request_id = %Uuid::new_v4());
    batch_analysis(state, payload).instrument(span).await
}

async fn batch_analysis(state: web::Data<AppState>, mut payload: Multipart) -> AppResult<HttpResponse> {
    let model = state.models.image.get().ok_or_else(|| {
        AppError::ModelUnavailable("Image emotion model not available. Please check server logs.".to_string())
    })?;

    let uploads = &state.config.uploads;
    let files = read_batch(&mut payload, "files", uploads.max_batch_size, uploads.max_file_size_bytes).await?;
    let staging_dir = state.staging_dir();

    let mut results = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let item = analyze_batch_item(&state, model.clone(), file, &staging_dir).await;
        if let Some(error) = &item.error {
            warn!(index, filename = ?file.filename, error = %error, "Batch item failed");
        }
        results.push(item);
    }

    let successful_analyses = results.iter().filter(|r| r.success).count();
    info!(
        total = files.len(),
        successful = successful_analyses,
        "Batch image analysis finished"
    );

    Ok(HttpResponse::Ok().json(BatchResponse {
        success: true,
        total_processed: files.len(),
        successful_analyses,
        results,
    }))
}

async fn analyze_batch_item(
    state: &AppState,
    model: Arc<dyn FaceEmotionModel>,
    file: &UploadedFile,
    staging_dir: &Path,
) -> BatchItem {
    let filename = file.filename.clone();

    if !file.has_mime_prefix("image/") {
        return BatchItem::failed(filename, "Invalid file type");
    }
    if file.too_large {
        return BatchItem::failed(filename, "File too large");
    }

    match run_face_model(model, file, staging_dir).await {
        Ok(Some(prediction)) => {
            state.record_prediction(ModelType::FaceEmotion, &prediction.label.to_lowercase());
            BatchItem::succeeded(filename, &prediction)
        }
        Ok(None) => {
            state.record_no_face();
            BatchItem::failed(filename, "No face detected")
        }
        Err(e) => {
            tracing::error!(filename = ?file.filename, error = %e, "Batch item analysis failed");
            state.record_failed_analysis();
            BatchItem::failed(filename, "Image analysis failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::emotion::{AudioClassifier, EmotionScores};
    use crate::handlers::configure_routes;
    use crate::state::test_support::state_with;
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Mutex;

    const BOUNDARY: &str = "----emotion-test-boundary";

    /// `(field, filename, content type, body)` for each part
    fn multipart_body(parts: &[(&str, &str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, filename, content_type, data) in parts {
            write!(
                body,
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, field, filename, content_type
            )
            .unwrap();
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        write!(body, "--{}--\r\n", BOUNDARY).unwrap();
        body
    }

    fn upload_request(uri: &str, body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
    }

    /// Records every path it was asked about and whether the file existed at that moment.
    #[derive(Default)]
    struct Seen(Mutex<Vec<(PathBuf, bool)>>);

    impl Seen {
        fn record(&self, path: &Path) {
            self.0.lock().unwrap().push((path.to_path_buf(), path.exists()));
        }

        fn paths(&self) -> Vec<(PathBuf, bool)> {
            self.0.lock().unwrap().clone()
        }
    }

    struct FakeAudio {
        result: Result<Prediction, String>,
        seen: Seen,
    }

    impl AudioClassifier for FakeAudio {
        fn predict_file(&self, path: &Path) -> anyhow::Result<Prediction> {
            self.seen.record(path);
            self.result.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    /// Fails (→ no face) for uploads whose contents are `b"noface"`.
    struct FakeFaces {
        seen: Seen,
    }

    impl FaceEmotionModel for FakeFaces {
        fn predict(&self, path: &Path) -> anyhow::Result<EmotionScores> {
            self.seen.record(path);
            if std::fs::read(path)? == b"noface" {
                anyhow::bail!("Face could not be detected");
            }
            let mut scores = EmotionScores::new();
            scores.push("Angry", 1.5);
            scores.push("Happy", 87.654);
            scores.push("Neutral", 10.846);
            Ok(scores)
        }
    }

    struct Harness {
        state: AppState,
        staging: tempfile::TempDir,
    }

    impl Harness {
        fn new(audio: Option<Arc<dyn AudioClassifier>>, image: Option<Arc<dyn FaceEmotionModel>>) -> Self {
            let staging = tempfile::tempdir().unwrap();
            let mut config = AppConfig::default();
            config.uploads.temp_dir = Some(staging.path().to_path_buf());
            Self {
                state: state_with(config, audio, image),
                staging,
            }
        }

        fn staged_files_left(&self) -> usize {
            std::fs::read_dir(self.staging.path()).unwrap().count()
        }

        async fn send(&self, uri: &str, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
            let app = test::init_service(
                App::new()
                    .app_data(web::Data::new(self.state.clone()))
                    .configure(configure_routes),
            )
            .await;
            let resp = test::call_service(&app, upload_request(uri, body).to_request()).await;
            let status = resp.status();
            let json: serde_json::Value = test::read_body_json(resp).await;
            (status, json)
        }
    }

    fn fake_audio(result: Result<Prediction, String>) -> Arc<FakeAudio> {
        Arc::new(FakeAudio {
            result,
            seen: Seen::default(),
        })
    }

    fn fake_faces() -> Arc<FakeFaces> {
        Arc::new(FakeFaces { seen: Seen::default() })
    }

    #[actix_web::test]
    async fn test_audio_success_reports_percentage() {
        let audio = fake_audio(Ok(Prediction::new("happy", 0.87654)));
        let harness = Harness::new(Some(audio.clone()), None);

        let body = multipart_body(&[("file", "clip.wav", "audio/wav", b"RIFF")]);
        let (status, json) = harness.send("/analyze/audio", body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["emotion"], "happy");
        assert_eq!(json["confidence"].as_f64().unwrap() as f32, 87.65);
        assert_eq!(json["filename"], "clip.wav");
        assert_eq!(json["model_type"], "audio_cnn");

        let seen = audio.seen.paths();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].1, "file must exist while the model runs");
        assert!(seen[0].0.to_string_lossy().ends_with(".wav"));
        assert!(!seen[0].0.exists());
        assert_eq!(harness.staged_files_left(), 0);
    }

    #[actix_web::test]
    async fn test_audio_model_unavailable() {
        let harness = Harness::new(None, None);
        let body = multipart_body(&[("file", "clip.wav", "audio/wav", b"RIFF")]);
        let (status, json) = harness.send("/analyze/audio", body).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["type"], "model_unavailable");
    }

    #[actix_web::test]
    async fn test_audio_rejects_wrong_mime() {
        let audio = fake_audio(Ok(Prediction::new("happy", 0.9)));
        let harness = Harness::new(Some(audio.clone()), None);

        let body = multipart_body(&[("file", "face.png", "image/png", b"\x89PNG")]);
        let (status, json) = harness.send("/analyze/audio", body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], INVALID_AUDIO_TYPE);
        assert!(audio.seen.paths().is_empty());
    }

    #[actix_web::test]
    async fn test_audio_failure_cleans_up_and_hides_detail() {
        let audio = fake_audio(Err("mel spectrogram shape mismatch".to_string()));
        let harness = Harness::new(Some(audio.clone()), None);

        let body = multipart_body(&[("file", "clip.webm", "audio/webm", b"\x1aE\xdf\xa3")]);
        let (status, json) = harness.send("/analyze/audio", body).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["detail"], "Audio analysis failed");
        assert!(!json.to_string().contains("mismatch"));

        let seen = audio.seen.paths();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].1);
        assert_eq!(harness.staged_files_left(), 0);
        assert_eq!(harness.state.get_metrics_snapshot().failed_analyses, 1);
    }

    #[actix_web::test]
    async fn test_missing_file_field() {
        let audio = fake_audio(Ok(Prediction::new("happy", 0.9)));
        let harness = Harness::new(Some(audio), None);

        let body = multipart_body(&[("attachment", "clip.wav", "audio/wav", b"RIFF")]);
        let (status, _) = harness.send("/analyze/audio", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_oversize_upload_rejected() {
        let faces = fake_faces();
        let staging = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.uploads.temp_dir = Some(staging.path().to_path_buf());
        config.uploads.max_file_size_bytes = 8;
        let harness = Harness {
            state: state_with(config, None, Some(faces.clone())),
            staging,
        };

        let body = multipart_body(&[("file", "big.jpg", "image/jpeg", &[0u8; 64])]);
        let (status, json) = harness.send("/analyze/image", body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].as_str().unwrap().starts_with("File too large"));
        assert!(faces.seen.paths().is_empty());
    }

    #[actix_web::test]
    async fn test_image_success_lowercases_label() {
        let faces = fake_faces();
        let harness = Harness::new(None, Some(faces.clone()));

        let body = multipart_body(&[("file", "me.jpg", "image/jpeg", b"jpegdata")]);
        let (status, json) = harness.send("/analyze/image", body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["emotion"], "happy");
        assert_eq!(json["confidence"].as_f64().unwrap() as f32, 87.65);
        assert_eq!(json["model_type"], "deepface");
        assert_eq!(harness.staged_files_left(), 0);

        let metrics = harness.state.get_metrics_snapshot();
        assert_eq!(metrics.emotion_counts[&ModelType::FaceEmotion]["happy"], 1);
    }

    #[actix_web::test]
    async fn test_image_without_face_is_422() {
        let faces = fake_faces();
        let harness = Harness::new(None, Some(faces.clone()));

        let body = multipart_body(&[("file", "wall.jpg", "image/jpeg", b"noface")]);
        let (status, json) = harness.send("/analyze/image", body).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["detail"], NO_FACE);
        assert_eq!(json["error"]["type"], "no_detection");
        assert_eq!(faces.seen.paths().len(), 1);
        assert_eq!(harness.staged_files_left(), 0);
    }

    #[actix_web::test]
    async fn test_image_rejects_wrong_mime() {
        let harness = Harness::new(None, Some(fake_faces()));
        let body = multipart_body(&[("file", "clip.wav", "audio/wav", b"RIFF")]);
        let (status, json) = harness.send("/analyze/image", body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], INVALID_IMAGE_TYPE);
    }

    #[actix_web::test]
    async fn test_image_model_unavailable() {
        let harness = Harness::new(None, None);
        let body = multipart_body(&[("file", "me.jpg", "image/jpeg", b"jpegdata")]);
        let (status, _) = harness.send("/analyze/image", body).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_batch_model_unavailable() {
        let harness = Harness::new(None, None);
        let body = multipart_body(&[
            ("files", "a.jpg", "image/jpeg", b"face-a"),
            ("files", "b.jpg", "image/jpeg", b"face-b"),
        ]);
        let (status, json) = harness.send("/analyze/batch-images", body).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["type"], "model_unavailable");
        assert!(json.get("results").is_none());
    }

    #[actix_web::test]
    async fn test_image_staging_failure_is_500_without_detail() {
        let faces = fake_faces();
        let mut config = AppConfig::default();
        config.uploads.temp_dir = Some(PathBuf::from("/nonexistent/emotion-api-staging"));
        let state = state_with(config, None, Some(faces.clone()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure_routes),
        )
        .await;

        let body = multipart_body(&[("file", "me.jpg", "image/jpeg", b"jpegdata")]);
        let resp = test::call_service(&app, upload_request("/analyze/image", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["detail"], "Image analysis failed");
        assert_eq!(json["error"]["type"], "internal_error");
        let text = json.to_string();
        assert!(!text.contains("nonexistent"));
        assert!(!text.contains("No such file"));

        assert!(faces.seen.paths().is_empty());
        assert_eq!(state.get_metrics_snapshot().failed_analyses, 1);
    }

    #[actix_web::test]
    async fn test_batch_mixed_results_keep_order() {
        let faces = fake_faces();
        let harness = Harness::new(None, Some(faces.clone()));

        let body = multipart_body(&[
            ("files", "a.jpg", "image/jpeg", b"face-a"),
            ("files", "notes.txt", "text/plain", b"hello"),
            ("files", "wall.png", "image/png", b"noface"),
            ("files", "b.png", "image/png", b"face-b"),
        ]);
        let (status, json) = harness.send("/analyze/batch-images", body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["total_processed"], 4);
        assert_eq!(json["successful_analyses"], 2);

        let results = json["results"].as_array().unwrap();
        let filenames: Vec<&str> = results.iter().map(|r| r["filename"].as_str().unwrap()).collect();
        assert_eq!(filenames, vec!["a.jpg", "notes.txt", "wall.png", "b.png"]);

        assert_eq!(results[0]["success"], true);
        assert_eq!(results[0]["emotion"], "happy");
        assert_eq!(results[1]["error"], "Invalid file type");
        assert!(results[1].get("emotion").is_none());
        assert_eq!(results[2]["error"], "No face detected");
        assert_eq!(results[3]["success"], true);

        // The text file never reached the model
        assert_eq!(faces.seen.paths().len(), 3);
        assert!(faces.seen.paths().iter().all(|(_, existed)| *existed));
        assert_eq!(harness.staged_files_left(), 0);
    }

    #[actix_web::test]
    async fn test_batch_over_limit_rejected_before_processing() {
        let faces = fake_faces();
        let harness = Harness::new(None, Some(faces.clone()));

        let parts: Vec<(&str, &str, &str, &[u8])> = (0..11)
            .map(|_| ("files", "face.jpg", "image/jpeg", &b"face"[..]))
            .collect();
        let (status, json) = harness.send("/analyze/batch-images", multipart_body(&parts)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "Too many files. Maximum 10 images per batch.");
        assert!(faces.seen.paths().is_empty());
        assert_eq!(harness.staged_files_left(), 0);
    }

    #[actix_web::test]
    async fn test_batch_at_limit_processes_everything() {
        let faces = fake_faces();
        let harness = Harness::new(None, Some(faces.clone()));

        let parts: Vec<(&str, &str, &str, &[u8])> = (0..10)
            .map(|_| ("files", "face.jpg", "image/jpeg", &b"face"[..]))
            .collect();
        let (status, json) = harness.send("/analyze/batch-images", multipart_body(&parts)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_processed"], 10);
        assert_eq!(json["successful_analyses"], 10);
        assert_eq!(faces.seen.paths().len(), 10);
    }

    #[actix_web::test]
    async fn test_batch_staging_failure_is_item_level() {
        let faces = fake_faces();
        let mut config = AppConfig::default();
        config.uploads.temp_dir = Some(PathBuf::from("/nonexistent/emotion-api-staging"));
        let state = state_with(config, None, Some(faces.clone()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let body = multipart_body(&[
            ("files", "a.jpg", "image/jpeg", b"face-a"),
            ("files", "b.jpg", "image/jpeg", b"face-b"),
        ]);
        let resp = test::call_service(&app, upload_request("/analyze/batch-images", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["total_processed"], 2);
        assert_eq!(json["successful_analyses"], 0);
        for item in json["results"].as_array().unwrap() {
            assert_eq!(item["error"], "Image analysis failed");
        }
        assert!(faces.seen.paths().is_empty());
    }
}
