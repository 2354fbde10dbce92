use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use base64::Engine;
use image::{ImageFormat, Rgba, RgbaImage};
use photo_classify::{
    models::{Classification, ClassificationResult, Classifier, ModelManager, ModelSelector},
    web::{create_app, AppState},
    Config, ProcessedImage, Result,
};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct LabelClassifier;

impl Classifier for LabelClassifier {
    fn model(&self) -> ModelSelector {
        ModelSelector::ResNet50
    }

    fn classify(&self, image: &ProcessedImage) -> Result<ClassificationResult> {
        let label = format!("{}x{}", image.width(), image.height());
        Ok(ClassificationResult::new(vec![
            Classification::new(label, 0.9),
            Classification::new("other", 0.1),
        ]))
    }
}

fn app() -> Router {
    let config = Config::new("127.0.0.1:0".into(), "unused".into(), Some(1), false)
        .unwrap()
        .with_default_model(ModelSelector::ResNet50);
    let classifier: Arc<dyn Classifier> = Arc::new(LabelClassifier);
    let manager = Arc::new(ModelManager::with_classifiers(config.clone(), vec![classifier]));
    create_app(AppState::new(config, manager))
}

fn png_base64(width: u32, height: u32) -> String {
    let image = RgbaImage::from_pixel(width, height, Rgba([30, 60, 90, 255]));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    base64::engine::general_purpose::STANDARD.encode(buffer.into_inner())
}

async fn post_json(app: Router, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/classify")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_classify_json_default_preprocessing() {
    let (status, body) = post_json(app(), json!({ "image": png_base64(448, 300) })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["label"], "224x224");
    assert_eq!(body["data"]["message"], "This might be a 224x224\nconf:0.9");
    assert_eq!(body["data"]["model"], "resnet50");
    assert!(body["data"].get("fallback").is_none());
}

#[tokio::test]
async fn test_classify_json_explicit_crop_and_image() {
    let (status, body) = post_json(
        app(),
        json!({
            "image": png_base64(100, 100),
            "crop": {"x": 10, "y": 10, "width": 50, "height": 40},
            "return_image": true
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["label"], "50x40");
    assert_eq!(body["data"]["width"], 50);

    let encoded = body["data"]["processed_image"].as_str().unwrap();
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (50, 40));
}

#[tokio::test]
async fn test_classify_json_bad_scale_falls_back() {
    let (status, body) = post_json(
        app(),
        json!({ "image": png_base64(64, 48), "scale": -2.0 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["label"], "64x48");
    assert_eq!(body["data"]["fallback"]["kind"], "preprocessing_failed");
}

#[tokio::test]
async fn test_unavailable_model_returns_service_unavailable() {
    let (status, body) = post_json(
        app(),
        json!({ "image": png_base64(32, 32), "model": "squeezenet" }),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "MODEL_LOAD_ERROR");
    assert_eq!(body["error"]["display"], "Error, could not classify");
}

#[tokio::test]
async fn test_empty_image_rejected() {
    let (status, body) = post_json(app(), json!({ "image": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_multipart_upload() {
    let image = RgbaImage::from_pixel(80, 60, Rgba([1, 2, 3, 255]));
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png).unwrap();

    let boundary = "XBOUNDARYX";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"preprocess\"\r\n\r\nfalse\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.png\"\r\n\
             Content-Type: image/png\r\n\r\n",
            b = boundary
        )
        .as_bytes(),
    );
    body.extend_from_slice(&png.into_inner());
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/classify/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["label"], "80x60");
}

#[tokio::test]
async fn test_health_and_info() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app()
        .oneshot(Request::builder().uri("/api/info").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    let models = body["models"]["models"].as_array().unwrap();
    assert_eq!(models.len(), 3);
    let loaded: Vec<_> = models
        .iter()
        .filter(|m| m["loaded"] == true)
        .map(|m| m["model"].as_str().unwrap())
        .collect();
    assert_eq!(loaded, vec!["resnet50"]);
}

/// 慢速分类器，记录同时进行的推理数峰值
#[derive(Default)]
struct SlowClassifier {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Classifier for SlowClassifier {
    fn model(&self) -> ModelSelector {
        ModelSelector::ResNet50
    }

    fn classify(&self, _image: &ProcessedImage) -> Result<ClassificationResult> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(1500));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(ClassificationResult::new(vec![Classification::new("slow", 0.5)]))
    }
}

#[tokio::test]
async fn test_timed_out_requests_still_count_against_job_limit() {
    let mut config = Config::new("127.0.0.1:0".into(), "unused".into(), Some(1), false)
        .unwrap()
        .with_default_model(ModelSelector::ResNet50);
    config.server_config.request_timeout = 1;
    config.server_config.max_concurrent_jobs = 1;

    let slow = Arc::new(SlowClassifier::default());
    let classifier: Arc<dyn Classifier> = Arc::clone(&slow) as Arc<dyn Classifier>;
    let manager = Arc::new(ModelManager::with_classifiers(config.clone(), vec![classifier]));
    let app = create_app(AppState::new(config, manager));

    for _ in 0..3 {
        let request = Request::builder()
            .method("POST")
            .uri("/classify")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "image": png_base64(16, 16), "preprocess": false }).to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
}
