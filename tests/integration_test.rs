use std::{io::Cursor, sync::Arc};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::prelude::*;
use tower::ServiceExt;

use patchseg_rs::{
    codec,
    mocks::ConstantScorer,
    server, Config, Pipeline, ProbabilityMap, ScoringModel,
};

// Mock scorer defined locally: foreground on the left half of the frame.
#[derive(Debug, Clone)]
struct HalfFrameScorer {
    config: Config,
}

impl ScoringModel for HalfFrameScorer {
    fn score(&self, _patches: ArrayView3<'_, f32>) -> patchseg_rs::Result<ProbabilityMap> {
        let size = self.config.image_size as usize;
        Ok(Array2::from_shape_fn((size, size), |(_, x)| {
            if x < size / 2 {
                1.0
            } else {
                0.0
            }
        }))
    }

    fn image_size(&self) -> u32 {
        self.config.image_size
    }
}

fn png_bytes(width: u32, height: u32, pixel: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(pixel));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn multipart_body(field_name: &str, payload: &[u8]) -> (String, Vec<u8>) {
    let boundary = "patchseg-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field_name}\"; \
             filename=\"upload.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

fn segment_request(field_name: &str, payload: &[u8]) -> Request<Body> {
    let (content_type, body) = multipart_body(field_name, payload);
    Request::builder()
        .method("POST")
        .uri("/api/segment")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap()
}

#[test]
fn overlay_keeps_arbitrary_input_dimensions() {
    let config = Config::default();
    let pipeline = Pipeline::new(ConstantScorer::new(0.7, config), config);

    for (height, width) in [(1, 1), (3, 500), (131, 97)] {
        let input = Array3::from_elem((height, width, 3), 128u8);
        let output = pipeline.segment_image(&input).unwrap();
        assert_eq!(output.dim(), (height, width, 3));
    }
}

#[test]
fn half_frame_mask_highlights_only_the_left_half() {
    let config = Config::default();
    let pipeline = Pipeline::new(HalfFrameScorer { config }, config);

    let input = Array3::from_elem((256, 256, 3), 100u8);
    let output = pipeline.segment_image(&input).unwrap();

    // 100·0.7 = 70 everywhere; the left half gets 255·0.3 added in red
    assert_eq!(output[[128, 10, 0]], 70);
    assert_eq!(output[[128, 10, 1]], 70);
    assert_eq!(output[[128, 10, 2]], 147);
    assert_eq!(output[[128, 200, 0]], 70);
    assert_eq!(output[[128, 200, 1]], 70);
    assert_eq!(output[[128, 200, 2]], 70);
}

#[tokio::test]
async fn segment_endpoint_returns_png_overlay() {
    let config = Config::default();
    let app = server::router(Arc::new(Pipeline::new(ConstantScorer::new(1.0, config), config)));

    let response = app
        .oneshot(segment_request("image", &png_bytes(64, 48, [0, 0, 0])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let overlay = codec::decode(&body).unwrap();
    assert_eq!(overlay.dim(), (48, 64, 3));
    // black input, full foreground: translucent red everywhere
    assert_eq!(overlay[[0, 0, 0]], 0);
    assert_eq!(overlay[[0, 0, 1]], 0);
    assert_eq!(overlay[[0, 0, 2]], 77);
}

#[tokio::test]
async fn missing_upload_field_is_a_client_error() {
    let config = Config::default();
    let app = server::router(Arc::new(Pipeline::new(ConstantScorer::new(0.0, config), config)));

    let response = app
        .oneshot(segment_request("file", &png_bytes(8, 8, [1, 2, 3])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], br#"{"error":"No file uploaded"}"#);
}

#[tokio::test]
async fn undecodable_upload_is_a_server_error() {
    let config = Config::default();
    let app = server::router(Arc::new(Pipeline::new(ConstantScorer::new(0.0, config), config)));

    let response = app
        .oneshot(segment_request("image", b"definitely not an image"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(parsed["error"].as_str().unwrap().contains("image"));
}

#[tokio::test]
async fn server_keeps_serving_after_a_processing_error() {
    let config = Config::default();
    let app = server::router(Arc::new(Pipeline::new(ConstantScorer::new(0.0, config), config)));

    let failed = app
        .clone()
        .oneshot(segment_request("image", b"garbage"))
        .await
        .unwrap();
    assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let ok = app
        .oneshot(segment_request("image", &png_bytes(16, 16, [9, 9, 9])))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
}

#[test]
fn http_and_file_paths_produce_identical_overlays() {
    let config = Config::default();
    let pipeline = Pipeline::new(ConstantScorer::new(1.0, config), config);

    let upload = png_bytes(32, 32, [10, 20, 30]);
    let via_bytes = pipeline.segment_bytes(&upload).unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    let input_path = dir.path().join("input.png");
    let output_path = dir.path().join("output.png");
    std::fs::write(&input_path, &upload).unwrap();

    let image = codec::read_image(&input_path).unwrap();
    let overlay = pipeline.segment_image(&image).unwrap();
    codec::write_image(&output_path, &overlay).unwrap();

    let from_file = codec::decode(&std::fs::read(&output_path).unwrap()).unwrap();
    let from_http = codec::decode(&via_bytes).unwrap();
    assert_eq!(from_file, from_http);
}
