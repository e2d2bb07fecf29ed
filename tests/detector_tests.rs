//! Mock HTTP tests for the remote face detector.

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use absence_capture::detect::{
    encode_png, DetectError, DetectorConfig, DetectorRuntime, FaceDetector, RemoteDetector,
};
use absence_capture::media::Frame;

fn detector_for(server: &MockServer, runtime: DetectorRuntime) -> RemoteDetector {
    RemoteDetector::new(DetectorConfig {
        runtime,
        solution_path: format!("{}/face_detection", server.uri()),
        ..DetectorConfig::cdn()
    })
    .expect("Failed to create detector")
}

#[test]
fn test_encode_png_has_signature() {
    let png = encode_png(&Frame::solid(3, 2, [10, 20, 30])).unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
}

#[test]
fn test_encode_png_rejects_short_buffer() {
    let frame = Frame::rgb(4, 4, vec![0; 10]);
    assert!(matches!(encode_png(&frame), Err(DetectError::EncodeError(_))));
}

#[tokio::test]
async fn test_estimate_faces_posts_png_and_parses_faces() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/face_detection/estimate"))
        .and(query_param("model", "MediaPipeFaceDetector"))
        .and(query_param("runtime", "tfjs"))
        .and(query_param("maxFaces", "1"))
        .and(header("Content-Type", "image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "faces": [{
                "box": {"xMin": 10.0, "yMin": 20.0, "xMax": 110.0, "yMax": 140.0, "width": 100.0, "height": 120.0},
                "keypoints": [{"x": 40.0, "y": 60.0, "name": "rightEye"}],
                "score": 0.97
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let detector = detector_for(&server, DetectorRuntime::Tfjs);
    let faces = detector
        .estimate_faces(&Frame::solid(8, 6, [90, 90, 90]))
        .await
        .unwrap();

    assert_eq!(faces.len(), 1);
    assert_eq!(faces[0].bounding_box.width, 100.0);
    assert_eq!(faces[0].keypoints[0].name.as_deref(), Some("rightEye"));
    assert_eq!(faces[0].score, Some(0.97));
}

#[tokio::test]
async fn test_no_faces() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"faces": []})))
        .mount(&server)
        .await;

    let detector = detector_for(&server, DetectorRuntime::Mediapipe);
    let faces = detector
        .estimate_faces(&Frame::solid(2, 2, [0, 0, 0]))
        .await
        .unwrap();
    assert!(faces.is_empty());
}

#[tokio::test]
async fn test_server_error_returns_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;

    let detector = detector_for(&server, DetectorRuntime::Mediapipe);
    let err = detector
        .estimate_faces(&Frame::solid(2, 2, [0, 0, 0]))
        .await
        .unwrap_err();

    match err {
        DetectError::ApiError(msg) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("model crashed"));
        }
        other => panic!("expected ApiError, got {:?}", other),
    }
}
