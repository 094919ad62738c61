//! Tests for the REST client against a canned local HTTP responder:
//! request paths, query strings, JSON bodies and error mapping.

use helix_client::client::{HelixClient, MusicRequest};
use helix_client::error::HelixError;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// A captured HTTP request: request line plus body.
#[derive(Debug)]
struct Captured {
    request_line: String,
    body: String,
}

/// Answer exactly one request with `status` and `body`, reporting what was asked.
async fn one_shot(status: u16, body: &'static str) -> (String, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        // Read headers, then as much body as Content-Length announces.
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|l| {
                let lower = l.to_ascii_lowercase();
                lower
                    .strip_prefix("content-length:")
                    .and_then(|v| v.trim().parse::<usize>().ok())
            })
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let reason = if status == 200 { "OK" } else { "Error" };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;

        let _ = tx.send(Captured {
            request_line: head.lines().next().unwrap_or_default().to_string(),
            body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
        });
    });

    (format!("http://{addr}"), rx)
}

#[tokio::test]
async fn get_ucf_hits_ucf_path() {
    let (base, captured) = one_shot(200, r#"{"harmony":0.5,"prana":0.4}"#).await;
    let client = HelixClient::new(base);
    let ucf = client.get_ucf().await.unwrap();
    assert_eq!(ucf["harmony"], 0.5);
    assert_eq!(captured.await.unwrap().request_line, "GET /ucf HTTP/1.1");
}

#[tokio::test]
async fn manifest_uses_well_known_path() {
    let (base, captured) = one_shot(200, "{}").await;
    HelixClient::new(base).get_manifest().await.unwrap();
    assert_eq!(
        captured.await.unwrap().request_line,
        "GET /.well-known/helix.json HTTP/1.1"
    );
}

#[tokio::test]
async fn eye_sends_context_query() {
    let (base, captured) = one_shot(200, "{}").await;
    HelixClient::new(base)
        .get_eye_of_consciousness("meditation")
        .await
        .unwrap();
    assert_eq!(
        captured.await.unwrap().request_line,
        "GET /mandelbrot/eye?context=meditation HTTP/1.1"
    );
}

#[tokio::test]
async fn sacred_point_without_context_has_no_query() {
    let (base, captured) = one_shot(200, "{}").await;
    HelixClient::new(base)
        .get_sacred_point("eye", None)
        .await
        .unwrap();
    assert_eq!(
        captured.await.unwrap().request_line,
        "GET /mandelbrot/sacred/eye HTTP/1.1"
    );
}

#[tokio::test]
async fn ritual_step_sends_total_steps() {
    let (base, captured) = one_shot(200, "{}").await;
    HelixClient::new(base).get_ritual_step(54, 108).await.unwrap();
    assert_eq!(
        captured.await.unwrap().request_line,
        "GET /mandelbrot/ritual/54?total_steps=108 HTTP/1.1"
    );
}

#[tokio::test]
async fn generate_posts_coordinate_body() {
    let (base, captured) = one_shot(200, r#"{"in_set":true}"#).await;
    let result = HelixClient::new(base)
        .generate_ucf_from_coordinate(-0.75, 0.25, Some("exploration"))
        .await
        .unwrap();
    assert_eq!(result["in_set"], true);

    let req = captured.await.unwrap();
    assert_eq!(req.request_line, "POST /mandelbrot/generate HTTP/1.1");
    let body: Value = serde_json::from_str(&req.body).unwrap();
    assert_eq!(body, json!({"real": -0.75, "imag": 0.25, "context": "exploration"}));
}

#[tokio::test]
async fn music_omits_unset_fields() {
    let (base, captured) = one_shot(200, "{}").await;
    let request = MusicRequest {
        prompt: "om".into(),
        duration: Some(30),
        model_id: None,
    };
    HelixClient::new(base).generate_music(&request).await.unwrap();
    let body: Value = serde_json::from_str(&captured.await.unwrap().body).unwrap();
    assert_eq!(body, json!({"prompt": "om", "duration": 30}));
}

#[tokio::test]
async fn zapier_telemetry_posts_without_body() {
    let (base, captured) = one_shot(200, r#"{"status":"sent"}"#).await;
    let result = HelixClient::new(base).send_telemetry_to_zapier().await.unwrap();
    assert_eq!(result["status"], "sent");
    let req = captured.await.unwrap();
    assert_eq!(req.request_line, "POST /api/zapier/telemetry HTTP/1.1");
    assert!(req.body.is_empty());
}

#[tokio::test]
async fn non_2xx_maps_to_http_error() {
    let (base, _captured) = one_shot(503, r#"{"error":"down"}"#).await;
    let err = HelixClient::new(base).get_status().await.unwrap_err();
    match err {
        HelixError::Http { status, url } => {
            assert_eq!(status, 503);
            assert!(url.ends_with("/status"), "url: {url}");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_body_maps_to_json_error() {
    let (base, _captured) = one_shot(200, "<html>oops</html>").await;
    let err = HelixClient::new(base).get_agents().await.unwrap_err();
    assert!(matches!(err, HelixError::Json { .. }), "got {err:?}");
}

#[tokio::test]
async fn refused_connection_maps_to_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let err = HelixClient::new(format!("http://{addr}")).get_ucf().await.unwrap_err();
    assert!(matches!(err, HelixError::Connect { .. }), "got {err:?}");
}

#[tokio::test]
async fn harmony_below_threshold_is_false() {
    let (base, _captured) = one_shot(200, r#"{"harmony":0.3}"#).await;
    assert!(!HelixClient::new(base).check_harmony_threshold(0.40).await.unwrap());
}

#[tokio::test]
async fn missing_harmony_passes_threshold() {
    let (base, _captured) = one_shot(200, r#"{"prana":0.3}"#).await;
    assert!(HelixClient::new(base).check_harmony_threshold(0.40).await.unwrap());
}

#[tokio::test]
async fn measure_harmony_reports_the_value_it_checked() {
    let (base, captured) = one_shot(200, r#"{"harmony":0.25}"#).await;
    let reading = HelixClient::new(base).measure_harmony(0.40).await.unwrap();
    assert!((reading.harmony - 0.25).abs() < 1e-9);
    assert_eq!(reading.threshold, 0.40);
    assert!(!reading.is_healthy());
    assert_eq!(captured.await.unwrap().request_line, "GET /ucf HTTP/1.1");
}
