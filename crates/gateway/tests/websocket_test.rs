use bridge::{Detection, DetectionResult, ResultStatus};
use futures::{SinkExt, Stream, StreamExt};
use gateway::{App, Config};
use image::{ImageFormat, Rgb, RgbImage};
use inference::{EngineError, InferenceEngine, InferenceOutput};
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message};

struct CountingEngine;

impl InferenceEngine for CountingEngine {
    fn infer(&mut self, image: &RgbImage, _: f32) -> Result<InferenceOutput, EngineError> {
        Ok(InferenceOutput {
            detections: vec![Detection {
                x: 1,
                y: 2,
                width: image.width() as i32,
                height: image.height() as i32,
                label: "person".into(),
                class_id: 0,
                confidence: 0.9,
            }],
            elapsed_ms: 4.2,
        })
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([0, 128, 255]));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

fn test_config() -> Config {
    let mut config: Config = serde_json::from_value(serde_json::json!({
        "log_level": "info",
        "environment": "development",
        "server": { "host": "127.0.0.1", "port": 0 },
        "session": {},
        "queue": { "capacity": 16 },
        "broadcast": { "capacity": 16 },
        "worker": { "count": 1, "dequeue_timeout_ms": 20 },
        "model": {}
    }))
    .unwrap();
    config.session.max_inflight = 4;
    config
}

async fn next_result<S>(stream: &mut S) -> DetectionResult
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("message within deadline")
            .expect("connection open")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_websocket_session_end_to_end() {
    let app = App::build(test_config(), |_| Ok(CountingEngine))
        .await
        .unwrap();
    let addr = app.local_addr().unwrap();
    let state = app.state();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(app.run_until(async move {
        stop_rx.await.ok();
    }));

    let (socket, _) = connect_async(format!("ws://{}/ws/stream", addr))
        .await
        .unwrap();
    let (mut sink, mut stream) = socket.split();

    sink.send(Message::Binary(png(12, 6))).await.unwrap();
    let first = next_result(&mut stream).await;
    assert_eq!(first.sequence, 1);
    assert_eq!(first.status, ResultStatus::Success);
    assert!(first.frame_id.ends_with(":1"));
    assert_eq!(first.num_detections, 1);
    assert_eq!(first.detections[0].width, 12);
    assert_eq!(first.inference_time_ms, 4.2);

    let session_id = first.session_id.clone();
    assert_eq!(state.registry.len(), 1);
    assert!(state.registry.lookup(&session_id).is_some());

    // Text is a protocol error, not a disconnect
    sink.send(Message::Text("hello".into())).await.unwrap();
    sink.send(Message::Binary(png(5, 5))).await.unwrap();
    let second = next_result(&mut stream).await;
    assert_eq!(second.sequence, 2);
    assert_eq!(second.frame_id, format!("{}:2", session_id));

    let info = state.registry.lookup(&session_id).unwrap();
    assert_eq!(info.stats.frames_rejected, 1);
    assert_eq!(info.stats.frames_sent, 2);

    sink.send(Message::Close(None)).await.unwrap();
    drop(sink);
    drop(stream);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !state.registry.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "session never unregistered");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(state.registry.lookup(&session_id).is_none());

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_undecodable_frame_returns_error_result() {
    let app = App::build(test_config(), |_| Ok(CountingEngine))
        .await
        .unwrap();
    let addr = app.local_addr().unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(app.run_until(async move {
        stop_rx.await.ok();
    }));

    let (mut socket, _) = connect_async(format!("ws://{}/ws/stream", addr))
        .await
        .unwrap();

    socket
        .send(Message::Binary(b"not an image".to_vec()))
        .await
        .unwrap();
    let result = next_result(&mut socket).await;

    assert_eq!(result.sequence, 1);
    assert_eq!(result.status, ResultStatus::Error);
    assert!(result.detections.is_empty());
    assert!(result.message.is_some());

    socket.close(None).await.unwrap();
    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_oversized_frame_is_dropped_without_disconnect() {
    let mut config = test_config();
    config.session.max_frame_bytes = 1000;
    let app = App::build(config, |_| Ok(CountingEngine)).await.unwrap();
    let addr = app.local_addr().unwrap();
    let state = app.state();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(app.run_until(async move {
        stop_rx.await.ok();
    }));

    let (mut socket, _) = connect_async(format!("ws://{}/ws/stream", addr))
        .await
        .unwrap();

    socket.send(Message::Binary(vec![0u8; 2500])).await.unwrap();
    socket.send(Message::Binary(png(8, 8))).await.unwrap();

    let result = next_result(&mut socket).await;
    assert_eq!(result.sequence, 1, "oversized frame must not consume a sequence");
    assert_eq!(result.status, ResultStatus::Success);

    let info = state.registry.lookup(&result.session_id).unwrap();
    assert_eq!(info.stats.frames_rejected, 1);
    assert_eq!(info.stats.frames_sent, 1);

    socket.close(None).await.unwrap();
    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
