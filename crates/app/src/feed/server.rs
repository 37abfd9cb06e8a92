//! Actix Web frame server answering viewer polls.
//!
//! The server runs on a dedicated thread to keep the capture hot path free
//! from Actix runtime concerns. Each handler reads the frame slot once,
//! writes the response, and retains nothing afterwards, so any number of
//! concurrent polls get consistent snapshots without ever blocking the
//! publisher.

use std::sync::Arc;

use actix_web::{App, HttpResponse, HttpServer, http::header, web};
use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::error;

use crate::feed::{data::FrameSlot, telemetry};

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    pub(crate) slot: Arc<FrameSlot>,
}

/// Handle for the frame server thread.
#[derive(Default)]
pub(crate) struct FrameServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl FrameServer {
    /// Signal the server to stop and block until the thread exits.
    pub(crate) fn stop(self) {
        if let Some(tx) = self.shutdown {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle {
            let _ = handle.join();
        }
    }
}

#[derive(Deserialize)]
struct FrameQuery {
    /// Cache-busting token appended by polling viewers; accepted and ignored.
    #[serde(rename = "t")]
    _cache_buster: Option<String>,
}

/// Spawn the frame server thread and return a handle that can stop it.
pub(crate) fn spawn_frame_server(slot: Arc<FrameSlot>, bind: String) -> Result<FrameServer> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = telemetry::spawn_thread("feed-http-server", move || {
        if let Err(err) = actix_web::rt::System::new().block_on(async move {
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(ServerState { slot: slot.clone() }))
                    .route("/frame.jpg", web::get().to(frame_handler))
                    .route("/metrics", web::get().to(metrics_handler))
            })
            .bind(bind.as_str())?
            .run();

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        }) {
            error!("HTTP server error: {err}");
        }
    })
    .context("failed to spawn frame server thread")?;
    Ok(FrameServer {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}

/// Return the latest encoded frame, or 503 until the first publish.
async fn frame_handler(
    _query: web::Query<FrameQuery>,
    state: web::Data<ServerState>,
) -> HttpResponse {
    metrics::counter!("feed_http_requests_total", "endpoint" => "frame").increment(1);
    match state.slot.read() {
        Some(frame) => HttpResponse::Ok()
            .insert_header((header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"))
            .insert_header((header::PRAGMA, "no-cache"))
            .insert_header((header::EXPIRES, "0"))
            .insert_header(("X-Frame-Sequence", frame.sequence.to_string()))
            .insert_header(("X-Frame-Timestamp", frame.timestamp_ms.to_string()))
            .content_type(frame.content_type)
            .body(frame.payload.clone()),
        None => HttpResponse::ServiceUnavailable()
            .insert_header((header::RETRY_AFTER, "1"))
            .body("no frame captured yet"),
    }
}

/// Prometheus text exposition rendered from the local recorder.
async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{dev::ServiceResponse, http::StatusCode, test};

    use crate::feed::data::EncodedFrame;

    use super::*;

    async fn poll(slot: Arc<FrameSlot>, uri: &str) -> ServiceResponse {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ServerState { slot }))
                .route("/frame.jpg", web::get().to(frame_handler)),
        )
        .await;
        test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await
    }

    fn jpeg_frame(sequence: u64) -> EncodedFrame {
        EncodedFrame {
            payload: vec![0xFF, 0xD8, sequence as u8, 0xFF, 0xD9],
            content_type: "image/jpeg",
            timestamp_ms: 1_700_000_000_000 + sequence as i64,
            sequence,
        }
    }

    #[actix_web::test]
    async fn returns_503_before_first_publish() {
        let resp = poll(Arc::new(FrameSlot::new()), "/frame.jpg").await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            resp.headers().get(header::RETRY_AFTER).expect("retry-after"),
            "1"
        );
    }

    #[actix_web::test]
    async fn serves_latest_frame_with_cache_defeating_headers() {
        let slot = Arc::new(FrameSlot::new());
        slot.publish(jpeg_frame(9));

        let resp = poll(slot, "/frame.jpg").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let headers = resp.headers().clone();
        assert_eq!(headers.get(header::CONTENT_TYPE).expect("content-type"), "image/jpeg");
        assert_eq!(
            headers.get(header::CACHE_CONTROL).expect("cache-control"),
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(headers.get(header::PRAGMA).expect("pragma"), "no-cache");
        assert_eq!(headers.get(header::EXPIRES).expect("expires"), "0");
        assert_eq!(headers.get("X-Frame-Sequence").expect("sequence"), "9");
        assert_eq!(
            headers.get("X-Frame-Timestamp").expect("timestamp"),
            "1700000000009"
        );

        let body = test::read_body(resp).await;
        assert_eq!(body.as_ref(), &[0xFF, 0xD8, 9, 0xFF, 0xD9]);
    }

    #[actix_web::test]
    async fn cache_buster_query_is_accepted_and_ignored() {
        let slot = Arc::new(FrameSlot::new());
        slot.publish(jpeg_frame(1));

        let resp = poll(slot.clone(), "/frame.jpg?t=1712345678901").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let plain = test::read_body(poll(slot, "/frame.jpg").await).await;
        let busted = test::read_body(resp).await;
        assert_eq!(plain, busted);
    }

    #[actix_web::test]
    async fn repeated_polls_without_publish_return_identical_frames() {
        let slot = Arc::new(FrameSlot::new());
        slot.publish(jpeg_frame(4));

        let first = poll(slot.clone(), "/frame.jpg").await;
        let second = poll(slot, "/frame.jpg").await;
        assert_eq!(
            first.headers().get("X-Frame-Sequence"),
            second.headers().get("X-Frame-Sequence")
        );
        assert_eq!(
            test::read_body(first).await,
            test::read_body(second).await
        );
    }

    #[actix_web::test]
    async fn serves_latest_frame_after_supersession() {
        let slot = Arc::new(FrameSlot::new());
        slot.publish(jpeg_frame(1));
        slot.publish(jpeg_frame(2));

        let resp = poll(slot, "/frame.jpg").await;
        assert_eq!(resp.headers().get("X-Frame-Sequence").expect("sequence"), "2");
    }
}
