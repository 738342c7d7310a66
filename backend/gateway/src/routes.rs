//! Route handlers and the error-to-status mapping.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use uuid::Uuid;

use vidwatch_core::{LogEvent, RawSessionConfig, SessionEvent, SessionSnapshot, WatchError};
use vidwatch_session::SessionRegistry;

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<SessionRegistry>,
}

/// Build the Axum router with all API routes.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/session/start", post(start_session))
        .route("/session/{id}/stop", post(stop_session))
        .route("/session/{id}/status", get(session_status))
        .route("/session/{id}/events", get(session_events))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error wrapper mapping the domain taxonomy onto HTTP statuses.
pub struct ApiError(WatchError);

impl From<WatchError> for ApiError {
    fn from(error: WatchError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            WatchError::Validation { field, .. } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.0.to_string(), "field": field }),
            ),
            WatchError::InvalidProxyUrl(_) => {
                (StatusCode::BAD_REQUEST, json!({ "error": self.0.to_string() }))
            }
            WatchError::UnknownSession(_) => {
                (StatusCode::NOT_FOUND, json!({ "error": self.0.to_string() }))
            }
            WatchError::AlreadyRunning => {
                (StatusCode::CONFLICT, json!({ "error": self.0.to_string() }))
            }
            WatchError::ProxyUnavailable(_)
            | WatchError::NavigationTimeout(_)
            | WatchError::DriverCrashed(_)
            | WatchError::Other(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.0.to_string() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Health check endpoint.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "vidwatch",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Validate the submitted config, register a session, and kick it off.
///
/// The start sequence (proxy resolution, page open) runs in the background;
/// callers follow progress through the status and events endpoints.
async fn start_session(
    State(state): State<GatewayState>,
    Json(raw): Json<RawSessionConfig>,
) -> Result<Json<Value>, ApiError> {
    let config = raw.validate()?;
    let controller = state.registry.create(config).await?;
    let session_id = controller.id();

    tokio::spawn(async move {
        if let Err(e) = controller.start().await {
            warn!(session = %session_id, error = %e, "session failed to start");
        }
    });

    Ok(Json(json!({ "sessionId": session_id })))
}

/// Idempotent stop: 200 always for a known session, no-op when terminal.
async fn stop_session(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let controller = state.registry.get(id).await?;
    Ok(Json(controller.stop()))
}

async fn session_status(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let controller = state.registry.get(id).await?;
    Ok(Json(controller.status()))
}

#[derive(Debug, Default, Deserialize)]
struct EventsQuery {
    /// Prepend the full buffered log history before live events.
    #[serde(default)]
    replay: bool,
}

/// Server-sent events: session log events in emission order.
async fn session_events(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let controller = state.registry.get(id).await?;
    let reporter = Arc::clone(controller.reporter());

    // Subscribe before snapshotting history so no event falls in the gap.
    let rx = reporter.subscribe();
    let history = if query.replay {
        reporter.replay()
    } else {
        Vec::new()
    };

    let replayed = futures::stream::iter(
        history
            .into_iter()
            .map(|event| Ok::<_, Infallible>(log_frame(&event))),
    );
    let live = BroadcastStream::new(rx).filter_map(|item| async move {
        match item {
            Ok(SessionEvent::Log(event)) => Some(Ok(log_frame(&event))),
            Ok(SessionEvent::State(snapshot)) => Some(Ok(state_frame(&snapshot))),
            // The subscriber fell behind and its oldest events were dropped.
            Err(BroadcastStreamRecvError::Lagged(_)) => None,
        }
    });

    Ok(Sse::new(replayed.chain(live)).keep_alive(KeepAlive::default()))
}

fn log_frame(event: &LogEvent) -> SseEvent {
    SseEvent::default()
        .event("log")
        .data(serde_json::to_string(event).unwrap_or_default())
}

fn state_frame(snapshot: &SessionSnapshot) -> SseEvent {
    SseEvent::default()
        .event("state")
        .data(serde_json::to_string(snapshot).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{Body, BodyDataStream};
    use axum::http::Request;
    use tower::ServiceExt;
    use vidwatch_config::RuntimeConfig;
    use vidwatch_driver::MockDriver;

    fn router() -> Router {
        let registry = Arc::new(SessionRegistry::new(
            RuntimeConfig::default(),
            Arc::new(MockDriver::new()),
        ));
        build_router(GatewayState { registry })
    }

    fn start_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/session/start")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn valid_body() -> Value {
        json!({
            "video-url": "https://example.com/v",
            "watch-time": 60,
            "proxy-type": "custom",
            "custom-proxy": "socks5://192.0.2.1:1080",
        })
    }

    async fn wait_for_status(app: &Router, id: &str, wanted: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let response = app
                    .clone()
                    .oneshot(
                        Request::get(format!("/session/{id}/status"))
                            .body(Body::empty())
                            .unwrap(),
                    )
                    .await
                    .unwrap();
                if body_json(response).await["status"] == wanted {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("session never reached {wanted}"));
    }

    async fn read_frames_until(frames: &mut BodyDataStream, seen: &mut String, needle: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !seen.contains(needle) {
                let chunk = frames
                    .next()
                    .await
                    .expect("event stream ended early")
                    .unwrap();
                seen.push_str(std::str::from_utf8(&chunk).unwrap());
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no frame containing {needle:?} arrived"));
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = router()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_config_yields_400_with_field() {
        let mut body = valid_body();
        body["watch-time"] = json!(5);
        let response = router().oneshot(start_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let detail = body_json(response).await;
        assert_eq!(detail["field"], "watch-time");
    }

    #[tokio::test]
    async fn start_then_status_then_stop() {
        let app = router();

        let response = app.clone().oneshot(start_request(valid_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let started = body_json(response).await;
        let id = started["sessionId"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/session/{id}/status"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot = body_json(response).await;
        assert_eq!(snapshot["sessionId"].as_str().unwrap(), id);

        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/session/{id}/stop"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn second_start_conflicts_while_first_is_live() {
        let app = router();
        let response = app.clone().oneshot(start_request(valid_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(start_request(valid_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn events_stream_replays_history_before_live_frames() {
        let app = router();
        let response = app.clone().oneshot(start_request(valid_body())).await.unwrap();
        let id = body_json(response).await["sessionId"]
            .as_str()
            .unwrap()
            .to_string();
        wait_for_status(&app, &id, "running").await;

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/session/{id}/events?replay=true"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mut frames = response.into_body().into_data_stream();
        let mut seen = String::new();

        // The buffered history arrives up front, in emission order, without
        // waiting for the next live event.
        read_frames_until(&mut frames, &mut seen, "-> running").await;
        let resolved = seen.find("egress resolved").expect("missing proxy log");
        let opened = seen.find("page open").expect("missing page-open log");
        assert!(resolved < opened);
        let replay_end = seen.len();

        // Live frames continue on the same stream after the replay.
        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/session/{id}/stop"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        read_frames_until(&mut frames, &mut seen, "stop requested").await;
        assert!(seen.find("stop requested").unwrap() >= replay_end);
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let id = Uuid::new_v4();
        for uri in [
            format!("/session/{id}/status"),
            format!("/session/{id}/events"),
        ] {
            let response = router()
                .oneshot(Request::get(&uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }

        let response = router()
            .oneshot(
                Request::post(format!("/session/{id}/stop"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
