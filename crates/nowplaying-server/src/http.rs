use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use nowplaying_core::{CurrentMediaSnapshot, MediaCandidate, MediaService, QueryFacade, SubscriptionHub};
use nowplaying_detect::{NotificationRecord, NotificationSender};

use crate::system::SystemInfo;
use crate::ws;

pub const SERVICE_NAME: &str = "nowplaying";
pub const NO_ADAPTERS_ERROR: &str = "no media adapters available";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub facade: QueryFacade,
    pub hub: Arc<SubscriptionHub>,
    pub system: Arc<SystemInfo>,
    /// Comma-joined adapter names, `None` when nothing is running.
    pub provider: Option<String>,
    pub ping_interval: Duration,
    pub shutdown: CancellationToken,
    /// Present when a notification feed is running.
    pub notifications: Option<NotificationSender>,
}

impl AppState {
    pub fn from_service(
        service: &MediaService,
        system: SystemInfo,
        notifications: Option<NotificationSender>,
    ) -> Self {
        let provider = service
            .has_adapters()
            .then(|| service.adapter_names().join(", "));
        Self {
            facade: service.facade(),
            hub: service.hub(),
            system: Arc::new(system),
            provider,
            ping_interval: service.config().hub.ping_interval(),
            shutdown: service.shutdown_token(),
            notifications,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse<'a> {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub system: &'a SystemInfo,
    pub provider: Option<&'a str>,
    pub freshness_window_seconds: f64,
    /// Sources the aggregator holds. Entries past the freshness window stay
    /// listed until the next sweep removes them.
    pub sources: Vec<String>,
}

/// Body of `/now-playing` and of every push message.
#[derive(Debug, Serialize)]
pub struct MediaPayload<'a> {
    pub system: &'a SystemInfo,
    pub media: Option<&'a MediaCandidate>,
    pub last_updated: String,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

impl<'a> MediaPayload<'a> {
    pub fn new(state: &'a AppState, snapshot: &'a CurrentMediaSnapshot) -> Self {
        Self {
            system: &state.system,
            media: snapshot.media.as_ref(),
            last_updated: snapshot.last_updated.to_rfc3339(),
            cached: snapshot.cached,
            error: state.provider.is_none().then_some(NO_ADAPTERS_ERROR),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/", get(status))
        .route("/now-playing", get(now_playing))
        .route("/ws", get(ws::handler));
    if state.notifications.is_some() {
        router = router.route("/notifications", post(post_notification));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Response {
    Json(StatusResponse {
        status: "running",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        system: &state.system,
        provider: state.provider.as_deref(),
        freshness_window_seconds: state.facade.freshness_window().as_secs_f64(),
        sources: state.facade.live_sources(),
    })
    .into_response()
}

/// Always 200; an absent snapshot is a normal answer.
async fn now_playing(State(state): State<AppState>) -> Response {
    let snapshot = state.facade.get();
    Json(MediaPayload::new(&state, &snapshot)).into_response()
}

/// Entry point for an external notification listener.
async fn post_notification(
    State(state): State<AppState>,
    Json(record): Json<NotificationRecord>,
) -> StatusCode {
    match &state.notifications {
        Some(sender) if sender.send(record) => StatusCode::ACCEPTED,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use nowplaying_core::config::{AggregatorConfig, HubConfig};
    use nowplaying_core::{Adapter, Aggregator, PlaybackStatus, RawCandidate};
    use nowplaying_detect::{NotificationFeed, SourceDatabase};

    use super::*;

    fn test_state(provider: Option<&str>) -> (AppState, Arc<Aggregator>) {
        let aggregator = Arc::new(Aggregator::new(&AggregatorConfig::default()));
        let state = AppState {
            facade: QueryFacade::new(Arc::clone(&aggregator)),
            hub: Arc::new(SubscriptionHub::new(HubConfig::default(), Arc::clone(&aggregator))),
            system: Arc::new(SystemInfo {
                os: "TestOS 1.0".into(),
                hostname: "test-host".into(),
                platform: "linux".into(),
            }),
            provider: provider.map(String::from),
            ping_interval: Duration::from_secs(30),
            shutdown: CancellationToken::new(),
            notifications: None,
        };
        (state, aggregator)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (state, _) = test_state(Some("mpris, waydroid"));
        let (status, body) = get_json(router(state), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert_eq!(body["service"], "nowplaying");
        assert_eq!(body["provider"], "mpris, waydroid");
        assert_eq!(body["freshness_window_seconds"], 10.0);
        assert_eq!(body["system"]["hostname"], "test-host");
        assert_eq!(body["sources"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_now_playing_absent() {
        let (state, _) = test_state(Some("mpris"));
        let (status, body) = get_json(router(state), "/now-playing").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["media"].is_null());
        assert_eq!(body["cached"], false);
        assert!(body.get("error").is_none());
        assert!(body["last_updated"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn test_now_playing_reports_selected_media() {
        let (state, aggregator) = test_state(Some("mpris"));
        aggregator.ingest(
            RawCandidate::new("Spotify")
                .title("Song")
                .artist("Artist")
                .duration_ms(200_000)
                .status(PlaybackStatus::Playing),
        );

        let (status, body) = get_json(router(state), "/now-playing").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["media"]["source"], "Spotify");
        assert_eq!(body["media"]["title"], "Song");
        assert_eq!(body["media"]["status"], "playing");
        assert_eq!(body["media"]["duration"], 200_000);
        assert!(body["media"]["position"].is_null());
    }

    #[tokio::test]
    async fn test_now_playing_without_adapters_still_ok() {
        let (state, _) = test_state(None);
        let (status, body) = get_json(router(state.clone()), "/now-playing").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], NO_ADAPTERS_ERROR);
        assert!(body["media"].is_null());

        let (_, body) = get_json(router(state), "/").await;
        assert!(body["provider"].is_null());
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let (state, _) = test_state(Some("mpris"));
        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/now-playing")
                    .header("origin", "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_posted_notification_reaches_feed() {
        let (mut state, _) = test_state(Some("notifications"));
        let (sender, mut feed) = NotificationFeed::new("notifications", SourceDatabase::embedded());
        state.notifications = Some(sender);

        let response = router(state)
            .oneshot(post_json(
                "/notifications",
                r#"{"app": "com.amazon.mp3", "texts": ["Levitating", "Dua Lipa"], "status": "playing"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let candidates = feed.poll().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Levitating");
        assert_eq!(candidates[0].status, Some(PlaybackStatus::Playing));
    }

    #[tokio::test]
    async fn test_notification_to_dropped_feed_is_unavailable() {
        let (mut state, _) = test_state(Some("notifications"));
        let (sender, feed) = NotificationFeed::new("notifications", SourceDatabase::embedded());
        drop(feed);
        state.notifications = Some(sender);

        let response = router(state)
            .oneshot(post_json("/notifications", r#"{"app": "x", "texts": ["a", "b"]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_notifications_route_absent_without_feed() {
        let (state, _) = test_state(Some("mpris"));
        let response = router(state)
            .oneshot(post_json("/notifications", r#"{"app": "x", "texts": []}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (state, _) = test_state(Some("mpris"));
        let response = router(state)
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
