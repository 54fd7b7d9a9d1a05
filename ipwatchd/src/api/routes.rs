use std::path::Path;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use shared::protocol::{API_PREFIX, EVENTS_PATH};
use shared::types::{AvailableRange, EntriesQuery, Entry};
use crate::notifier::Notifier;
use crate::store::StoreHandle;
use super::events;

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub notifier: Notifier,
}

/// API routes under `/api`, plus the viewer bundle from `public_dir` when it exists
pub fn router(state: AppState, public_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/available-dates", get(get_available_dates))
        .route("/entries", post(post_entries))
        .route(EVENTS_PATH, get(events::subscribe));

    let mut app = Router::new().nest(API_PREFIX, api);

    if let Some(dir) = public_dir.filter(|dir| dir.is_dir()) {
        tracing::info!("Serving viewer from {}", dir.display());
        let static_service = ServeDir::new(dir)
            .fallback(ServeFile::new(dir.join("index.html")));
        app = app.fallback_service(static_service);
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn get_available_dates(
    State(state): State<AppState>,
) -> Result<Json<AvailableRange>, StatusCode> {
    state
        .store
        .available_range()
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to query available range: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// An empty body lists everything
async fn post_entries(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Vec<Entry>>, StatusCode> {
    let query = if body.iter().all(u8::is_ascii_whitespace) {
        EntriesQuery::default()
    } else {
        serde_json::from_slice::<EntriesQuery>(&body).map_err(|e| {
            tracing::debug!("Rejected entries query: {}", e);
            StatusCode::BAD_REQUEST
        })?
    };

    state
        .store
        .find_in_range(query.from, query.to)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to query entries: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::Poller;
    use crate::resolver::Resolver;
    use shared::types::EntryEvent;

    struct NoResolver;

    impl Resolver for NoResolver {
        async fn resolve(&self) -> String {
            shared::protocol::SENTINEL_IP.to_string()
        }
    }

    struct TestServer {
        addr: std::net::SocketAddr,
        base: String,
        state: AppState,
        client: reqwest::Client,
    }

    async fn start(public_dir: Option<&Path>) -> TestServer {
        let state = AppState {
            store: StoreHandle::open(":memory:").unwrap(),
            notifier: Notifier::new(16),
        };
        let app = router(state.clone(), public_dir);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            addr,
            base: format!("http://{}", addr),
            state,
            client: reqwest::Client::new(),
        }
    }

    impl TestServer {
        async fn available(&self) -> AvailableRange {
            self.client
                .get(format!("{}/api/available-dates", self.base))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap()
        }

        async fn entries(&self, query: serde_json::Value) -> Vec<Entry> {
            let response = self
                .client
                .post(format!("{}/api/entries", self.base))
                .json(&query)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            response.json().await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_empty_store_reads() {
        let server = start(None).await;

        let raw: serde_json::Value = server
            .client
            .get(format!("{}/api/available-dates", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(raw, serde_json::json!({ "from": null, "to": null }));

        assert!(server.entries(serde_json::json!({})).await.is_empty());
    }

    #[tokio::test]
    async fn test_range_queries() {
        let server = start(None).await;
        for (i, ts) in [1_000, 2_000, 3_000, 4_000].into_iter().enumerate() {
            server
                .state
                .store
                .create(format!("10.0.0.{}", i), ts, ts, 0)
                .await
                .unwrap();
        }

        assert_eq!(server.available().await, AvailableRange { from: Some(1_000), to: Some(4_000) });

        let all = server.entries(serde_json::json!({})).await;
        assert_eq!(all.len(), 4);

        let bounded: Vec<i64> = server
            .entries(serde_json::json!({ "from": 2_000, "to": 3_000 }))
            .await
            .iter()
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(bounded, vec![2_000, 3_000]);

        let open_end: Vec<i64> = server
            .entries(serde_json::json!({ "from": 2_500 }))
            .await
            .iter()
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(open_end, vec![3_000, 4_000]);
    }

    #[tokio::test]
    async fn test_fractional_bounds_are_accepted() {
        let server = start(None).await;
        for (i, ts) in [1_000, 2_000, 3_000, 4_000].into_iter().enumerate() {
            server.state.store.create(format!("10.0.0.{}", i), ts, ts, 0).await.unwrap();
        }

        let bounded: Vec<i64> = server
            .entries(serde_json::json!({ "from": 1_999.5, "to": 3_000.9 }))
            .await
            .iter()
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(bounded, vec![2_000, 3_000]);
    }

    #[tokio::test]
    async fn test_websocket_pushes_entry_events_and_survives_disconnect() {
        use futures::StreamExt;
        use tokio_tungstenite::tungstenite::Message as WsMessage;

        let server = start(None).await;
        let notifier = server.state.notifier.clone();
        let mut poller = Poller::new(NoResolver, server.state.store.clone(), notifier.clone())
            .await
            .unwrap();

        let url = format!("ws://{}{}{}", server.addr, API_PREFIX, EVENTS_PATH);
        let (mut ws, _response) = tokio_tungstenite::connect_async(url).await.unwrap();

        let created = poller.record(1_000, "1.2.3.4".to_string()).await.unwrap();
        let updated = poller.record(2_000, "1.2.3.4".to_string()).await.unwrap();

        let mut frames = Vec::new();
        while frames.len() < 2 {
            let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for a push")
                .unwrap()
                .unwrap();
            if matches!(msg, WsMessage::Text(_)) {
                let value: serde_json::Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
                frames.push(value);
            }
        }

        assert_eq!(frames[0]["event"], "new_entry");
        assert_eq!(frames[1]["event"], "update_entry");
        assert_eq!(frames[0]["data"]["id"], created.entry().id.to_string());
        assert_eq!(frames[1]["data"]["id"], created.entry().id.to_string());
        assert_eq!(frames[1]["data"]["lastUpdated"], updated.entry().last_updated);
        assert_eq!(frames[1]["data"]["changedAfter"], 0);

        ws.close(None).await.unwrap();
        drop(ws);

        let mut remaining = notifier.viewer_count();
        for _ in 0..100 {
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            remaining = notifier.viewer_count();
        }
        assert_eq!(remaining, 0, "Closed viewer should release its subscription");

        let next = poller.record(3_000, "5.6.7.8".to_string()).await.unwrap();
        assert!(matches!(next, EntryEvent::Created(_)));
        assert_eq!(next.entry().changed_after, 2_000);
    }

    #[tokio::test]
    async fn test_entries_body_is_optional_but_must_be_valid() {
        let server = start(None).await;
        server.state.store.create("1.2.3.4".to_string(), 1_000, 1_000, 0).await.unwrap();

        let response = server
            .client
            .post(format!("{}/api/entries", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let entries: Vec<Entry> = response.json().await.unwrap();
        assert_eq!(entries.len(), 1);

        let response = server
            .client
            .post(format!("{}/api/entries", server.base))
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_entries_serialize_with_wire_field_names() {
        let server = start(None).await;
        server.state.store.create("1.2.3.4".to_string(), 1_000, 1_500, 0).await.unwrap();

        let raw: serde_json::Value = server
            .client
            .post(format!("{}/api/entries", server.base))
            .json(&serde_json::json!({}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let first = &raw[0];
        for field in ["id", "timestamp", "ip", "changedAfter", "lastUpdated"] {
            assert!(first.get(field).is_some(), "missing field {}", field);
        }
    }

    #[tokio::test]
    async fn test_late_viewer_sees_history_via_query_and_only_new_pushes() {
        let server = start(None).await;
        let mut poller = Poller::new(NoResolver, server.state.store.clone(), server.state.notifier.clone())
            .await
            .unwrap();

        for i in 0..5 {
            poller.record(1_000 * (i + 1), format!("10.0.0.{}", i)).await.unwrap();
        }

        let mut viewer = server.state.notifier.subscribe();

        let history = server.entries(serde_json::json!({})).await;
        assert_eq!(history.len(), 5);
        assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

        let created = poller.record(6_000, "10.0.0.9".to_string()).await.unwrap();

        let pushed = viewer.recv().await.unwrap();
        assert!(matches!(pushed, EntryEvent::Created(_)));
        assert_eq!(pushed, created);
        assert!(viewer.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_serves_viewer_with_index_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>viewer</html>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();

        let server = start(Some(dir.path())).await;

        let asset = server.client.get(format!("{}/app.js", server.base)).send().await.unwrap();
        assert_eq!(asset.text().await.unwrap(), "console.log(1)");

        let deep_link = server
            .client
            .get(format!("{}/some/client/route", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(deep_link.text().await.unwrap(), "<html>viewer</html>");

        assert_eq!(server.available().await, AvailableRange::default());
    }

    #[tokio::test]
    async fn test_missing_public_dir_is_skipped() {
        let server = start(Some(Path::new("/nonexistent/ipwatch-public"))).await;
        let response = server.client.get(format!("{}/index.html", server.base)).send().await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
