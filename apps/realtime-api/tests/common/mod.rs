#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::Value;

use realtime_api::config::Config;
use realtime_api::gateway::events::ServerEvent;
use realtime_api::gateway::session::{GatewaySession, Outbound, OutboundReceiver};
use realtime_api::models::community_member::{ROLE_MEMBER, ROLE_MODERATOR};
use realtime_api::notify::{MemoryNotifier, SentNotification};
use realtime_api::store::memory::MemoryStore;
use realtime_api::store::Stores;
use realtime_api::AppState;

pub const SECRET: &str = "integration-test-secret";

pub const ALICE: i64 = 1;
pub const BOB: i64 = 2;
pub const CAROL: i64 = 3;
pub const DAVE: i64 = 4;

pub const COMMUNITY: i64 = 10;
pub const OTHER_COMMUNITY: i64 = 20;

pub const GENERAL: i64 = 100;
pub const STAFF: i64 = 101;
pub const ELSEWHERE: i64 = 200;

/// Application state over the in-memory store, plus handles for inspecting
/// what the gateway persisted and notified.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<MemoryNotifier>,
}

impl TestApp {
    pub fn router(&self) -> Router {
        realtime_api::routes::router().with_state(self.state.clone())
    }

    /// Register a connection directly with the gateway, bypassing the socket.
    pub fn open_session(&self, user_id: i64, name: &str) -> (GatewaySession, OutboundReceiver) {
        let (outbound, rx) = Outbound::channel(self.state.config.outbound_buffer);
        let session = GatewaySession::new(user_id, name.to_string(), outbound);
        self.state.gateway.connect(&session);
        (session, rx)
    }
}

pub fn test_config() -> Config {
    Config {
        jwt_secret: Some(SECRET.to_string()),
        ..Config::default()
    }
}

pub fn test_app() -> TestApp {
    test_app_with(test_config(), MemoryNotifier::new())
}

pub fn test_app_with(config: Config, notifier: MemoryNotifier) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    seed(&store);
    let notifier = Arc::new(notifier);
    let state = AppState::new(config, Stores::memory(store.clone()), notifier.clone());
    TestApp {
        state,
        store,
        notifier,
    }
}

/// Alice owns the community, Bob is a member, Dave moderates, Carol belongs
/// to a different community.
fn seed(store: &MemoryStore) {
    store.add_user(ALICE, "alice", Some("Alice"));
    store.add_user(BOB, "bob", None);
    store.add_user(CAROL, "carol", Some("Carol"));
    store.add_user(DAVE, "dave", Some("Dave"));

    store.add_community(COMMUNITY, ALICE);
    store.add_member(COMMUNITY, BOB, ROLE_MEMBER);
    store.add_member(COMMUNITY, DAVE, ROLE_MODERATOR);
    store.add_room(GENERAL, COMMUNITY, "general", false);
    store.add_room(STAFF, COMMUNITY, "staff", true);

    store.add_community(OTHER_COMMUNITY, CAROL);
    store.add_room(ELSEWHERE, OTHER_COMMUNITY, "elsewhere", false);
}

pub fn mint_token(user_id: i64) -> String {
    mint_token_with(
        serde_json::json!({
            "userId": user_id,
            "exp": chrono::Utc::now().timestamp() + 300,
        }),
        SECRET,
    )
}

pub fn mint_token_with(claims: Value, secret: &str) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("mint test token")
}

/// Everything currently queued for a connection.
pub fn drain(rx: &mut OutboundReceiver) -> Vec<Arc<ServerEvent>> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Queued events with the given name.
pub fn drain_named(rx: &mut OutboundReceiver, name: &str) -> Vec<Value> {
    drain(rx)
        .into_iter()
        .filter(|e| e.t == name)
        .map(|e| e.d.clone())
        .collect()
}

/// The single queued `error` event's code. Panics if there is not exactly one.
pub fn error_code(rx: &mut OutboundReceiver) -> String {
    let errors = drain_named(rx, "error");
    assert_eq!(errors.len(), 1, "expected exactly one error event, got {errors:?}");
    errors[0]["code"].as_str().unwrap_or_default().to_string()
}

/// Notifications are dispatched on spawned tasks; poll until `count` arrive.
pub async fn wait_for_notifications(notifier: &MemoryNotifier, count: usize) -> Vec<SentNotification> {
    for _ in 0..100 {
        let sent = notifier.sent();
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    notifier.sent()
}
