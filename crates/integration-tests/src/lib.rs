//! Integration tests for the basket sync engine.
//!
//! Each test starts a [`TestServer`]: an axum server on a random local port
//! exposing an [`InMemoryCollectionStore`] on the Collection Store routes.
//! Engines under test talk to it through the real [`HttpCollectionStore`].
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p basket-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_sync` - Cart operations over HTTP
//! - `wishlist_sync` - Wishlist operations over HTTP
//! - `identity` - Identity binding and isolation
//! - `failures` - Transport, rejection, and decode failures

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use basket_core::{
    CartItem, CollectionKind, ProductDetails, ProductId, UnknownCollection, WishlistItem,
};
use basket_sync::store::{AddRequest, AddResponse, FetchResponse, StatusResponse, UpdateRequest};
use basket_sync::{
    EngineOptions, GuestPolicy, HttpCollectionStore, IdentityResolver, InMemoryCollectionStore,
    SessionIdentity, StoreConfig, SyncEngine, SyncError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

/// Engine type used by the tests.
pub type HttpEngine = SyncEngine<HttpCollectionStore, SessionIdentity>;

/// How the test server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerMode {
    /// Serve the in-memory store, echoing added items.
    #[default]
    Normal,
    /// Serve the in-memory store without echoing added items.
    NoEcho,
    /// Answer every call with `200 {"success": false}`.
    SoftReject,
    /// Answer every call with a body that is not JSON.
    Garbage,
}

#[derive(Clone)]
struct ServerState {
    store: InMemoryCollectionStore,
    mode: Arc<Mutex<ServerMode>>,
    last_authorization: Arc<Mutex<Option<String>>>,
}

impl ServerState {
    fn mode(&self) -> ServerMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn intercept(&self, headers: &HeaderMap) -> Option<Response> {
        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        *self
            .last_authorization
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = authorization;

        match self.mode() {
            ServerMode::Normal | ServerMode::NoEcho => None,
            ServerMode::SoftReject => Some(
                Json(StatusResponse::rejected("Store is read-only")).into_response(),
            ),
            ServerMode::Garbage => Some("<html>maintenance</html>".into_response()),
        }
    }
}

/// Collection Store served over HTTP for the duration of a test.
pub struct TestServer {
    addr: SocketAddr,
    state: ServerState,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start a server over the [`sample_catalog`].
    pub async fn start() -> Self {
        Self::with_store(InMemoryCollectionStore::with_catalog(sample_catalog())).await
    }

    /// Start a server over `store`.
    pub async fn with_store(store: InMemoryCollectionStore) -> Self {
        let state = ServerState {
            store,
            mode: Arc::new(Mutex::new(ServerMode::Normal)),
            last_authorization: Arc::new(Mutex::new(None)),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener
            .local_addr()
            .expect("Failed to read test server address");

        let app = router(state.clone());
        let (shutdown, signal) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await;
        });

        Self {
            addr,
            state,
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }

    /// Base URL of the server, ending in a slash.
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).expect("Test server URL is valid")
    }

    /// The store behind the server.
    #[must_use]
    pub fn store(&self) -> &InMemoryCollectionStore {
        &self.state.store
    }

    /// Change how the server answers.
    pub fn set_mode(&self, mode: ServerMode) {
        *self.state.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    /// `Authorization` header of the most recent request.
    #[must_use]
    pub fn last_authorization(&self) -> Option<String> {
        self.state
            .last_authorization
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Store client pointed at this server.
    #[must_use]
    pub fn client(&self) -> HttpCollectionStore {
        HttpCollectionStore::new(&StoreConfig::new(self.base_url()))
            .expect("Failed to build store client")
    }

    /// Engine for `session` with the shared guest policy.
    #[must_use]
    pub fn engine(&self, session: &SessionIdentity) -> HttpEngine {
        self.engine_with(session, GuestPolicy::default())
    }

    /// Engine for `session` with an explicit guest policy.
    #[must_use]
    pub fn engine_with(&self, session: &SessionIdentity, policy: GuestPolicy) -> HttpEngine {
        SyncEngine::new(
            self.client(),
            IdentityResolver::new(session.clone(), policy),
            EngineOptions::default(),
        )
    }

    /// Stop accepting connections and wait for the server task to end.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(Duration::from_secs(2), &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

/// Products every test server knows about.
#[must_use]
pub fn sample_catalog() -> Vec<ProductDetails> {
    vec![
        ProductDetails::new("p1")
            .with_name("Teapot")
            .with_price(Decimal::new(500, 0)),
        ProductDetails::new("p2").with_name("Lamp"),
        ProductDetails::new("p3")
            .with_name("Rug")
            .with_price(Decimal::new(1250, 1)),
        ProductDetails::new("sku/with space").with_name("Odd id"),
    ]
}

// =============================================================================
// Routes
// =============================================================================

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/collections/{name}", get(fetch))
        .route("/collections/{name}/add", post(add))
        .route("/collections/{name}/update/{id}", put(update))
        .route("/collections/{name}/remove/{id}", delete(remove))
        .route("/collections/{name}/clear", delete(clear))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct IdentityQuery {
    identity: String,
}

async fn fetch(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(query): Query<IdentityQuery>,
) -> Response {
    if let Some(response) = state.intercept(&headers) {
        return response;
    }
    match name.parse::<CollectionKind>() {
        Ok(CollectionKind::Cart) => respond(
            state
                .store
                .entries::<CartItem>(&query.identity)
                .map(fetched),
        ),
        Ok(CollectionKind::Wishlist) => respond(
            state
                .store
                .entries::<WishlistItem>(&query.identity)
                .map(fetched),
        ),
        Err(e) => not_found(&e),
    }
}

async fn add(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(request): Json<AddRequest>,
) -> Response {
    if let Some(response) = state.intercept(&headers) {
        return response;
    }
    let echo = state.mode() == ServerMode::Normal;
    match name.parse::<CollectionKind>() {
        Ok(CollectionKind::Cart) => respond(
            state
                .store
                .add_entry::<CartItem>(&request.identity, &request.id, request.quantity)
                .map(|item| added(item, echo)),
        ),
        Ok(CollectionKind::Wishlist) => respond(
            state
                .store
                .add_entry::<WishlistItem>(&request.identity, &request.id, request.quantity)
                .map(|item| added(item, echo)),
        ),
        Err(e) => not_found(&e),
    }
}

async fn update(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path((name, id)): Path<(String, String)>,
    Json(request): Json<UpdateRequest>,
) -> Response {
    if let Some(response) = state.intercept(&headers) {
        return response;
    }
    match name.parse::<CollectionKind>() {
        Ok(kind) => respond(
            state
                .store
                .update_entry(kind, &request.identity, &ProductId::new(id), request.quantity)
                .map(|()| StatusResponse::ok()),
        ),
        Err(e) => not_found(&e),
    }
}

async fn remove(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path((name, id)): Path<(String, String)>,
    Query(query): Query<IdentityQuery>,
) -> Response {
    if let Some(response) = state.intercept(&headers) {
        return response;
    }
    match name.parse::<CollectionKind>() {
        Ok(kind) => respond(
            state
                .store
                .remove_entry(kind, &query.identity, &ProductId::new(id))
                .map(|()| StatusResponse::ok()),
        ),
        Err(e) => not_found(&e),
    }
}

async fn clear(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(query): Query<IdentityQuery>,
) -> Response {
    if let Some(response) = state.intercept(&headers) {
        return response;
    }
    match name.parse::<CollectionKind>() {
        Ok(kind) => respond(
            state
                .store
                .clear_entries(kind, &query.identity)
                .map(|()| StatusResponse::ok()),
        ),
        Err(e) => not_found(&e),
    }
}

fn fetched<T>(items: Vec<T>) -> FetchResponse<T> {
    FetchResponse {
        success: true,
        message: None,
        items: Some(items),
    }
}

fn added<T>(item: T, echo: bool) -> AddResponse<T> {
    AddResponse {
        success: true,
        message: None,
        item: echo.then_some(item),
    }
}

fn respond<T: Serialize>(result: Result<T, SyncError>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(SyncError::Rejected { status, message }) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST),
            Json(StatusResponse::rejected(message)),
        )
            .into_response(),
        Err(other) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(StatusResponse::rejected(other.to_string())),
        )
            .into_response(),
    }
}

fn not_found(err: &UnknownCollection) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(StatusResponse::rejected(err.to_string())),
    )
        .into_response()
}
