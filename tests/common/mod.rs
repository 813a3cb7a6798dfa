#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use anyhow::Result;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use caregate::api::{HttpPortalApi, PortalApi};
use caregate::config::{ApiConfig, ProviderConfig};
use caregate::permissions::PermissionResolver;
use caregate::provider::{HttpIdentityProvider, IdentityProvider};
use caregate::session::{SessionManager, SessionStore, TokenPair, TokenStore};
use caregate::storage::{keys, MemoryStorage, StorageBackend};

pub const STORED_ACCESS_TOKEN: &str = "stored-access-token";
pub const STORED_REFRESH_TOKEN: &str = "stored-refresh-token";
pub const FRESH_ACCESS_TOKEN: &str = "fresh-access-token";
pub const ROTATED_REFRESH_TOKEN: &str = "rotated-refresh-token";
pub const PROVIDER_USER_ID: &str = "provider-user-1";
pub const PROVIDER_EMAIL: &str = "pat@example.com";
pub const SELF_PATIENT_ID: &str = "patient-self";
pub const OTHER_PATIENT_ID: &str = "42";

/// Latency of the unreachable modes; must exceed the client timeout
/// configured in [`TestPortal::start`].
const STALL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    Healthy,
    RejectsTokens,
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Healthy,
    Unreachable,
    /// Accepts the TCP connection, then drops it without an HTTP response.
    ResetsConnections,
    RejectsTokens,
    Failing,
}

#[derive(Clone)]
struct ProviderState {
    mode: ProviderMode,
    refreshes: Arc<AtomicUsize>,
    revocations: Arc<AtomicUsize>,
    last_refresh_token: Arc<Mutex<Option<String>>>,
}

#[derive(Clone)]
struct BackendState {
    mode: Arc<Mutex<BackendMode>>,
    profile: Arc<Mutex<Value>>,
    grants: Arc<Mutex<Value>>,
    integrations: Arc<Mutex<Value>>,
    profile_fetches: Arc<AtomicUsize>,
    profile_updates: Arc<AtomicUsize>,
    grant_fetches: Arc<AtomicUsize>,
    last_bearer: Arc<Mutex<Option<String>>>,
}

pub fn default_profile() -> Value {
    json!({
        "id": "profile-1",
        "email": PROVIDER_EMAIL,
        "first_name": "Pat",
        "last_name": "Doe",
        "language": "en",
        "medical_conditions": [],
        "family_history": [],
        "onboarding_completed": true,
        "onboarding_skipped": false,
    })
}

pub fn default_grants() -> Value {
    json!([
        {
            "patientId": SELF_PATIENT_ID,
            "patientName": "Pat Doe",
            "patientEmail": PROVIDER_EMAIL,
            "grantedFor": "Self",
            "permissions": {
                "canViewHealthRecords": true,
                "canViewHealthPlans": true,
                "canViewMedications": true,
                "canViewMessages": true,
                "canViewAppointments": true,
            },
        },
        {
            "patientId": OTHER_PATIENT_ID,
            "patientName": "Alex Rivera",
            "grantedFor": "Pat Doe",
            "permissions": {
                "canViewHealthRecords": false,
                "canViewHealthPlans": false,
                "canViewMedications": true,
                "canViewMessages": false,
                "canViewAppointments": false,
            },
        },
    ])
}

fn default_integrations() -> Value {
    json!({
        "wearable_sync_enabled": false,
        "lab_results_import_enabled": true,
        "pharmacy_sync_enabled": false,
    })
}

async fn provider_token(State(state): State<ProviderState>, Json(body): Json<Value>) -> Response {
    state.refreshes.fetch_add(1, Ordering::SeqCst);
    *state.last_refresh_token.lock().unwrap() = body
        .get("refresh_token")
        .and_then(|v| v.as_str())
        .map(String::from);

    match state.mode {
        ProviderMode::Healthy => Json(json!({
            "access_token": FRESH_ACCESS_TOKEN,
            "refresh_token": ROTATED_REFRESH_TOKEN,
            "expires_in": 3600.0,
            "user": { "id": PROVIDER_USER_ID, "email": PROVIDER_EMAIL },
        }))
        .into_response(),
        ProviderMode::RejectsTokens => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "invalid refresh token" })),
        )
            .into_response(),
        ProviderMode::Unreachable => {
            tokio::time::sleep(STALL).await;
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn provider_logout(State(state): State<ProviderState>) -> Response {
    state.revocations.fetch_add(1, Ordering::SeqCst);
    match state.mode {
        ProviderMode::Unreachable => {
            tokio::time::sleep(STALL).await;
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Record the bearer and apply the backend failure mode. `None` means the
/// request proceeds to the real handler body.
async fn backend_gate(state: &BackendState, headers: &HeaderMap) -> Option<Response> {
    *state.last_bearer.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let mode = *state.mode.lock().unwrap();
    match mode {
        BackendMode::Healthy => None,
        // Resets are enforced at the accept loop; a request slipping through
        // on a kept-alive connection stalls like the unreachable mode.
        BackendMode::Unreachable | BackendMode::ResetsConnections => {
            tokio::time::sleep(STALL).await;
            Some(StatusCode::SERVICE_UNAVAILABLE.into_response())
        }
        BackendMode::RejectsTokens => Some(
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "invalid token" })),
            )
                .into_response(),
        ),
        BackendMode::Failing => Some(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "internal error" })),
            )
                .into_response(),
        ),
    }
}

async fn get_profile(State(state): State<BackendState>, headers: HeaderMap) -> Response {
    state.profile_fetches.fetch_add(1, Ordering::SeqCst);
    if let Some(reply) = backend_gate(&state, &headers).await {
        return reply;
    }

    let profile = state.profile.lock().unwrap().clone();
    if profile.is_null() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "profile not found" })),
        )
            .into_response();
    }
    Json(profile).into_response()
}

async fn patch_profile(
    State(state): State<BackendState>,
    headers: HeaderMap,
    Json(update): Json<Value>,
) -> Response {
    state.profile_updates.fetch_add(1, Ordering::SeqCst);
    if let Some(reply) = backend_gate(&state, &headers).await {
        return reply;
    }

    let merged = {
        let mut profile = state.profile.lock().unwrap();
        if profile.is_null() {
            *profile = default_profile();
        }
        if let (Some(target), Some(source)) = (profile.as_object_mut(), update.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
        profile.clone()
    };
    Json(merged).into_response()
}

async fn post_oauth_profile(
    State(state): State<BackendState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(reply) = backend_gate(&state, &headers).await {
        return reply;
    }

    let mut profile = default_profile();
    profile["email"] = body.get("email").cloned().unwrap_or(Value::Null);
    profile["first_name"] = body.get("first_name").cloned().unwrap_or(Value::Null);
    profile["last_name"] = body.get("last_name").cloned().unwrap_or(Value::Null);
    profile["onboarding_completed"] = json!(false);

    *state.profile.lock().unwrap() = profile.clone();
    (StatusCode::CREATED, Json(profile)).into_response()
}

async fn get_patients(State(state): State<BackendState>, headers: HeaderMap) -> Response {
    state.grant_fetches.fetch_add(1, Ordering::SeqCst);
    if let Some(reply) = backend_gate(&state, &headers).await {
        return reply;
    }
    let grants = state.grants.lock().unwrap().clone();
    Json(grants).into_response()
}

async fn get_integrations(State(state): State<BackendState>, headers: HeaderMap) -> Response {
    if let Some(reply) = backend_gate(&state, &headers).await {
        return reply;
    }
    let integrations = state.integrations.lock().unwrap().clone();
    Json(integrations).into_response()
}

async fn patch_integrations(
    State(state): State<BackendState>,
    headers: HeaderMap,
    Json(update): Json<Value>,
) -> Response {
    if let Some(reply) = backend_gate(&state, &headers).await {
        return reply;
    }

    let merged = {
        let mut integrations = state.integrations.lock().unwrap();
        if let (Some(target), Some(source)) = (integrations.as_object_mut(), update.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
        integrations.clone()
    };
    Json(merged).into_response()
}

async fn serve(router: Router) -> Result<(String, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);
    let task = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((base_url, task))
}

/// Serve the backend behind a front listener so connections can be dropped
/// before any HTTP exchange. In [`BackendMode::ResetsConnections`] accepted
/// sockets are closed with the request still unread, which makes the kernel
/// answer with an RST; every other mode tunnels bytes to the real server.
async fn serve_backend(
    router: Router,
    mode: Arc<Mutex<BackendMode>>,
) -> Result<(String, Vec<JoinHandle<()>>)> {
    let upstream_listener = TcpListener::bind("127.0.0.1:0").await?;
    let upstream_addr = upstream_listener.local_addr()?;
    let serve_task = tokio::spawn(async move {
        let _ = axum::serve(upstream_listener, router).await;
    });

    let front = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", front.local_addr()?);
    let front_task = tokio::spawn(async move {
        loop {
            let Ok((mut client, _)) = front.accept().await else {
                break;
            };
            if *mode.lock().unwrap() == BackendMode::ResetsConnections {
                drop(client);
                continue;
            }
            tokio::spawn(async move {
                if let Ok(mut upstream) = TcpStream::connect(upstream_addr).await {
                    let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
                }
            });
        }
    });

    Ok((base_url, vec![serve_task, front_task]))
}

fn init_tracing() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One fully wired portal client against in-process fake services.
pub struct TestPortal {
    pub store: Arc<SessionStore>,
    pub storage: Arc<MemoryStorage>,
    pub manager: SessionManager,
    pub resolver: Arc<PermissionResolver>,
    pub api: Arc<dyn PortalApi>,
    provider: ProviderState,
    backend: BackendState,
    tasks: Vec<JoinHandle<()>>,
}

impl TestPortal {
    pub async fn start(provider_mode: ProviderMode, backend_mode: BackendMode) -> Result<Self> {
        init_tracing();

        let provider_state = ProviderState {
            mode: provider_mode,
            refreshes: Arc::new(AtomicUsize::new(0)),
            revocations: Arc::new(AtomicUsize::new(0)),
            last_refresh_token: Arc::new(Mutex::new(None)),
        };
        let backend_state = BackendState {
            mode: Arc::new(Mutex::new(backend_mode)),
            profile: Arc::new(Mutex::new(default_profile())),
            grants: Arc::new(Mutex::new(default_grants())),
            integrations: Arc::new(Mutex::new(default_integrations())),
            profile_fetches: Arc::new(AtomicUsize::new(0)),
            profile_updates: Arc::new(AtomicUsize::new(0)),
            grant_fetches: Arc::new(AtomicUsize::new(0)),
            last_bearer: Arc::new(Mutex::new(None)),
        };

        let provider_router = Router::new()
            .route("/token", post(provider_token))
            .route("/logout", post(provider_logout))
            .with_state(provider_state.clone());
        let backend_router = Router::new()
            .route("/profile", get(get_profile).patch(patch_profile))
            .route("/profile/oauth", post(post_oauth_profile))
            .route("/patients/accessible", get(get_patients))
            .route(
                "/integrations",
                get(get_integrations).patch(patch_integrations),
            )
            .with_state(backend_state.clone());

        let (provider_url, provider_task) = serve(provider_router).await?;
        let (api_url, mut tasks) =
            serve_backend(backend_router, Arc::clone(&backend_state.mode)).await?;
        tasks.push(provider_task);

        // Short client timeout so the unreachable modes classify as
        // connectivity failures quickly.
        let provider_config = ProviderConfig {
            base_url: provider_url,
            request_timeout_secs: 1,
        };
        let api_config = ApiConfig {
            base_url: api_url,
            request_timeout_secs: 1,
        };

        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(SessionStore::new());
        let api: Arc<dyn PortalApi> = Arc::new(HttpPortalApi::new(&api_config)?);
        let provider: Arc<dyn IdentityProvider> =
            Arc::new(HttpIdentityProvider::new(&provider_config)?);

        let manager = SessionManager::new(
            Arc::clone(&store),
            storage.clone() as Arc<dyn StorageBackend>,
            provider,
            Arc::clone(&api),
        );
        let resolver = Arc::new(PermissionResolver::new(Arc::clone(&api)));

        Ok(Self {
            store,
            storage,
            manager,
            resolver,
            api,
            provider: provider_state,
            backend: backend_state,
            tasks,
        })
    }

    pub fn seed_stored_tokens(&self) {
        TokenStore::new(self.storage.clone() as Arc<dyn StorageBackend>).store(&TokenPair {
            access_token: STORED_ACCESS_TOKEN.into(),
            refresh_token: STORED_REFRESH_TOKEN.into(),
            expires_in: Some(3600.0),
        });
    }

    pub fn stored_access_token(&self) -> Option<String> {
        self.storage.get(keys::ACCESS_TOKEN)
    }

    pub fn stored_refresh_token(&self) -> Option<String> {
        self.storage.get(keys::REFRESH_TOKEN)
    }

    /// Make the next profile fetch 404, as for a first-time OAuth user.
    pub fn clear_backend_profile(&self) {
        *self.backend.profile.lock().unwrap() = Value::Null;
    }

    /// Flip backend behavior mid-test, e.g. to model connectivity returning.
    pub fn set_backend_mode(&self, mode: BackendMode) {
        *self.backend.mode.lock().unwrap() = mode;
    }

    pub fn set_grants(&self, grants: Value) {
        *self.backend.grants.lock().unwrap() = grants;
    }

    pub fn grant_fetches(&self) -> usize {
        self.backend.grant_fetches.load(Ordering::SeqCst)
    }

    pub fn profile_fetches(&self) -> usize {
        self.backend.profile_fetches.load(Ordering::SeqCst)
    }

    pub fn profile_updates(&self) -> usize {
        self.backend.profile_updates.load(Ordering::SeqCst)
    }

    pub fn provider_refreshes(&self) -> usize {
        self.provider.refreshes.load(Ordering::SeqCst)
    }

    pub fn provider_revocations(&self) -> usize {
        self.provider.revocations.load(Ordering::SeqCst)
    }

    pub fn last_bearer(&self) -> Option<String> {
        self.backend.last_bearer.lock().unwrap().clone()
    }

    pub fn last_refresh_token_sent(&self) -> Option<String> {
        self.provider.last_refresh_token.lock().unwrap().clone()
    }
}

impl Drop for TestPortal {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
