//! # Signing API
//!
//! Builds the axum router for the node's loopback HTTP interface. All
//! endpoints share application state through axum's `State` extractor.
//! The core is synchronous and may block on disk, so every call into it
//! runs on the blocking pool.
//!
//! ## Endpoints
//!
//! | Method | Path            | Description                              |
//! |--------|-----------------|------------------------------------------|
//! | GET    | `/health`       | Liveness probe                           |
//! | GET    | `/status`       | Key and ledger summary                   |
//! | GET    | `/public-key`   | Active public key, base64 SPKI DER       |
//! | GET    | `/nonce/next`   | Smallest nonce `/sign` will accept       |
//! | POST   | `/authenticate` | Present the passphrase, open the window  |
//! | POST   | `/sign`         | Sign a transaction, get the submission   |
//! | GET    | `/metrics`      | Prometheus exposition                    |
//!
//! ## Errors
//!
//! Failures return `{"error": "<kind>", "message": "..."}` with:
//! invalid transaction 400, authentication required 401, no key 404,
//! nonce too low 409, key invalidated 410, anything else 500.

use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use warden_protocol::custody::{PassphraseGate, VaultCustodian};
use warden_protocol::transaction::{SignError, SubmissionPayload, Transaction, TransactionSigner};

use crate::metrics::{self, SharedMetrics};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The one signer this node fronts.
    pub signer: Arc<TransactionSigner<VaultCustodian>>,
    /// Passphrase accepted by `/authenticate`. `None` disables it.
    pub auth_passphrase: Option<Arc<String>>,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl FromRef<AppState> for SharedMetrics {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.metrics)
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes and request tracing.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/public-key", get(public_key_handler))
        .route("/nonce/next", get(next_nonce_handler))
        .route("/authenticate", post(authenticate_handler))
        .route("/sign", post(sign_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub version: String,
    pub key_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyStatus>,
    pub last_accepted_nonce: Option<u64>,
    pub next_nonce: u64,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    pub curve: String,
    pub fingerprint: String,
    pub auth_validity_secs: Option<u64>,
    pub invalidated: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    pub public_key: String,
    pub curve: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextNonceResponse {
    pub next_nonce: u64,
}

#[derive(Deserialize)]
pub struct AuthenticateRequest {
    pub passphrase: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A [`SignError`] on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError(SignError);

impl From<SignError> for ApiError {
    fn from(e: SignError) -> Self {
        Self(e)
    }
}

/// HTTP status for each signer error.
pub fn status_for(e: &SignError) -> StatusCode {
    match e {
        SignError::InvalidTransaction { .. } => StatusCode::BAD_REQUEST,
        SignError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        SignError::KeyNotFound => StatusCode::NOT_FOUND,
        SignError::NonceTooLow { .. } => StatusCode::CONFLICT,
        SignError::KeyInvalidated => StatusCode::GONE,
        SignError::KeyGeneration(_) | SignError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = ErrorResponse {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Run a blocking core call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, SignError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(SignError::Storage(format!("worker task failed: {e}"))))?
        .map_err(ApiError)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: 200 while the process is up.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: key presence and parameters, ledger position.
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let signer = Arc::clone(&state.signer);
    let (info, last_accepted, next_nonce) = blocking(move || {
        let info = signer.custodian().key_info().map_err(SignError::from)?;
        let last = signer
            .ledger()
            .last_accepted()
            .map_err(SignError::from)?;
        let next = signer.peek_next_nonce()?;
        Ok((info, last, next))
    })
    .await?;

    let key = info.map(|info| KeyStatus {
        curve: info.params.curve.to_string(),
        fingerprint: info.public_key.fingerprint(),
        auth_validity_secs: info.params.auth_validity.map(|d| d.as_secs()),
        invalidated: info.invalidated,
        created_at: info.created_at.to_rfc3339(),
    });

    Ok(Json(StatusResponse {
        version: state.version.clone(),
        key_present: key.is_some(),
        key,
        last_accepted_nonce: last_accepted,
        next_nonce,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /public-key`: 404 before the first keygen.
async fn public_key_handler(
    State(state): State<AppState>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    let signer = Arc::clone(&state.signer);
    let pk = blocking(move || signer.public_key()).await?;
    Ok(Json(PublicKeyResponse {
        public_key: pk.to_base64(),
        curve: pk.curve().to_string(),
    }))
}

/// `GET /nonce/next`
async fn next_nonce_handler(
    State(state): State<AppState>,
) -> Result<Json<NextNonceResponse>, ApiError> {
    let signer = Arc::clone(&state.signer);
    let next_nonce = blocking(move || signer.peek_next_nonce()).await?;
    Ok(Json(NextNonceResponse { next_nonce }))
}

/// `POST /authenticate`: compares the passphrase in constant time and
/// opens the custodian's authentication window on a match.
async fn authenticate_handler(
    State(state): State<AppState>,
    Json(req): Json<AuthenticateRequest>,
) -> Result<StatusCode, ApiError> {
    let Some(expected) = state.auth_passphrase.clone() else {
        tracing::warn!("authentication attempted but no passphrase is configured");
        state
            .metrics
            .authentications_total
            .with_label_values(&["failure"])
            .inc();
        return Err(ApiError(SignError::AuthenticationRequired));
    };

    let signer = Arc::clone(&state.signer);
    let result = blocking(move || {
        let attempt = req.passphrase;
        let gate = PassphraseGate::new(&expected, move || Some(attempt.clone()));
        signer.authenticate_with(&gate)
    })
    .await;

    let label = if result.is_ok() { "success" } else { "failure" };
    state
        .metrics
        .authentications_total
        .with_label_values(&[label])
        .inc();
    result.map(|()| StatusCode::NO_CONTENT)
}

/// `POST /sign`: body is a transaction, response is the submission
/// payload. A body that does not decode as a transaction (missing field,
/// negative or non-integer nonce) is an invalid transaction.
async fn sign_handler(
    State(state): State<AppState>,
    body: Result<Json<Transaction>, JsonRejection>,
) -> Result<Json<SubmissionPayload>, ApiError> {
    let tx = match body {
        Ok(Json(tx)) => tx,
        Err(rejection) => {
            let e = SignError::InvalidTransaction {
                reason: rejection.body_text(),
            };
            tracing::info!(kind = e.kind(), "undecodable sign request");
            state.metrics.record_sign(Err(e.kind()));
            return Err(ApiError(e));
        }
    };

    let timer = state.metrics.sign_latency_seconds.start_timer();
    let nonce = tx.nonce();
    let signer = Arc::clone(&state.signer);
    let (result, ledger) = blocking(move || {
        let result = signer.sign_for_submission(&tx);
        Ok((result, signer.ledger().last_accepted()))
    })
    .await?;
    timer.observe_duration();

    // A failed sign may still have consumed the nonce.
    if let Ok(last_accepted) = ledger {
        state.metrics.set_last_accepted(last_accepted);
    }
    match &result {
        Ok(_) => {
            tracing::info!(nonce, "signed transaction");
            state.metrics.record_sign(Ok(()));
        }
        Err(e) => {
            tracing::info!(nonce, kind = e.kind(), "signing refused");
            state.metrics.record_sign(Err(e.kind()));
        }
    }
    result.map(Json).map_err(ApiError)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
