/// REST API routes for the attestation service.
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::AppState;
use crate::anchor::ledger::AnchorStatusEntry;
use crate::anchor::scheduler::AnchorScheduler;
use crate::archive::ClaimArchive;
use crate::bundle::Bundle;
use crate::crypto::sign::{SignatureRecord, SignOptions};
use crate::error::AttestError;
use crate::manifest::{Manifest, ManifestBuilder};
use crate::verify;

/// Error payload returned by all routes.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: AttestError) -> ApiError {
    let status = match &err {
        AttestError::Validation(_) | AttestError::UnsupportedType(_) => StatusCode::BAD_REQUEST,
        AttestError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn decode_hash(raw: &str) -> Result<[u8; 32], AttestError> {
    let bytes = hex::decode(raw)
        .map_err(|e| AttestError::Serialization(format!("content hash: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| AttestError::Serialization("content hash must be 32 bytes".into()))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

// ─── Health ──────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

// ─── Attest ──────────────────────────────────────────────

/// Request to attest a claim payload.
#[derive(Debug, Deserialize)]
struct AttestRequest {
    /// The claim being attested (a policy decision record, a mathematical
    /// claim, …). Must be a JSON object.
    claim: Value,
    /// Rule ids / policy versions from the policy collaborator.
    #[serde(default)]
    policy_context: Option<Value>,
    /// When true, persist a retrievable evidence bundle.
    #[serde(default)]
    bundle: bool,
    /// Optional companion artifact (e.g., a rendered report), hex-encoded.
    #[serde(default)]
    artifact_hex: Option<String>,
    /// Opt out of the classical signature.
    #[serde(default)]
    disable_classical: bool,
    /// Opt out of the post-quantum signature.
    #[serde(default)]
    disable_post_quantum: bool,
}

#[derive(Debug, Serialize)]
struct BundleSummary {
    bundle_id: String,
    bundle_url: String,
    bundle_hash: String,
    signatures: std::collections::BTreeMap<String, SignatureRecord>,
}

#[derive(Debug, Serialize)]
struct AttestResponse {
    /// The decision record as supplied by the policy collaborator.
    decision: Value,
    content_hash: String,
    recorded_day: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    bundle: Option<BundleSummary>,
}

/// POST /api/attest — attest a claim, optionally emitting a bundle.
async fn attest(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AttestRequest>,
) -> Result<(StatusCode, Json<AttestResponse>), ApiError> {
    let artifact = match &req.artifact_hex {
        Some(raw) => Some(
            hex::decode(raw)
                .map_err(|e| bad_request(format!("artifact_hex is not valid hex: {e}")))?,
        ),
        None => None,
    };

    let opts = SignOptions {
        classical: !req.disable_classical,
        post_quantum: !req.disable_post_quantum,
    };
    let policy_context = req.policy_context.unwrap_or(Value::Null);

    let builder = ManifestBuilder::new(&state.signer);
    let manifest = builder
        .build(&req.claim, policy_context, artifact.as_deref(), opts)
        .map_err(api_error)?;

    // Every attested claim joins the day's anchor set, bundled or not
    let day = Utc::now().date_naive();
    let content_hash = decode_hash(&manifest.content_hash).map_err(api_error)?;
    state
        .archive
        .record(day, &content_hash)
        .map_err(api_error)?;

    let bundle = if req.bundle {
        let stored = state
            .store
            .save(&manifest, artifact.as_deref())
            .map_err(api_error)?;
        info!(bundle_id = %stored.id, "evidence bundle stored");
        Some(BundleSummary {
            bundle_url: format!("/api/bundles/{}", stored.id),
            bundle_id: stored.id,
            bundle_hash: manifest.bundle_hash.clone(),
            signatures: manifest.signatures.clone(),
        })
    } else {
        None
    };

    Ok((
        StatusCode::CREATED,
        Json(AttestResponse {
            decision: req.claim,
            content_hash: manifest.content_hash.clone(),
            recorded_day: ClaimArchive::day_key(day),
            bundle,
        }),
    ))
}

pub fn attest_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/attest", post(attest))
}

// ─── Bundles ─────────────────────────────────────────────

/// GET /api/bundles/:id — the stored manifest.
async fn get_bundle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Manifest>, ApiError> {
    let bundle = state.store.load(&id).map_err(api_error)?;
    Ok(Json(bundle.manifest))
}

/// GET /api/bundles/:id/artifact — the companion artifact bytes.
async fn get_bundle_artifact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<([(header::HeaderName, &'static str); 1], Vec<u8>), ApiError> {
    let bundle = state.store.load(&id).map_err(api_error)?;
    let artifact = bundle
        .artifact
        .ok_or_else(|| api_error(AttestError::NotFound(format!("{id}/artifact"))))?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], artifact))
}

/// Request to verify a bundle, stored or inline.
#[derive(Debug, Deserialize)]
struct VerifyRequest {
    /// Id of a stored bundle.
    #[serde(default)]
    bundle_id: Option<String>,
    /// Inline manifest, for bundles not held by this service.
    #[serde(default)]
    manifest: Option<Manifest>,
    /// Inline companion artifact, hex-encoded.
    #[serde(default)]
    artifact_hex: Option<String>,
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    valid: bool,
    reasons: Vec<String>,
    manifest: Manifest,
}

/// POST /api/verify — recompute hashes and check signatures.
async fn verify_bundle(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let bundle = match (req.bundle_id, req.manifest) {
        (Some(id), None) => state.store.load(&id).map_err(api_error)?,
        (None, Some(manifest)) => {
            let artifact = match &req.artifact_hex {
                Some(raw) => Some(hex::decode(raw).map_err(|e| {
                    bad_request(format!("artifact_hex is not valid hex: {e}"))
                })?),
                None => None,
            };
            Bundle {
                id: manifest.bundle_hash.clone(),
                manifest,
                artifact,
            }
        }
        _ => {
            return Err(bad_request(
                "provide exactly one of bundle_id or an inline manifest",
            ))
        }
    };

    let report = verify::verify(&bundle);
    Ok(Json(VerifyResponse {
        valid: report.valid,
        reasons: report.reasons,
        manifest: bundle.manifest,
    }))
}

pub fn bundle_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/bundles/:id", get(get_bundle))
        .route("/api/bundles/:id/artifact", get(get_bundle_artifact))
        .route("/api/verify", post(verify_bundle))
}

// ─── Anchor status & trigger ─────────────────────────────

#[derive(Debug, Serialize)]
struct AnchorStatusResponse {
    healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    latest: Option<AnchorStatusEntry>,
    history: Vec<AnchorStatusEntry>,
}

/// GET /api/anchor/status — rolling history plus derived health.
async fn anchor_status(State(state): State<Arc<AppState>>) -> Json<AnchorStatusResponse> {
    Json(AnchorStatusResponse {
        healthy: state.ledger.healthy(Utc::now()),
        latest: state.ledger.latest(),
        history: state.ledger.snapshot(),
    })
}

/// Request to force an out-of-schedule anchor run.
#[derive(Debug, Default, Deserialize)]
struct AnchorRunRequest {
    /// Target day, `YYYYMMDD`. Defaults to the previous UTC day.
    #[serde(default)]
    day: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnchorRunResponse {
    day: String,
    accepted: bool,
}

/// POST /api/anchor/run — manual trigger, idempotent per day.
///
/// The run happens out-of-band; poll /api/anchor/status for the outcome.
async fn anchor_run(
    State(state): State<Arc<AppState>>,
    body: Option<Json<AnchorRunRequest>>,
) -> Result<(StatusCode, Json<AnchorRunResponse>), ApiError> {
    let batcher = state.batcher.clone().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "anchoring is not configured".into(),
            }),
        )
    })?;

    let req = body.map(|Json(r)| r).unwrap_or_default();
    let day = match &req.day {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y%m%d")
            .map_err(|e| bad_request(format!("day must be YYYYMMDD: {e}")))?,
        None => AnchorScheduler::target_day(Utc::now()),
    };

    let day_key = ClaimArchive::day_key(day);
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = batcher.run_for_day(day, shutdown).await {
            tracing::error!(day = %ClaimArchive::day_key(day), error = %e, "manual anchor run failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(AnchorRunResponse {
            day: day_key,
            accepted: true,
        }),
    ))
}

pub fn anchor_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/anchor/status", get(anchor_status))
        .route("/api/anchor/run", post(anchor_run))
}
