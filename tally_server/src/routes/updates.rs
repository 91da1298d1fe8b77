//! Inbound update webhook.
//!
//! The transport delivers updates at-least-once and treats anything but a
//! fast 2xx as a reason to redeliver. So: verify authenticity and shape,
//! then acknowledge. Even when processing fails internally, the ledger
//! records the failure and the delivery is still accepted.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use tally_core::ledger::intake::IntakeOutcome;

use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("malformed update: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct InboundUpdate {
    update_id: i64,
}

#[tracing::instrument(level = "debug", skip_all)]
pub async fn inbound_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    match handle_inbound(state, headers, body).await {
        Ok(outcome) => {
            let status = match outcome {
                IntakeOutcome::Dispatched => "ok",
                IntakeOutcome::Duplicate => "duplicate",
                IntakeOutcome::Failed => "failed",
            };
            (StatusCode::OK, Json(serde_json::json!({ "status": status }))).into_response()
        }
        Err(err) => {
            let status = match err {
                UpdateError::SignatureVerificationFailed => StatusCode::UNAUTHORIZED,
                UpdateError::Malformed(_) => StatusCode::BAD_REQUEST,
            };
            (
                status,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

#[tracing::instrument(level = "debug", skip_all)]
async fn handle_inbound(
    state: AppState,
    headers: HeaderMap,
    body: Bytes,
) -> Result<IntakeOutcome, UpdateError> {
    verify_signature_if_configured(state.signing_secret.as_deref(), &headers, &body)?;

    let update: InboundUpdate = serde_json::from_slice(&body)
        .map_err(|e| UpdateError::Malformed(e.to_string()))?;
    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| UpdateError::Malformed(e.to_string()))?;

    Ok(state.intake.handle(update.update_id, payload).await)
}

#[tracing::instrument(level = "debug", skip_all)]
fn verify_signature_if_configured(
    secret: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), UpdateError> {
    let Some(secret) = secret else {
        return Ok(());
    };

    let Some(sig) = headers.get("x-tally-signature") else {
        return Err(UpdateError::SignatureVerificationFailed);
    };
    let sig = sig
        .to_str()
        .map_err(|_| UpdateError::SignatureVerificationFailed)?;
    verify_tally_signature(secret, sig, body)
}

/// Verify an inbound webhook signature.
///
/// Accepts `x-tally-signature` in either raw hex or `sha256=<hex>` format.
#[tracing::instrument(level = "debug", skip(body))]
pub fn verify_tally_signature(
    secret: &str,
    signature_header: &str,
    body: &[u8],
) -> Result<(), UpdateError> {
    let sig = signature_header.trim();
    let sig_hex = sig.strip_prefix("sha256=").unwrap_or(sig);
    let provided =
        hex::decode(sig_hex).map_err(|_| UpdateError::SignatureVerificationFailed)?;

    // `hmac` provides constant-time verification.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| UpdateError::SignatureVerificationFailed)?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| UpdateError::SignatureVerificationFailed)?;

    Ok(())
}

/// Compute a webhook signature header value for `body`.
///
/// Format: `sha256=<hex>`
#[tracing::instrument(level = "debug", skip(body))]
pub fn sign_tally_body(secret: &str, body: &[u8]) -> Result<String, UpdateError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| UpdateError::SignatureVerificationFailed)?;
    mac.update(body);
    let bytes = mac.finalize().into_bytes();
    Ok(format!("sha256={}", hex::encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tally_core::ledger::intake::{UpdateDispatcher, UpdateIntake};
    use tally_core::ledger::memory::MemoryIngestLedger;

    #[derive(Default)]
    struct CountingDispatcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UpdateDispatcher for CountingDispatcher {
        async fn dispatch(
            &self,
            _update_id: i64,
            _payload: &serde_json::Value,
        ) -> tally_core::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn state(secret: Option<&str>) -> (AppState, Arc<CountingDispatcher>) {
        let dispatcher = Arc::new(CountingDispatcher::default());
        let intake = Arc::new(UpdateIntake::new(
            Arc::new(MemoryIngestLedger::new()),
            dispatcher.clone(),
        ));
        (
            AppState::new(intake, secret.map(str::to_string)),
            dispatcher,
        )
    }

    #[test]
    fn signature_roundtrip_verifies() {
        let body = br#"{"update_id": 1}"#;
        let sig = sign_tally_body("secret", body).unwrap();
        assert!(sig.starts_with("sha256="));
        verify_tally_signature("secret", &sig, body).unwrap();

        // Raw hex (no prefix) is accepted too.
        let raw = sig.strip_prefix("sha256=").unwrap();
        verify_tally_signature("secret", raw, body).unwrap();
    }

    #[test]
    fn tampered_body_fails_verification() {
        let sig = sign_tally_body("secret", br#"{"update_id": 1}"#).unwrap();
        let err = verify_tally_signature("secret", &sig, br#"{"update_id": 2}"#).unwrap_err();
        assert!(matches!(err, UpdateError::SignatureVerificationFailed));
    }

    #[tokio::test]
    async fn unsigned_updates_pass_when_no_secret_is_configured() {
        let (state, dispatcher) = state(None);
        let body = Bytes::from_static(br#"{"update_id": 101, "message": {}}"#);

        let outcome = handle_inbound(state.clone(), HeaderMap::new(), body.clone())
            .await
            .unwrap();
        assert_eq!(outcome, IntakeOutcome::Dispatched);

        // Redelivery is acknowledged without re-dispatching.
        let outcome = handle_inbound(state, HeaderMap::new(), body).await.unwrap();
        assert_eq!(outcome, IntakeOutcome::Duplicate);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn signed_updates_are_enforced_when_configured() {
        let (state, _) = state(Some("secret"));
        let body = Bytes::from_static(br#"{"update_id": 5}"#);

        let err = handle_inbound(state.clone(), HeaderMap::new(), body.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::SignatureVerificationFailed));

        let mut headers = HeaderMap::new();
        let sig = sign_tally_body("secret", &body).unwrap();
        headers.insert("x-tally-signature", sig.parse().unwrap());
        let outcome = handle_inbound(state, headers, body).await.unwrap();
        assert_eq!(outcome, IntakeOutcome::Dispatched);
    }

    #[tokio::test]
    async fn malformed_bodies_are_rejected() {
        let (state, _) = state(None);
        let body = Bytes::from_static(b"not json");
        let err = handle_inbound(state, HeaderMap::new(), body)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Malformed(_)));
    }
}
