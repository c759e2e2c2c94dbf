//! Payment processor webhooks.
//!
//! Events are signed with `Stripe-Signature: t=<unix>,v1=<hex>` where the
//! signature is HMAC-SHA256 over `"{t}.{body}"` keyed with the endpoint
//! secret. The body must be verified byte-for-byte before it is parsed.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, info, warn};

use stayhub_db::payments::PaymentUpdate;
use stayhub_types::events::{PaymentEvent, WebhookEvent};
use stayhub_types::models::{BookingStatus, Payment, PaymentStatus};

use crate::error::ApiError;
use crate::payments::settle;
use crate::state::{AppState, blocking};

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const SIGNATURE_TOLERANCE_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp outside the allowed window")]
    Stale,
    #[error("signature does not match payload")]
    Mismatch,
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<Hmac<Sha256>, SignatureError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Check a signature header against `payload` at time `now` (unix seconds).
/// Any one matching `v1` entry is enough; other schemes are ignored.
pub fn verify_signature(secret: &str, header: &str, payload: &[u8], now: i64) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Stale);
    }

    for candidate in candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        if mac_for(secret, timestamp, payload)?.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

/// Build a header value the way the processor does. Used by tests and local
/// tooling that replays events.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
    let signature = mac_for(secret, timestamp, payload)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let Some(secret) = state.webhook_secret.as_deref() else {
        return Err(ApiError::Unavailable("Webhooks are not configured".into()));
    };

    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing Stripe-Signature header"))?;

    if let Err(e) = verify_signature(secret, header, &body, chrono::Utc::now().timestamp()) {
        warn!("Rejected webhook: {}", e);
        return Err(ApiError::bad_request(format!("Invalid signature: {}", e)));
    }

    let event: WebhookEvent =
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(format!("Malformed event: {}", e)))?;
    let event_id = event.id.clone();

    match event.classify() {
        PaymentEvent::Succeeded { intent_id } => apply(&state, &intent_id, PaymentStatus::Succeeded).await?,
        PaymentEvent::Failed { intent_id, status } => {
            let status = status
                .as_deref()
                .and_then(PaymentStatus::from_provider)
                .unwrap_or(PaymentStatus::RequiresPaymentMethod);
            apply(&state, &intent_id, status).await?
        }
        PaymentEvent::Canceled { intent_id } => apply(&state, &intent_id, PaymentStatus::Canceled).await?,
        PaymentEvent::Refunded { intent_id } => apply(&state, &intent_id, PaymentStatus::Refunded).await?,
        PaymentEvent::Ignored { kind } => debug!("Ignoring webhook {} ({})", event_id, kind),
    }

    Ok(Json(json!({ "received": true })))
}

/// Whether an event may move a payment from `current` to `next`. Terminal
/// payments only move from succeeded to refunded; repeats are no-ops.
fn accepts(current: PaymentStatus, next: PaymentStatus) -> bool {
    if current == next {
        return false;
    }
    !current.is_terminal() || (current == PaymentStatus::Succeeded && next == PaymentStatus::Refunded)
}

async fn apply(state: &AppState, intent_id: &str, status: PaymentStatus) -> Result<(), ApiError> {
    let lookup = intent_id.to_string();
    let Some(row) = blocking(state, move |db| db.get_payment_by_intent(&lookup)).await? else {
        warn!("Webhook for unknown intent {}", intent_id);
        return Ok(());
    };
    let payment = Payment::try_from(row)?;

    if !accepts(payment.status, status) {
        debug!("Payment {} already {}; ignoring {}", payment.id, payment.status, status);
        return Ok(());
    }

    if status != PaymentStatus::Refunded {
        return settle(state, payment.id, payment.booking_id, status).await;
    }

    let payment_id = payment.id.to_string();
    let booking_id = payment.booking_id.to_string();
    blocking(state, move |db| {
        let booking = db
            .get_booking(&booking_id)?
            .ok_or_else(|| anyhow::anyhow!("payment {} points at missing booking {}", payment_id, booking_id))?;
        let from: BookingStatus = booking.status.parse()?;

        let update = PaymentUpdate { payment_id: &payment_id, status, refund_id: None };
        if from.can_transition_to(BookingStatus::Refunded)
            && db.transition_booking(&booking_id, from, BookingStatus::Refunded, Some(update))?
        {
            info!("Booking {} refunded by webhook", booking_id);
            return Ok(());
        }
        db.update_payment_status(&payment_id, status)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;

    #[test]
    fn valid_signature_is_accepted() {
        let header = signature_header(SECRET, 1_700_000_000, BODY).unwrap();
        assert_eq!(verify_signature(SECRET, &header, BODY, 1_700_000_100), Ok(()));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let header = signature_header(SECRET, 1_700_000_000, BODY).unwrap();
        let tampered = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_2"}}}"#;
        assert_eq!(
            verify_signature(SECRET, &header, tampered, 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature("whsec_other", &header, BODY, 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_signature_is_rejected() {
        let header = signature_header(SECRET, 1_700_000_000, BODY).unwrap();
        assert_eq!(
            verify_signature(SECRET, &header, BODY, 1_700_000_000 + SIGNATURE_TOLERANCE_SECS as i64 + 1),
            Err(SignatureError::Stale)
        );
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert_eq!(verify_signature(SECRET, "garbage", BODY, 0), Err(SignatureError::Malformed));
        assert_eq!(verify_signature(SECRET, "t=0", BODY, 0), Err(SignatureError::Malformed));
        assert_eq!(verify_signature(SECRET, "t=0,v1=zz", BODY, 0), Err(SignatureError::Mismatch));
    }

    #[test]
    fn extra_schemes_and_rotated_secrets() {
        let good = signature_header(SECRET, 10, BODY).unwrap();
        let v1 = good.split_once(",v1=").unwrap().1;
        let header = format!("t=10,v0=abc,v1={},v1={}", "00".repeat(32), v1);
        assert_eq!(verify_signature(SECRET, &header, BODY, 10), Ok(()));
    }

    #[test]
    fn terminal_payments_only_move_to_refunded() {
        assert!(accepts(PaymentStatus::RequiresPaymentMethod, PaymentStatus::Succeeded));
        assert!(accepts(PaymentStatus::Succeeded, PaymentStatus::Refunded));
        assert!(!accepts(PaymentStatus::Succeeded, PaymentStatus::Succeeded));
        assert!(!accepts(PaymentStatus::Succeeded, PaymentStatus::Processing));
        assert!(!accepts(PaymentStatus::Canceled, PaymentStatus::Succeeded));
    }
}
