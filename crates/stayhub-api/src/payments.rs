use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use stayhub_db::models::{PaymentRow, parse_uuid};
use stayhub_db::payments::{NewPayment, PaymentUpdate};
use stayhub_types::api::{Claims, ConfirmPaymentResponse, CreateIntentRequest, IntentResponse, PaymentConfigResponse};
use stayhub_types::models::{Booking, BookingStatus, Payment, PaymentStatus};

use crate::bookings::{current_status, load_row, load_visible};
use crate::error::ApiError;
use crate::middleware::is_self;
use crate::provider::{ProviderError, ProviderIntent};
use crate::state::{AppState, blocking};

/// Public: what the browser needs to mount the hosted payment element.
pub async fn config(State(state): State<AppState>) -> impl IntoResponse {
    Json(PaymentConfigResponse {
        provider: state.provider.name().to_string(),
        publishable_key: state.publishable_key.clone(),
    })
}

/// Create (or reuse) the intent for a pending booking and hand back its
/// client secret.
pub async fn create_intent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateIntentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = load_row(&state, req.booking_id).await?;
    if !is_self(&claims, &booking.guest_id) {
        return Err(ApiError::not_found("Booking"));
    }

    let status = current_status(&booking)?;
    if status != BookingStatus::Pending {
        return Err(ApiError::conflict(format!("Booking is {} and cannot be paid", status)));
    }

    let id = booking.id.clone();
    let existing = blocking(&state, move |db| db.get_payment_by_booking(&id)).await?;

    let Some(payment) = existing else {
        let intent = state
            .provider
            .create_intent(booking.total_price, &booking.currency, req.booking_id)
            .await?;
        let client_secret = secret_of(&intent)?;
        let payment_id = Uuid::new_v4();
        let new = NewPayment {
            id: payment_id.to_string(),
            booking_id: booking.id.clone(),
            provider: state.provider.name().to_string(),
            provider_intent_id: intent.id.clone(),
            client_secret: client_secret.clone(),
            amount: booking.total_price,
            currency: booking.currency.clone(),
            status: intent.status,
        };
        blocking(&state, move |db| db.insert_payment(&new)).await?;
        info!("Payment {} opened for booking {} (intent {})", payment_id, booking.id, intent.id);

        let response = IntentResponse {
            payment_id,
            client_secret,
            amount: booking.total_price,
            currency: booking.currency,
            status: intent.status,
        };
        return Ok((StatusCode::CREATED, Json(response)));
    };

    let payment_status = parse_status(&payment)?;
    match (payment_status, payment.client_secret.as_deref()) {
        (PaymentStatus::Succeeded, _) => Err(ApiError::conflict("This booking is already paid")),
        (PaymentStatus::Refunded, _) => Err(ApiError::conflict("This booking's payment was refunded")),
        (status, Some(secret)) if status != PaymentStatus::Canceled => {
            let response = IntentResponse {
                payment_id: parse_uuid(&payment.id)?,
                client_secret: secret.to_string(),
                amount: payment.amount,
                currency: payment.currency.clone(),
                status,
            };
            Ok((StatusCode::OK, Json(response)))
        }
        // No secret yet, or the old intent was abandoned.
        _ => Ok((StatusCode::OK, Json(refresh_intent(&state, payment, req.booking_id).await?))),
    }
}

async fn refresh_intent(state: &AppState, payment: PaymentRow, booking_id: Uuid) -> Result<IntentResponse, ApiError> {
    let intent = state
        .provider
        .create_intent(payment.amount, &payment.currency, booking_id)
        .await?;
    let client_secret = secret_of(&intent)?;

    let payment_id = payment.id.clone();
    let intent_id = intent.id.clone();
    let secret = client_secret.clone();
    let status = intent.status;
    blocking(state, move |db| db.attach_intent(&payment_id, &intent_id, &secret, status)).await?;
    info!("Payment {} moved to fresh intent {}", payment.id, intent.id);

    Ok(IntentResponse {
        payment_id: parse_uuid(&payment.id)?,
        client_secret,
        amount: payment.amount,
        currency: payment.currency,
        status: intent.status,
    })
}

/// Called by the browser after the hosted element finishes. The provider is
/// the source of truth; we only copy its answer.
pub async fn confirm(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let id = payment_id.to_string();
    let payment = blocking(&state, move |db| db.get_payment(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Payment"))?;
    let payment = Payment::try_from(payment)?;

    let booking = load_row(&state, payment.booking_id).await?;
    if !is_self(&claims, &booking.guest_id) {
        return Err(ApiError::not_found("Payment"));
    }

    // Settled payments are final here; refunds keep reporting `succeeded` upstream.
    if !payment.status.is_terminal() {
        let intent_id = payment
            .provider_intent_id
            .as_deref()
            .ok_or_else(|| ApiError::conflict("Payment has no intent yet"))?;
        let intent = state.provider.retrieve_intent(intent_id).await?;
        settle(&state, payment.id, payment.booking_id, intent.status).await?;
    }

    Ok(Json(snapshot(&state, payment.id, payment.booking_id).await?))
}

pub async fn get_by_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    load_visible(&state, &claims, booking_id).await?;
    let id = booking_id.to_string();
    let row = blocking(&state, move |db| db.get_payment_by_booking(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Payment"))?;

    Ok(Json(Payment::try_from(row)?))
}

/// Record a provider status on a payment. A success also confirms the
/// booking, in the same transaction, when it is still pending.
pub(crate) async fn settle(
    state: &AppState,
    payment_id: Uuid,
    booking_id: Uuid,
    status: PaymentStatus,
) -> Result<(), ApiError> {
    let payment_id = payment_id.to_string();
    let booking_id = booking_id.to_string();

    blocking(state, move |db| {
        if status == PaymentStatus::Succeeded {
            let update = PaymentUpdate { payment_id: &payment_id, status, refund_id: None };
            if db.transition_booking(&booking_id, BookingStatus::Pending, BookingStatus::Confirmed, Some(update))? {
                info!("Booking {} confirmed by payment {}", booking_id, payment_id);
                return Ok(());
            }
            warn!("Payment {} succeeded but booking {} is no longer pending", payment_id, booking_id);
        }
        db.update_payment_status(&payment_id, status)
    })
    .await
}

async fn snapshot(state: &AppState, payment_id: Uuid, booking_id: Uuid) -> Result<ConfirmPaymentResponse, ApiError> {
    let id = payment_id.to_string();
    let payment = blocking(state, move |db| db.get_payment(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Payment"))?;

    Ok(ConfirmPaymentResponse {
        payment: Payment::try_from(payment)?,
        booking: Booking::try_from(load_row(state, booking_id).await?)?,
    })
}

fn secret_of(intent: &ProviderIntent) -> Result<String, ApiError> {
    intent
        .client_secret
        .clone()
        .ok_or_else(|| ProviderError::Rejected(format!("intent {} came back without a client secret", intent.id)).into())
}

fn parse_status(payment: &PaymentRow) -> Result<PaymentStatus, ApiError> {
    payment
        .status
        .parse::<PaymentStatus>()
        .map_err(|e| ApiError::Internal(e.into()))
}
