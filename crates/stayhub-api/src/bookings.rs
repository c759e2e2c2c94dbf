use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Days, NaiveDate, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use stayhub_db::bookings::{BookingInsert, NewBooking};
use stayhub_db::models::{BookingRow, ListingRef, parse_date};
use stayhub_db::payments::PaymentUpdate;
use stayhub_types::api::{Claims, CreateBookingRequest};
use stayhub_types::models::{Booking, BookingStatus, Payment, PaymentStatus, UserRole};

use crate::error::ApiError;
use crate::middleware::{can_manage, is_self, require_host};
use crate::state::{AppState, blocking};
use crate::{experiences, pricing, properties};

/// Listing details a new booking is priced and checked against.
struct Quote {
    listing: ListingRef,
    host_id: Uuid,
    check_out: NaiveDate,
    total_price: i64,
    currency: String,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.guests == 0 {
        return Err(ApiError::bad_request("guests must be at least 1"));
    }
    if req.check_in < Utc::now().date_naive() {
        return Err(ApiError::bad_request("check_in cannot be in the past"));
    }

    let quote = match (req.property_id, req.experience_id) {
        (Some(property_id), None) => quote_stay(&state, property_id, &req).await?,
        (None, Some(experience_id)) => quote_experience(&state, experience_id, &req).await?,
        _ => return Err(ApiError::bad_request("Provide exactly one of property_id or experience_id")),
    };

    if quote.host_id == claims.sub {
        return Err(ApiError::forbidden("You cannot book your own listing"));
    }

    let booking_id = Uuid::new_v4();
    let new = NewBooking {
        id: booking_id.to_string(),
        guest_id: claims.sub.to_string(),
        listing: quote.listing,
        check_in: req.check_in.to_string(),
        check_out: quote.check_out.to_string(),
        guests: i64::from(req.guests),
        total_price: quote.total_price,
        currency: quote.currency,
    };

    match blocking(&state, move |db| db.create_booking(&new)).await? {
        BookingInsert::Created => {
            let booking = Booking::try_from(load_row(&state, booking_id).await?)?;
            Ok((StatusCode::CREATED, Json(booking)))
        }
        BookingInsert::Unavailable => Err(ApiError::conflict("Those dates are not available")),
    }
}

async fn quote_stay(state: &AppState, property_id: Uuid, req: &CreateBookingRequest) -> Result<Quote, ApiError> {
    let property = properties::load(state, property_id).await?;
    let check_out = req
        .check_out
        .ok_or_else(|| ApiError::bad_request("check_out is required for stays"))?;
    let nights = pricing::nights(req.check_in, check_out)?;

    if req.guests > property.max_guests {
        return Err(ApiError::bad_request(format!(
            "This property sleeps at most {} guests",
            property.max_guests
        )));
    }

    Ok(Quote {
        listing: ListingRef::Property(property_id.to_string()),
        host_id: property.host_id,
        check_out,
        total_price: pricing::stay_total(nights, property.price_per_night, property.cleaning_fee)?,
        currency: property.currency,
    })
}

/// Experiences occupy a single day.
async fn quote_experience(
    state: &AppState,
    experience_id: Uuid,
    req: &CreateBookingRequest,
) -> Result<Quote, ApiError> {
    let experience = experiences::load(state, experience_id).await?;
    let next_day = req
        .check_in
        .checked_add_days(Days::new(1))
        .ok_or_else(|| ApiError::bad_request("check_in is out of range"))?;

    if req.check_out.is_some_and(|check_out| check_out != next_day) {
        return Err(ApiError::bad_request("Experiences are booked for a single day"));
    }
    if req.guests > experience.max_participants {
        return Err(ApiError::bad_request(format!(
            "This experience takes at most {} participants",
            experience.max_participants
        )));
    }

    Ok(Quote {
        listing: ListingRef::Experience(experience_id.to_string()),
        host_id: experience.host_id,
        check_out: next_day,
        total_price: pricing::experience_total(req.guests, experience.price_per_person)?,
        currency: experience.currency,
    })
}

pub async fn list_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let guest_id = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.list_bookings_for_guest(&guest_id)).await?;
    let bookings = rows
        .into_iter()
        .map(Booking::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(bookings))
}

pub async fn list_host(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_host(&claims)?;
    let host_id = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.list_bookings_for_host(&host_id)).await?;
    let bookings = rows
        .into_iter()
        .map(Booking::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(bookings))
}

pub async fn get(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = load_visible(&state, &claims, booking_id).await?;
    Ok(Json(Booking::try_from(row)?))
}

// -- Lifecycle --

pub async fn cancel(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = load_visible(&state, &claims, booking_id).await?;
    if !is_self(&claims, &row.guest_id) && !is_org_admin(&claims, &row) {
        return Err(ApiError::forbidden("Only the guest can cancel this booking"));
    }

    let status = current_status(&row)?;
    ensure_transition(status, BookingStatus::Cancelled, "cancelled")?;

    let exit = unwind_payment(&state, booking_id).await?;
    let target = match &exit {
        Some(exit) if exit.status == PaymentStatus::Refunded && status.can_transition_to(BookingStatus::Refunded) => {
            BookingStatus::Refunded
        }
        _ => BookingStatus::Cancelled,
    };

    let booking = finish(&state, booking_id, status, target, exit).await?;
    info!("Booking {} cancelled by {} ({})", booking_id, claims.sub, booking.status);
    Ok(Json(booking))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = load_visible(&state, &claims, booking_id).await?;
    ensure_listing_manager(&claims, &row)?;

    let status = current_status(&row)?;
    ensure_transition(status, BookingStatus::Rejected, "rejected")?;

    let exit = unwind_payment(&state, booking_id).await?;
    let booking = finish(&state, booking_id, status, BookingStatus::Rejected, exit).await?;
    info!("Booking {} rejected by {}", booking_id, claims.sub);
    Ok(Json(booking))
}

pub async fn complete(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = load_visible(&state, &claims, booking_id).await?;
    ensure_listing_manager(&claims, &row)?;

    let status = current_status(&row)?;
    ensure_transition(status, BookingStatus::Completed, "completed")?;

    let check_out = parse_date(&row.check_out)?;
    if check_out > Utc::now().date_naive() {
        return Err(ApiError::bad_request("A booking can only be completed after check-out"));
    }

    let booking = finish(&state, booking_id, status, BookingStatus::Completed, None).await?;
    info!("Booking {} completed", booking_id);
    Ok(Json(booking))
}

/// What a booking's payment becomes when the booking ends early.
struct PaymentExit {
    payment_id: String,
    status: PaymentStatus,
    refund_id: Option<String>,
}

/// Refund a captured payment or cancel an open intent. Returns None when
/// there is nothing to unwind.
async fn unwind_payment(state: &AppState, booking_id: Uuid) -> Result<Option<PaymentExit>, ApiError> {
    let id = booking_id.to_string();
    let Some(row) = blocking(state, move |db| db.get_payment_by_booking(&id)).await? else {
        return Ok(None);
    };
    let payment = Payment::try_from(row)?;
    let Some(intent_id) = payment.provider_intent_id.as_deref() else {
        return Ok(None);
    };

    match payment.status {
        PaymentStatus::Succeeded => {
            let refund_id = state.provider.refund(intent_id, payment.amount).await?;
            info!("Refunded payment {} ({})", payment.id, refund_id);
            Ok(Some(PaymentExit {
                payment_id: payment.id.to_string(),
                status: PaymentStatus::Refunded,
                refund_id: Some(refund_id),
            }))
        }
        status if !status.is_terminal() => {
            if let Err(e) = state.provider.cancel_intent(intent_id).await {
                warn!("Could not cancel intent {} for booking {}: {}", intent_id, booking_id, e);
            }
            Ok(Some(PaymentExit {
                payment_id: payment.id.to_string(),
                status: PaymentStatus::Canceled,
                refund_id: None,
            }))
        }
        _ => Ok(None),
    }
}

/// Apply the transition (and payment outcome) and return the fresh booking.
async fn finish(
    state: &AppState,
    booking_id: Uuid,
    from: BookingStatus,
    to: BookingStatus,
    exit: Option<PaymentExit>,
) -> Result<Booking, ApiError> {
    let id = booking_id.to_string();
    let moved = blocking(state, move |db| {
        let update = exit.as_ref().map(|exit| PaymentUpdate {
            payment_id: &exit.payment_id,
            status: exit.status,
            refund_id: exit.refund_id.as_deref(),
        });
        let moved = db.transition_booking(&id, from, to, update)?;
        if !moved {
            // Keep the payment row honest even if the booking moved underneath us.
            if let Some(exit) = &exit {
                db.update_payment_status(&exit.payment_id, exit.status)?;
            }
        }
        Ok(moved)
    })
    .await?;

    if !moved {
        error!("Booking {} left {} while being moved to {}", booking_id, from, to);
        return Err(ApiError::conflict("Booking was changed by another request; reload and try again"));
    }

    Ok(Booking::try_from(load_row(state, booking_id).await?)?)
}

// -- Helpers --

pub(crate) async fn load_row(state: &AppState, booking_id: Uuid) -> Result<BookingRow, ApiError> {
    let id = booking_id.to_string();
    blocking(state, move |db| db.get_booking(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Booking"))
}

/// Bookings are visible to their guest, the listing host and the listing
/// organization's admins. Everyone else gets a 404.
pub(crate) async fn load_visible(state: &AppState, claims: &Claims, booking_id: Uuid) -> Result<BookingRow, ApiError> {
    let row = load_row(state, booking_id).await?;
    if is_self(claims, &row.guest_id) || can_manage(claims, &row.listing_host_id, &row.listing_organization_id) {
        Ok(row)
    } else {
        Err(ApiError::not_found("Booking"))
    }
}

pub(crate) fn current_status(row: &BookingRow) -> Result<BookingStatus, ApiError> {
    row.status
        .parse::<BookingStatus>()
        .map_err(|e| ApiError::Internal(e.into()))
}

fn ensure_transition(from: BookingStatus, to: BookingStatus, verb: &str) -> Result<(), ApiError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ApiError::conflict(format!("Booking is {} and cannot be {}", from, verb)))
    }
}

fn ensure_listing_manager(claims: &Claims, row: &BookingRow) -> Result<(), ApiError> {
    if can_manage(claims, &row.listing_host_id, &row.listing_organization_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the host can do that"))
    }
}

fn is_org_admin(claims: &Claims, row: &BookingRow) -> bool {
    claims.role == UserRole::Admin && claims.org.to_string() == row.listing_organization_id
}
