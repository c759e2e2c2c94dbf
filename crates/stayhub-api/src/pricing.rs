//! Booking totals in minor units.

use chrono::NaiveDate;

use crate::error::ApiError;

pub const MAX_NIGHTS: i64 = 365;

/// Nights between two dates. Errors unless `check_out > check_in`.
pub fn nights(check_in: NaiveDate, check_out: NaiveDate) -> Result<i64, ApiError> {
    let nights = (check_out - check_in).num_days();
    if nights < 1 {
        return Err(ApiError::bad_request("check_out must be after check_in"));
    }
    if nights > MAX_NIGHTS {
        return Err(ApiError::bad_request(format!("Stays are limited to {} nights", MAX_NIGHTS)));
    }
    Ok(nights)
}

pub fn stay_total(nights: i64, price_per_night: i64, cleaning_fee: i64) -> Result<i64, ApiError> {
    nights
        .checked_mul(price_per_night)
        .and_then(|subtotal| subtotal.checked_add(cleaning_fee))
        .ok_or_else(overflow)
}

pub fn experience_total(guests: u32, price_per_person: i64) -> Result<i64, ApiError> {
    i64::from(guests).checked_mul(price_per_person).ok_or_else(overflow)
}

fn overflow() -> ApiError {
    ApiError::bad_request("Booking total is too large")
}
