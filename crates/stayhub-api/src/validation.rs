//! Field checks shared by the listing handlers.

use crate::error::ApiError;

pub const DEFAULT_CURRENCY: &str = "usd";
const MAX_TITLE_CHARS: usize = 120;
const MAX_DESCRIPTION_CHARS: usize = 5_000;

pub fn title(value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_TITLE_CHARS {
        return Err(ApiError::bad_request(format!("Title must be 1 to {} characters", MAX_TITLE_CHARS)));
    }
    Ok(trimmed.to_string())
}

pub fn description(value: &str) -> Result<String, ApiError> {
    if value.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ApiError::bad_request("Description is too long"));
    }
    Ok(value.trim().to_string())
}

pub fn location(value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request("Location is required"));
    }
    Ok(trimmed.to_string())
}

pub fn amount(field: &str, value: i64) -> Result<i64, ApiError> {
    if value < 0 {
        return Err(ApiError::bad_request(format!("{} cannot be negative", field)));
    }
    Ok(value)
}

pub fn capacity(field: &str, value: u32) -> Result<i64, ApiError> {
    if value == 0 {
        return Err(ApiError::bad_request(format!("{} must be at least 1", field)));
    }
    Ok(i64::from(value))
}

/// Three-letter ISO code, stored lower-case.
pub fn currency(value: Option<&str>) -> Result<String, ApiError> {
    let Some(value) = value else {
        return Ok(DEFAULT_CURRENCY.to_string());
    };
    let code = value.trim().to_ascii_lowercase();
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_lowercase()) {
        return Err(ApiError::bad_request("Currency must be a three-letter code"));
    }
    Ok(code)
}

/// Apply a validator to an optional PATCH field.
pub fn optional<T, U>(
    value: Option<T>,
    check: impl FnOnce(T) -> Result<U, ApiError>,
) -> Result<Option<U>, ApiError> {
    value.map(check).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_defaults_and_normalises() {
        assert_eq!(currency(None).unwrap(), "usd");
        assert_eq!(currency(Some(" EUR ")).unwrap(), "eur");
        assert!(currency(Some("euro")).is_err());
        assert!(currency(Some("e1r")).is_err());
    }

    #[test]
    fn title_is_trimmed_and_bounded() {
        assert_eq!(title("  Loft  ").unwrap(), "Loft");
        assert!(title("   ").is_err());
        assert!(title(&"x".repeat(121)).is_err());
    }

    #[test]
    fn capacities_start_at_one() {
        assert!(capacity("max_guests", 0).is_err());
        assert_eq!(capacity("max_guests", 3).unwrap(), 3);
        assert!(amount("price", -1).is_err());
    }
}
