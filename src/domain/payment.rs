//! Payment instrument validation and the stored payment record.
//!
//! Validation is pure and shared between the standalone validate endpoint
//! and the settlement path, so both enforce identical rules. The raw card
//! number and CVV never outlive validation; only the masked form is stored.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CommerceError, Result};

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub user_id: String,
    pub card_masked: String,
    pub expiry: String,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        order_id: impl Into<String>,
        user_id: impl Into<String>,
        card_masked: impl Into<String>,
        expiry: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.into(),
            user_id: user_id.into(),
            card_masked: card_masked.into(),
            expiry: expiry.into(),
            created_at: Utc::now(),
        }
    }
}

/// Redact all but the last four characters. Inputs shorter than four
/// have nothing meaningful to keep and are rejected. Counts characters,
/// not bytes, so arbitrary input cannot split a UTF-8 boundary.
pub fn mask_card(card_number: &str) -> Result<String> {
    let len = card_number.chars().count();
    if len < 4 {
        return Err(CommerceError::validation(
            "Card number too short to mask (minimum 4 digits)",
        ));
    }
    let visible: String = card_number.chars().skip(len - 4).collect();
    Ok(format!("{}{}", "*".repeat(len - 4), visible))
}

/// `MM/YY`, month 1-12. Two-digit years are anchored to 2000.
fn parse_expiry(expiry: &str) -> Result<(u32, i32)> {
    let invalid = || CommerceError::validation("Expiry must be in MM/YY format");
    let (month, year) = expiry.split_once('/').ok_or_else(invalid)?;
    if month.len() != 2 || year.len() != 2 {
        return Err(invalid());
    }
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(CommerceError::validation("Expiry month must be 1-12"));
    }
    Ok((month, 2000 + year))
}

/// Validate a payment instrument against a fixed clock. A card is accepted
/// through the end of its expiry month; only a month strictly before the
/// current one is expired.
pub fn validate_instrument_at(
    card_number: &str,
    expiry: &str,
    cvv: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    if card_number.len() != 16 || !card_number.chars().all(|c| c.is_ascii_digit()) {
        return Err(CommerceError::validation(
            "Card number must be exactly 16 digits",
        ));
    }
    let (month, year) = parse_expiry(expiry)?;
    if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
        return Err(CommerceError::validation("CVV must be 3 or 4 digits"));
    }
    if (year, month) < (now.year(), now.month()) {
        return Err(CommerceError::validation(format!(
            "Card expired {expiry}"
        )));
    }
    Ok(())
}

pub fn validate_instrument(card_number: &str, expiry: &str, cvv: &str) -> Result<()> {
    validate_instrument_at(card_number, expiry, cvv, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32, month: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn accepts_a_valid_instrument() {
        validate_instrument_at("1234567890123456", "12/30", "123", at(2026, 8)).unwrap();
        validate_instrument_at("1234567890123456", "12/30", "1234", at(2026, 8)).unwrap();
    }

    #[test]
    fn rejects_bad_card_numbers() {
        assert!(validate_instrument_at("123456789012345", "12/30", "123", at(2026, 8)).is_err());
        assert!(validate_instrument_at("12345678901234567", "12/30", "123", at(2026, 8)).is_err());
        assert!(validate_instrument_at("1234-5678-9012-34", "12/30", "123", at(2026, 8)).is_err());
    }

    #[test]
    fn rejects_malformed_expiry() {
        for expiry in ["1230", "13/30", "00/30", "1/30", "12/3", "ab/cd"] {
            assert!(
                validate_instrument_at("1234567890123456", expiry, "123", at(2026, 8)).is_err(),
                "expected {expiry} to be rejected"
            );
        }
    }

    #[test]
    fn rejects_an_expired_card() {
        // "Now" is after January 2020, so 01/20 is expired.
        let err =
            validate_instrument_at("1234567890123456", "01/20", "123", at(2026, 8)).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn card_is_valid_through_its_expiry_month() {
        validate_instrument_at("1234567890123456", "08/26", "123", at(2026, 8)).unwrap();
        assert!(validate_instrument_at("1234567890123456", "07/26", "123", at(2026, 8)).is_err());
    }

    #[test]
    fn rejects_bad_cvv() {
        assert!(validate_instrument_at("1234567890123456", "12/30", "12", at(2026, 8)).is_err());
        assert!(validate_instrument_at("1234567890123456", "12/30", "12345", at(2026, 8)).is_err());
        assert!(validate_instrument_at("1234567890123456", "12/30", "abc", at(2026, 8)).is_err());
    }

    #[test]
    fn masks_all_but_last_four() {
        assert_eq!(
            mask_card("1234567890123456").unwrap(),
            "************3456"
        );
        assert_eq!(mask_card("1234").unwrap(), "1234");
        assert!(mask_card("123").is_err());
    }

    #[test]
    fn masking_is_character_based() {
        // Multi-byte input must not panic or split a codepoint.
        assert_eq!(mask_card("ééééé").unwrap(), "*éééé");
        assert!(mask_card("ééé").is_err());
    }
}
