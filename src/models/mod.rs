pub mod container;
pub mod depot;
pub mod lease;
pub mod search;

pub use container::*;
pub use depot::*;
pub use lease::*;
pub use search::*;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};

/// Money is stored as integer cents in every backend.
pub fn to_cents(amount: Decimal) -> AppResult<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.round().to_i64())
        .ok_or_else(|| AppError::BadRequest(format!("Amount {} is out of range", amount)))
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

pub(crate) fn validate_non_negative(amount: &Decimal) -> Result<(), validator::ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(validator::ValidationError::new("negative_amount"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn cents_conversion_rounds_to_two_places() {
        assert_eq!(to_cents(Decimal::from_str("6000").unwrap()).unwrap(), 600_000);
        assert_eq!(to_cents(Decimal::from_str("12.345").unwrap()).unwrap(), 1_234);
        assert_eq!(from_cents(650_050), Decimal::from_str("6500.50").unwrap());
    }

    #[test]
    fn oversized_amounts_are_errors() {
        assert!(matches!(to_cents(Decimal::MAX), Err(AppError::BadRequest(_))));
        assert!(to_cents(Decimal::from_str("100000000000000000").unwrap()).is_err());
    }

    #[test]
    fn negative_amounts_fail_validation() {
        assert!(validate_non_negative(&Decimal::from_str("-1").unwrap()).is_err());
        assert!(validate_non_negative(&Decimal::ZERO).is_ok());
    }
}
