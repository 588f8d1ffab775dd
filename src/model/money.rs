use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// An amount that does not fit the money columns, or arithmetic that overflowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("amount exceeds the supported range of ±999999999999.99")]
pub struct AmountOutOfRange;

/// Largest magnitude of a single money column (`DECIMAL(14,2)`).
pub fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

/// Largest magnitude of a run total (`DECIMAL(16,2)`).
pub fn max_total() -> Decimal {
    Decimal::new(9_999_999_999_999_999, 2)
}

pub fn bounded(amount: Decimal, limit: Decimal) -> Result<Decimal, AmountOutOfRange> {
    if amount.abs() <= limit {
        Ok(amount)
    } else {
        Err(AmountOutOfRange)
    }
}

/// Rounds an amount to cents, midpoint away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Sum of `parts` rounded to cents, refusing anything beyond a money column.
pub fn sum_money(parts: impl IntoIterator<Item = Decimal>) -> Result<Decimal, AmountOutOfRange> {
    let total = parts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .ok_or(AmountOutOfRange)?;
    bounded(round_money(total), max_amount())
}

/// `amount × rate / 100`, rounded to cents.
pub fn percent_of(amount: Decimal, rate: Decimal) -> Result<Decimal, AmountOutOfRange> {
    let raw = amount
        .checked_mul(rate)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or(AmountOutOfRange)?;
    bounded(round_money(raw), max_amount())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_money(d("10.005")), d("10.01"));
        assert_eq!(round_money(d("10.004")), d("10.00"));
        assert_eq!(round_money(d("-10.005")), d("-10.01"));
    }

    #[test]
    fn percent_of_salary() {
        assert_eq!(percent_of(d("12000"), d("10")), Ok(d("1200")));
        assert_eq!(percent_of(d("3333.33"), d("2.5")), Ok(d("83.33")));
    }

    #[test]
    fn column_limits() {
        assert_eq!(max_amount(), d("999999999999.99"));
        assert_eq!(max_total(), d("99999999999999.99"));
        assert!(bounded(d("-999999999999.99"), max_amount()).is_ok());
        assert_eq!(bounded(d("1000000000000"), max_amount()), Err(AmountOutOfRange));
    }

    #[test]
    fn overflow_is_an_error_not_a_panic() {
        assert_eq!(percent_of(Decimal::MAX, d("10")), Err(AmountOutOfRange));
        assert_eq!(sum_money([Decimal::MAX, Decimal::MAX]), Err(AmountOutOfRange));
        assert_eq!(sum_money([max_amount(), d("0.01")]), Err(AmountOutOfRange));
        assert_eq!(sum_money([d("1.005"), d("2")]), Ok(d("3.01")));
    }
}
