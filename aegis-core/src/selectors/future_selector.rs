//! Future selector (C5): the 7-day rollover rule.

use chrono::NaiveDate;

use crate::core::VtSymbol;

/// One candidate future for a product: its symbol and parsed expiry date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FutureCandidate {
    pub vt_symbol: VtSymbol,
    pub expiry: NaiveDate,
}

/// Parses a futures symbol's expiry from its trailing digits: 4 digits (`YYMM`, most exchanges)
/// or 3 digits (CZCE's single-digit-year convention, `YMM`). Returns `None` on parse failure so
/// callers can fall back to "front contract" per SPEC_FULL §4.4.
pub fn parse_expiry_yymm(vt_symbol: &VtSymbol, reference_year: i32) -> Option<NaiveDate> {
    let product_part = vt_symbol.as_str().split('.').next().unwrap_or(vt_symbol.as_str());
    let digits: String = product_part.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    let digits: String = digits.chars().rev().collect();

    let (year, month) = if digits.len() == 4 {
        let year = 2000 + digits[0..2].parse::<i32>().ok()?;
        let month = digits[2..4].parse::<u32>().ok()?;
        (year, month)
    } else if digits.len() == 3 {
        let decade = reference_year / 10 * 10;
        let year_digit = digits[0..1].parse::<i32>().ok()?;
        let month = digits[1..3].parse::<u32>().ok()?;
        (decade + year_digit, month)
    } else {
        return None;
    };

    // Approximate contract expiry as the 15th of the delivery month — exact exchange delivery
    // calendars are outside this component's scope (they belong to the gateway's contract data).
    NaiveDate::from_ymd_opt(year, month, 15)
}

/// Picks the dominant (actively-traded) future for a product, given its candidates sorted by
/// expiry ascending and `today`. If `expiry_of_front - today > 7 days`, the front contract is
/// still dominant; otherwise roll to the next one. Requires at least one candidate.
pub fn select_dominant_future<'a>(candidates: &'a [FutureCandidate], today: NaiveDate) -> Option<&'a FutureCandidate> {
    let front = candidates.first()?;
    let days_to_expiry = (front.expiry - today).num_days();
    if days_to_expiry > 7 {
        Some(front)
    } else {
        candidates.get(1).or(Some(front))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(symbol: &str, expiry: (i32, u32, u32)) -> FutureCandidate {
        FutureCandidate {
            vt_symbol: VtSymbol::new(symbol),
            expiry: NaiveDate::from_ymd_opt(expiry.0, expiry.1, expiry.2).unwrap(),
        }
    }

    #[test]
    fn parses_4_digit_and_3_digit_expiries() {
        let expiry = parse_expiry_yymm(&VtSymbol::new("rb2505.SHFE"), 2025).unwrap();
        assert_eq!(expiry, NaiveDate::from_ymd_opt(2025, 5, 15).unwrap());

        let czce_expiry = parse_expiry_yymm(&VtSymbol::new("CF505.CZCE"), 2025).unwrap();
        assert_eq!(czce_expiry, NaiveDate::from_ymd_opt(2025, 5, 15).unwrap());
    }

    #[test]
    fn unparseable_symbol_returns_none() {
        assert!(parse_expiry_yymm(&VtSymbol::new("IDX.SSE"), 2025).is_none());
    }

    #[test]
    fn scenario_s3_7_day_rollover() {
        let candidates = vec![
            candidate("rb2501.SHFE", (2025, 1, 15)),
            candidate("rb2505.SHFE", (2025, 5, 15)),
        ];

        let today_close = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let dominant = select_dominant_future(&candidates, today_close).unwrap();
        assert_eq!(dominant.vt_symbol, VtSymbol::new("rb2505.SHFE"));

        let today_far = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        let dominant_far = select_dominant_future(&candidates, today_far).unwrap();
        assert_eq!(dominant_far.vt_symbol, VtSymbol::new("rb2501.SHFE"));
    }

    #[test]
    fn single_candidate_near_expiry_stays_front() {
        let candidates = vec![candidate("rb2501.SHFE", (2025, 1, 15))];
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let dominant = select_dominant_future(&candidates, today).unwrap();
        assert_eq!(dominant.vt_symbol, VtSymbol::new("rb2501.SHFE"));
    }
}
