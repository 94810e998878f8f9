//! Implied-volatility surface (C2): a (strike x time-to-expiry) grid built from discrete quotes,
//! queried by bilinear interpolation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum VolSurfaceError {
    #[error("need at least 2 distinct strikes and 2 distinct expiries with iv > 0, got {strikes} strikes and {expiries} expiries")]
    InsufficientGrid { strikes: usize, expiries: usize },
    #[error("strike {0} is outside the grid")]
    StrikeOutOfRange(Decimal),
    #[error("time-to-expiry {0} is outside the grid")]
    ExpiryOutOfRange(Decimal),
}

/// A single `{strike, time_to_expiry, iv}` observation fed into [`VolSurface::build`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolQuote {
    pub strike: Decimal,
    pub time_to_expiry: Decimal,
    pub iv: Decimal,
}

/// Rectangular (strike x expiry) implied-vol grid. `matrix[i][j]` is the iv at
/// `(strikes[i], expiries[j])`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolSurface {
    strikes: Vec<Decimal>,
    expiries: Vec<Decimal>,
    matrix: Vec<Vec<Decimal>>,
}

impl VolSurface {
    /// Builds a snapshot from raw quotes. Quotes with `iv <= 0` are dropped. Requires at least 2
    /// distinct strikes and 2 distinct expiries to remain afterward, and a complete rectangular
    /// grid (every strike quoted at every expiry) — partial rows/columns are rejected rather than
    /// silently filled, since an incomplete grid would otherwise interpolate through holes.
    pub fn build(quotes: &[VolQuote]) -> Result<Self, VolSurfaceError> {
        let positive: Vec<&VolQuote> = quotes.iter().filter(|q| q.iv > Decimal::ZERO).collect();

        let mut strikes: Vec<Decimal> = positive.iter().map(|q| q.strike).collect();
        strikes.sort();
        strikes.dedup();

        let mut expiries: Vec<Decimal> = positive.iter().map(|q| q.time_to_expiry).collect();
        expiries.sort();
        expiries.dedup();

        if strikes.len() < 2 || expiries.len() < 2 {
            return Err(VolSurfaceError::InsufficientGrid {
                strikes: strikes.len(),
                expiries: expiries.len(),
            });
        }

        let mut matrix = vec![vec![None; expiries.len()]; strikes.len()];
        for q in &positive {
            let i = strikes.iter().position(|&s| s == q.strike).unwrap();
            let j = expiries.iter().position(|&t| t == q.time_to_expiry).unwrap();
            matrix[i][j] = Some(q.iv);
        }

        let complete: Vec<Vec<Decimal>> = matrix
            .into_iter()
            .map(|row| row.into_iter().collect::<Option<Vec<Decimal>>>())
            .collect::<Option<Vec<Vec<Decimal>>>>()
            .ok_or(VolSurfaceError::InsufficientGrid {
                strikes: strikes.len(),
                expiries: expiries.len(),
            })?;

        Ok(Self { strikes, expiries, matrix: complete })
    }

    pub fn strikes(&self) -> &[Decimal] {
        &self.strikes
    }

    pub fn expiries(&self) -> &[Decimal] {
        &self.expiries
    }

    /// Bilinear interpolation inside the grid. Returns an error for any query outside the
    /// strike or expiry range rather than extrapolating.
    pub fn query(&self, strike: Decimal, time_to_expiry: Decimal) -> Result<Decimal, VolSurfaceError> {
        let (i_lo, i_hi, w_i) = bracket(&self.strikes, strike).ok_or(VolSurfaceError::StrikeOutOfRange(strike))?;
        let (j_lo, j_hi, w_j) =
            bracket(&self.expiries, time_to_expiry).ok_or(VolSurfaceError::ExpiryOutOfRange(time_to_expiry))?;

        let v00 = self.matrix[i_lo][j_lo];
        let v01 = self.matrix[i_lo][j_hi];
        let v10 = self.matrix[i_hi][j_lo];
        let v11 = self.matrix[i_hi][j_hi];

        let top = lerp(v00, v10, w_i);
        let bottom = lerp(v01, v11, w_i);
        Ok(lerp(top, bottom, w_j))
    }

    /// Smile: iv as a function of strike at a fixed time-to-expiry, interpolating across the
    /// expiry axis for each strike column when `time_to_expiry` falls between grid lines.
    pub fn extract_smile(&self, time_to_expiry: Decimal) -> Result<Vec<(Decimal, Decimal)>, VolSurfaceError> {
        let (j_lo, j_hi, w_j) =
            bracket(&self.expiries, time_to_expiry).ok_or(VolSurfaceError::ExpiryOutOfRange(time_to_expiry))?;

        Ok(self
            .strikes
            .iter()
            .enumerate()
            .map(|(i, &strike)| {
                let iv = lerp(self.matrix[i][j_lo], self.matrix[i][j_hi], w_j);
                (strike, iv)
            })
            .collect())
    }

    /// Term structure: iv as a function of time-to-expiry at a fixed strike, interpolating
    /// across the strike axis for each expiry row.
    pub fn extract_term_structure(&self, strike: Decimal) -> Result<Vec<(Decimal, Decimal)>, VolSurfaceError> {
        let (i_lo, i_hi, w_i) = bracket(&self.strikes, strike).ok_or(VolSurfaceError::StrikeOutOfRange(strike))?;

        Ok(self
            .expiries
            .iter()
            .enumerate()
            .map(|(j, &time)| {
                let iv = lerp(self.matrix[i_lo][j], self.matrix[i_hi][j], w_i);
                (time, iv)
            })
            .collect())
    }

    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_dict(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

/// Finds the grid indices bracketing `target` in a sorted, deduplicated axis, plus the fractional
/// position between them in `[0, 1]`. Returns `None` when `target` is outside `[axis[0], axis[last]]`.
fn bracket(axis: &[Decimal], target: Decimal) -> Option<(usize, usize, Decimal)> {
    if target < axis[0] || target > axis[axis.len() - 1] {
        return None;
    }
    if axis.len() == 1 {
        return Some((0, 0, Decimal::ZERO));
    }
    for w in 0..axis.len() - 1 {
        let (lo, hi) = (axis[w], axis[w + 1]);
        if target >= lo && target <= hi {
            let weight = if hi == lo { Decimal::ZERO } else { (target - lo) / (hi - lo) };
            return Some((w, w + 1, weight));
        }
    }
    None
}

fn lerp(a: Decimal, b: Decimal, weight: Decimal) -> Decimal {
    a + (b - a) * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_surface() -> VolSurface {
        let quotes = [
            VolQuote { strike: dec!(95), time_to_expiry: dec!(0.1), iv: dec!(0.20) },
            VolQuote { strike: dec!(95), time_to_expiry: dec!(0.5), iv: dec!(0.22) },
            VolQuote { strike: dec!(100), time_to_expiry: dec!(0.1), iv: dec!(0.18) },
            VolQuote { strike: dec!(100), time_to_expiry: dec!(0.5), iv: dec!(0.19) },
            VolQuote { strike: dec!(105), time_to_expiry: dec!(0.1), iv: dec!(0.21) },
            VolQuote { strike: dec!(105), time_to_expiry: dec!(0.5), iv: dec!(0.23) },
        ];
        VolSurface::build(&quotes).unwrap()
    }

    #[test]
    fn build_rejects_sparse_input() {
        let quotes = [VolQuote { strike: dec!(100), time_to_expiry: dec!(0.1), iv: dec!(0.2) }];
        let err = VolSurface::build(&quotes).unwrap_err();
        assert!(matches!(err, VolSurfaceError::InsufficientGrid { .. }));
    }

    #[test]
    fn build_drops_non_positive_iv_quotes() {
        let mut quotes = vec![
            VolQuote { strike: dec!(100), time_to_expiry: dec!(0.1), iv: dec!(0.2) },
            VolQuote { strike: dec!(100), time_to_expiry: dec!(0.5), iv: dec!(0.2) },
        ];
        quotes.push(VolQuote { strike: dec!(110), time_to_expiry: dec!(0.1), iv: Decimal::ZERO });
        let err = VolSurface::build(&quotes).unwrap_err();
        assert!(matches!(err, VolSurfaceError::InsufficientGrid { .. }));
    }

    #[test]
    fn query_at_grid_point_returns_exact_iv() {
        let surface = sample_surface();
        let iv = surface.query(dec!(100), dec!(0.1)).unwrap();
        assert_eq!(iv, dec!(0.18));
    }

    #[test]
    fn query_interpolates_between_grid_points() {
        let surface = sample_surface();
        let iv = surface.query(dec!(100), dec!(0.3)).unwrap();
        assert!(iv > dec!(0.18) && iv < dec!(0.19));
    }

    #[test]
    fn query_outside_grid_is_an_error() {
        let surface = sample_surface();
        assert!(surface.query(dec!(200), dec!(0.1)).is_err());
        assert!(surface.query(dec!(100), dec!(5)).is_err());
    }

    #[test]
    fn smile_and_term_structure_preserve_grid_points() {
        let surface = sample_surface();
        let smile = surface.extract_smile(dec!(0.1)).unwrap();
        assert_eq!(smile, vec![(dec!(95), dec!(0.20)), (dec!(100), dec!(0.18)), (dec!(105), dec!(0.21))]);

        let term = surface.extract_term_structure(dec!(100)).unwrap();
        assert_eq!(term, vec![(dec!(0.1), dec!(0.18)), (dec!(0.5), dec!(0.19))]);
    }

    #[test]
    fn to_dict_from_dict_round_trips() {
        let surface = sample_surface();
        let dict = surface.to_dict();
        let restored = VolSurface::from_dict(&dict).unwrap();
        assert_eq!(restored.strikes(), surface.strikes());
        assert_eq!(restored.query(dec!(100), dec!(0.3)).unwrap(), surface.query(dec!(100), dec!(0.3)).unwrap());
    }
}
