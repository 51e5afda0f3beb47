//! Piecewise-linear liquidity curves.
//!
//! A curve maps a source amount to a destination amount. Between points the
//! value is linearly interpolated; outside the defined range it saturates
//! at the boundary output, modeling a liquidity cap.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CurveError {
    #[error("curve must have at least one point")]
    Empty,
    #[error("curve input amounts must be strictly increasing")]
    NonIncreasingInput,
    #[error("curve output amounts must be non-decreasing")]
    DecreasingOutput,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LiquidityCurve {
    points: Vec<(u64, u64)>,
}

impl LiquidityCurve {
    pub fn new(points: Vec<(u64, u64)>) -> Result<Self, CurveError> {
        if points.is_empty() {
            return Err(CurveError::Empty);
        }
        for pair in points.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(CurveError::NonIncreasingInput);
            }
            if pair[1].1 < pair[0].1 {
                return Err(CurveError::DecreasingOutput);
            }
        }
        Ok(LiquidityCurve { points })
    }

    pub fn points(&self) -> &[(u64, u64)] {
        &self.points
    }

    /// Evaluate the curve at `x`, interpolating linearly between the
    /// bracketing points and rounding down to whole amount units.
    pub fn amount_at(&self, x: u64) -> u64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if x <= first.0 {
            return first.1;
        }
        for pair in self.points.windows(2) {
            let (xa, ya) = pair[0];
            let (xb, yb) = pair[1];
            if x <= xb {
                if x == xb {
                    return yb;
                }
                let span = u128::from(yb - ya) * u128::from(x - xa) / u128::from(xb - xa);
                return ya + span as u64;
            }
        }
        last.1
    }

    /// Inverse evaluation: the smallest `x` whose output covers `y`.
    /// Returns `None` when `y` exceeds the curve's maximum output
    /// (insufficient liquidity).
    pub fn amount_reverse(&self, y: u64) -> Option<u64> {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if y > last.1 {
            return None;
        }
        if y <= first.1 {
            return Some(first.0);
        }
        // The first segment whose upper output reaches y. Its lower output
        // is strictly below y (an earlier segment would have matched), so
        // the segment is not flat.
        for pair in self.points.windows(2) {
            let (xa, ya) = pair[0];
            let (xb, yb) = pair[1];
            if y <= yb {
                // Round up so that forward evaluation at the result covers y.
                let numerator = u128::from(y - ya) * u128::from(xb - xa);
                let denominator = u128::from(yb - ya);
                let span = (numerator + denominator - 1) / denominator;
                return Some(xa + span as u64);
            }
        }
        None
    }

    /// Compose this curve with `other`: the result maps `x` to
    /// `other.amount_at(self.amount_at(x))`. Breakpoints are taken at every
    /// input where either curve bends so no interpolation detail is lost.
    pub fn combine(&self, other: &LiquidityCurve) -> LiquidityCurve {
        let mut xs: Vec<u64> = self.points.iter().map(|p| p.0).collect();
        for &(bx, _) in other.points.iter() {
            if let Some(x) = self.amount_reverse(bx) {
                xs.push(x);
            }
        }
        xs.sort_unstable();
        xs.dedup();
        let points = xs
            .into_iter()
            .map(|x| (x, other.amount_at(self.amount_at(x))))
            .collect();
        LiquidityCurve { points }
    }
}
