//! Level curve
//!
//! `xp_required(L) = floor(base * L^exponent)` is the cumulative XP needed to
//! reach level `L`. Level 1 is the floor: a fresh user is level 1 even though
//! `xp_required(1)` is above zero.

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelCurve {
    base: f64,
    exponent: f64,
}

impl LevelCurve {
    pub fn new(base: f64, exponent: f64) -> EngineResult<Self> {
        if !(base.is_finite() && base >= 1.0) {
            return Err(EngineError::Validation(format!(
                "Level base must be >= 1, got {}",
                base
            )));
        }
        // base >= 1 and exponent >= 1 keep floor(base * L^e) strictly increasing
        if !(exponent.is_finite() && exponent >= 1.0) {
            return Err(EngineError::Validation(format!(
                "Level exponent must be >= 1, got {}",
                exponent
            )));
        }
        Ok(Self { base, exponent })
    }

    pub fn xp_required(&self, level: u32) -> u64 {
        (self.base * (level as f64).powf(self.exponent)).floor() as u64
    }

    /// Largest L with xp_required(L) <= total_xp, floored at 1
    pub fn level_for_xp(&self, total_xp: u64) -> u32 {
        // xp_required is non-decreasing, so binary search over the whole range
        let (mut lo, mut hi) = (1u32, u32::MAX);
        while lo < hi {
            let mid = lo + (hi - lo) / 2 + 1;
            if self.xp_required(mid) <= total_xp {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        lo
    }
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self {
            base: 100.0,
            exponent: 1.5,
        }
    }
}
