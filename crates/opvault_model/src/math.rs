//! Fixed-point math utilities
//!
//! Margin math runs on an 8-decimal base. Option amounts and strikes carry 18
//! decimals, oracle prices 8, collateral tokens whatever their asset declares.
//! Every conversion names its rounding direction: requirements round up,
//! payouts round down.

/// Oracle price precision (8 decimals)
pub const PRICE_DECIMALS: u32 = 8;
/// Strike price precision (18 decimals)
pub const STRIKE_DECIMALS: u32 = 18;
/// Option token precision (18 decimals)
pub const OTOKEN_DECIMALS: u32 = 18;
/// Internal fixed-point precision
pub const BASE_DECIMALS: u32 = 8;
pub const BASE: u128 = 100_000_000;

/// Basis point denominator
pub const BPS: u128 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

/// 10^exp, or None past u128 range
#[inline]
pub fn pow10(exp: u32) -> Option<u128> {
    10u128.checked_pow(exp)
}

/// a * b / d rounding down
#[inline]
pub fn mul_div_floor(a: u128, b: u128, d: u128) -> Option<u128> {
    if d == 0 {
        return None;
    }
    a.checked_mul(b).map(|p| p / d)
}

/// a * b / d rounding up
#[inline]
pub fn mul_div_ceil(a: u128, b: u128, d: u128) -> Option<u128> {
    if d == 0 {
        return None;
    }
    let p = a.checked_mul(b)?;
    Some(p / d + u128::from(p % d != 0))
}

#[inline]
pub fn mul_div(a: u128, b: u128, d: u128, rounding: Rounding) -> Option<u128> {
    match rounding {
        Rounding::Down => mul_div_floor(a, b, d),
        Rounding::Up => mul_div_ceil(a, b, d),
    }
}

/// Re-express `value` from `from` decimals to `to` decimals
pub fn rescale(value: u128, from: u32, to: u32, rounding: Rounding) -> Option<u128> {
    if from == to {
        return Some(value);
    }
    if to > from {
        value.checked_mul(pow10(to - from)?)
    } else {
        let div = pow10(from - to)?;
        match rounding {
            Rounding::Down => Some(value / div),
            Rounding::Up => Some(value / div + u128::from(value % div != 0)),
        }
    }
}

/// Fixed-point product of two base-scaled values
#[inline]
pub fn base_mul(a: u128, b: u128, rounding: Rounding) -> Option<u128> {
    mul_div(a, b, BASE, rounding)
}

/// Fixed-point quotient of two base-scaled values
#[inline]
pub fn base_div(a: u128, b: u128, rounding: Rounding) -> Option<u128> {
    mul_div(a, BASE, b, rounding)
}

/// value * bps / 10_000
#[inline]
pub fn apply_bps(value: u128, bps: u64, rounding: Rounding) -> Option<u128> {
    mul_div(value, bps as u128, BPS, rounding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_rounding_modes() {
        assert_eq!(mul_div_floor(10, 3, 4), Some(7));
        assert_eq!(mul_div_ceil(10, 3, 4), Some(8));
        // Exact division never rounds up
        assert_eq!(mul_div_ceil(10, 4, 4), Some(10));
        assert_eq!(mul_div_floor(1, 1, 0), None);
    }

    #[test]
    fn test_rescale_between_decimals() {
        // 200 strike (18 decimals) into base (8 decimals)
        let strike = 200 * pow10(18).unwrap();
        assert_eq!(rescale(strike, 18, 8, Rounding::Down), Some(200 * BASE));
        // 20 base units into USDC (6 decimals)
        assert_eq!(rescale(20 * BASE, 8, 6, Rounding::Up), Some(20_000_000));
        // Sub-unit remainder rounds up only when asked
        assert_eq!(rescale(101, 2, 0, Rounding::Down), Some(1));
        assert_eq!(rescale(101, 2, 0, Rounding::Up), Some(2));
    }

    #[test]
    fn test_base_arithmetic() {
        let half = BASE / 2;
        assert_eq!(base_mul(200 * BASE, half, Rounding::Down), Some(100 * BASE));
        assert_eq!(base_div(BASE, 3 * BASE, Rounding::Down), Some(33_333_333));
        assert_eq!(base_div(BASE, 3 * BASE, Rounding::Up), Some(33_333_334));
    }

    #[test]
    fn test_bps() {
        assert_eq!(apply_bps(1_000, 2_500, Rounding::Down), Some(250));
        assert_eq!(apply_bps(1, 1, Rounding::Up), Some(1));
    }

    #[test]
    fn test_overflow_is_reported() {
        assert_eq!(mul_div_floor(u128::MAX, 2, 1), None);
        assert_eq!(rescale(u128::MAX, 0, 18, Rounding::Down), None);
        assert_eq!(pow10(40), None);
    }
}
