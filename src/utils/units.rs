use super::constants::NORMALIZED_DECIMALS;
use alloy_primitives::U256;
use alloy_primitives::utils::Unit;

fn exp10(decimals: u8) -> U256 {
    if decimals == 18 { Unit::ETHER.wei() } else { U256::from(10).pow(U256::from(decimals)) }
}

/// Re-express `amount`, held at `decimals` fractional digits, at the internal 18-digit precision.
///
/// Tokens with more than 18 decimals lose their excess digits (truncated).
pub fn normalize_units(amount: U256, decimals: u8) -> U256 {
    match decimals.cmp(&NORMALIZED_DECIMALS) {
        std::cmp::Ordering::Equal => amount,
        std::cmp::Ordering::Less => amount.saturating_mul(exp10(NORMALIZED_DECIMALS - decimals)),
        std::cmp::Ordering::Greater => amount / exp10(decimals - NORMALIZED_DECIMALS),
    }
}

/// Inverse of [`normalize_units`]: convert an 18-digit amount back to the token's own precision.
///
/// Digits below the token's precision are truncated.
pub fn unnormalize_units(amount: U256, decimals: u8) -> U256 {
    match decimals.cmp(&NORMALIZED_DECIMALS) {
        std::cmp::Ordering::Equal => amount,
        std::cmp::Ordering::Less => amount / exp10(NORMALIZED_DECIMALS - decimals),
        std::cmp::Ordering::Greater => amount.saturating_mul(exp10(decimals - NORMALIZED_DECIMALS)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_six_decimals() {
        // 3135739575396 raw USDC-like units -> shifted by 12 digits
        let raw = U256::from(3_135_739_575_396u64);
        let expected = U256::from(3_135_739_575_396u64) * U256::from(10).pow(U256::from(12));
        assert_eq!(normalize_units(raw, 6), expected);
    }

    #[test]
    fn test_normalize_eighteen_is_identity() {
        let raw = U256::from_str_radix("42240884271346600626764", 10).unwrap();
        assert_eq!(normalize_units(raw, 18), raw);
        assert_eq!(unnormalize_units(raw, 18), raw);
    }

    #[test]
    fn test_round_trip_recovers_native_value() {
        for decimals in [0u8, 2, 6, 8, 9, 12, 17, 18] {
            let raw = U256::from(987_654_321_123u64);
            assert_eq!(unnormalize_units(normalize_units(raw, decimals), decimals), raw, "decimals={decimals}");
        }
    }

    #[test]
    fn test_more_than_eighteen_decimals() {
        let raw = U256::from(123_456_789u64);
        assert_eq!(normalize_units(raw, 20), U256::from(1_234_567u64));
        assert_eq!(unnormalize_units(U256::from(1_234_567u64), 20), U256::from(123_456_700u64));
    }
}
