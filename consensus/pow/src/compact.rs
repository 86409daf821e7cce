// Copyright (c) 2024 Tessera Foundation

//! Compact target encoding.
//!
//! A compact value packs a 256-bit number into 32 bits: the top byte is a
//! base-256 exponent (the number's length in bytes), the low 23 bits are the
//! most significant bytes of the number and bit 23 is a sign bit. Targets are
//! never negative, so a set sign bit makes the encoding invalid.

use primitive_types::U256;

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Decode compact bits into a target.
///
/// Returns `None` for negative encodings and for values that do not fit in
/// 256 bits.
pub fn compact_to_target(bits: u32) -> Option<U256> {
    let exponent = bits >> 24;
    let mantissa = bits & MANTISSA_MASK;

    if mantissa == 0 {
        return Some(U256::zero());
    }
    if bits & SIGN_BIT != 0 {
        return None;
    }

    if exponent <= 3 {
        return Some(U256::from(mantissa >> (8 * (3 - exponent))));
    }

    let overflows = exponent > 34
        || (mantissa > 0xff && exponent > 33)
        || (mantissa > 0xffff && exponent > 32);
    if overflows {
        return None;
    }
    Some(U256::from(mantissa) << (8 * (exponent - 3) as usize))
}

/// Encode a target into compact bits, truncating to 23 bits of precision.
pub fn target_to_compact(target: &U256) -> u32 {
    if target.is_zero() {
        return 0;
    }

    let mut exponent = ((target.bits() + 7) / 8) as u32;
    let mut mantissa = if exponent <= 3 {
        target.low_u32() << (8 * (3 - exponent))
    } else {
        (*target >> (8 * (exponent - 3) as usize)).low_u32()
    };

    // Keep the sign bit clear by moving one byte into the exponent.
    if mantissa & SIGN_BIT != 0 {
        mantissa >>= 8;
        exponent += 1;
    }

    (exponent << 24) | mantissa
}

/// The expected number of hashes needed to meet the target of `bits`.
///
/// Computed as `2^256 / (target + 1)`, which is rewritten as
/// `(!target / (target + 1)) + 1` to stay within 256 bits. Invalid or zero
/// targets carry no work.
pub fn calc_work(bits: u32) -> U256 {
    match compact_to_target(bits) {
        Some(target) if !target.is_zero() && target != U256::MAX => {
            (!target / (target + U256::one())) + U256::one()
        }
        _ => U256::zero(),
    }
}

/// The numeric value of a 32-byte hash, read little-endian.
pub fn hash_to_value(hash: &[u8; 32]) -> U256 {
    U256::from_little_endian(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_compact_values() {
        assert_eq!(
            compact_to_target(0x1d00_ffff),
            Some(U256::from(0xffffu64) << 208)
        );
        assert_eq!(compact_to_target(0x0300_1234), Some(U256::from(0x1234u64)));
        assert_eq!(compact_to_target(0x0112_3456), Some(U256::from(0x12u64)));
        assert_eq!(compact_to_target(0x0500_0000), Some(U256::zero()));
    }

    #[test]
    fn test_negative_and_overflowing_bits_are_invalid() {
        assert_eq!(compact_to_target(0x0492_3456), None);
        assert_eq!(compact_to_target(0xff12_3456), None);
        assert_eq!(compact_to_target(0x2300_0100), None);
    }

    #[test]
    fn test_target_to_compact_normalizes_sign_bit() {
        assert_eq!(target_to_compact(&U256::from(0x80u64)), 0x0200_8000);
        assert_eq!(target_to_compact(&(U256::from(0xffffu64) << 208)), 0x1d00_ffff);
        assert_eq!(target_to_compact(&U256::zero()), 0);
    }

    #[test]
    fn test_regtest_limit_roundtrips() {
        let target = compact_to_target(0x207f_ffff).unwrap();
        assert_eq!(target_to_compact(&target), 0x207f_ffff);
    }

    #[test]
    fn test_work_grows_as_target_shrinks() {
        let easy = calc_work(0x207f_ffff);
        let hard = calc_work(0x1d00_ffff);
        assert_eq!(easy, U256::from(2u64));
        assert!(hard > easy);
        assert_eq!(calc_work(0), U256::zero());
        assert_eq!(calc_work(0x0492_3456), U256::zero());
    }

    #[test]
    fn test_hash_value_is_little_endian() {
        let mut hash = [0u8; 32];
        hash[0] = 1;
        assert_eq!(hash_to_value(&hash), U256::one());
        hash[0] = 0;
        hash[31] = 0x80;
        assert_eq!(hash_to_value(&hash), U256::one() << 255);
    }

    proptest::proptest! {
        #[test]
        fn prop_compact_encoding_is_stable(target in proptest::prelude::any::<u128>()) {
            let target = U256::from(target);
            let bits = target_to_compact(&target);
            let decoded = compact_to_target(bits).unwrap();
            proptest::prop_assert!(decoded <= target);
            proptest::prop_assert_eq!(target_to_compact(&decoded), bits);
        }
    }
}
