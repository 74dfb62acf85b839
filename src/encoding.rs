//! Pure, colocated encode/decode helpers for the prime-specialized field
//! encoding described by the sequence file format. Kept free of I/O.

/// Encodes an absolute ("full") value for storage. Exploits that no even
/// value other than 2 appears in the sequences this format targets.
#[must_use]
pub fn encode_full(v: u64) -> u64 {
    if v == 1 {
        1
    } else {
        (v - 1) / 2
    }
}

/// Inverse of [`encode_full`].
#[must_use]
pub fn decode_full(s: u64) -> u64 {
    if s == 0 {
        2
    } else {
        2 * s + 1
    }
}

/// Encodes a gap between consecutive ascending values. Exploits that every
/// prime gap above 2->3 is even.
#[must_use]
pub fn encode_offset(g: u64) -> u64 {
    match g {
        1 => 0,
        2 => 1,
        _ => g / 2,
    }
}

/// Inverse of [`encode_offset`].
#[must_use]
pub fn decode_offset(s: u64) -> u64 {
    match s {
        0 => 1,
        1 => 2,
        _ => 2 * s,
    }
}

/// Minimum bit width needed to hold `value` in an unsigned field (at least 1).
#[must_use]
pub fn bits_needed(value: u64) -> u8 {
    if value == 0 {
        1
    } else {
        64 - value.leading_zeros() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_round_trips_for_odd_values_and_two() {
        assert_eq!(decode_full(encode_full(2)), 2);
        for v in [3u64, 5, 7, 11, 13, 997, 1_000_003] {
            assert_eq!(decode_full(encode_full(v)), v);
        }
    }

    #[test]
    fn offset_round_trips_for_every_even_gap_and_one() {
        assert_eq!(decode_offset(encode_offset(1)), 1);
        for g in [2u64, 4, 6, 8, 10, 100, 9_999_998] {
            assert_eq!(decode_offset(encode_offset(g)), g);
        }
    }

    #[test]
    fn bits_needed_matches_log2_plus_one() {
        assert_eq!(bits_needed(0), 1);
        assert_eq!(bits_needed(1), 1);
        assert_eq!(bits_needed(2), 2);
        assert_eq!(bits_needed(3), 2);
        assert_eq!(bits_needed(4), 3);
        assert_eq!(bits_needed(u64::MAX), 64);
    }
}
