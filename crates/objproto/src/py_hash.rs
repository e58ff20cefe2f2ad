//! CPython-compatible hash helpers.
//!
//! Hashing is deterministic and equivalent to `PYTHONHASHSEED=0`: CPython hashes text
//! with SipHash-1-3 and a zeroed key under that seed. All helpers return the signed
//! Python hash value and never return `-1`, which is reserved as the error sentinel.
//!
//! ## Cross-type hash invariant
//!
//! If `a == b`, then `hash(a) == hash(b)`. Since `0 == False` and `1 == True`, bool
//! shares [`hash_int`] with int.

/// The hash value that signals an error at the sentinel-returning boundary.
pub const HASH_ERROR: i64 = -1;

/// Mersenne prime used by CPython for numeric hashing: `2^61 - 1`.
const MODULUS: i64 = (1 << 61) - 1;

/// Replaces the reserved `-1` with `-2`, as every CPython hash function does.
#[inline]
#[must_use]
pub fn fix_hash(hash: i64) -> i64 {
    if hash == HASH_ERROR { -2 } else { hash }
}

/// Hashes UTF-8 string content with CPython's deterministic seed-0 algorithm.
///
/// The empty string hashes to `0`.
#[must_use]
pub fn hash_str(value: &str) -> i64 {
    let bytes = value.as_bytes();
    if bytes.is_empty() {
        return 0;
    }
    fix_hash(i64::from_ne_bytes(siphash13_with_seed0(bytes).to_ne_bytes()))
}

/// Hashes a signed 64-bit integer using CPython's modular algorithm.
///
/// The algorithm is `n % MODULUS` (sign-preserving), with `-1` remapped to `-2`.
/// This matches CPython's `long_hash` in `Objects/longobject.c`.
#[must_use]
pub fn hash_int(value: i64) -> i64 {
    if value == 0 {
        return 0;
    }
    let sign: i64 = if value < 0 { -1 } else { 1 };
    // i64::MIN has no positive counterpart, so go through i128.
    let abs_val = i128::from(value).unsigned_abs() as u64;
    let remainder = (abs_val % MODULUS as u64) as i64;
    fix_hash(sign * remainder)
}

/// Identity hash for objects whose type defines no hash slot.
///
/// Mirrors `_Py_HashPointer`: the address is rotated right by 4 bits because the
/// low bits of an aligned address are always zero. Here the "address" is the arena
/// slot, scaled to look like one.
#[must_use]
pub fn hash_identity(index: usize) -> i64 {
    let addr = (index as u64).wrapping_add(1).wrapping_mul(16);
    fix_hash(i64::from_ne_bytes(addr.rotate_right(4).to_ne_bytes()))
}

/// Combines element hashes with CPython's xxHash-based tuple algorithm.
#[must_use]
pub fn hash_tuple(lanes: &[i64]) -> i64 {
    const XXPRIME_1: u64 = 11_400_714_785_074_694_791;
    const XXPRIME_2: u64 = 14_029_467_366_897_019_727;
    const XXPRIME_5: u64 = 2_870_177_450_012_600_261;
    const TUPLE_HASH_SUFFIX: u64 = 3_527_539;

    let mut acc = XXPRIME_5;
    for &lane in lanes {
        let lane = u64::from_ne_bytes(lane.to_ne_bytes());
        acc = acc.wrapping_add(lane.wrapping_mul(XXPRIME_2));
        acc = acc.rotate_left(31);
        acc = acc.wrapping_mul(XXPRIME_1);
    }
    acc = acc.wrapping_add((lanes.len() as u64) ^ (XXPRIME_5 ^ TUPLE_HASH_SUFFIX));
    if acc == u64::MAX {
        return 1_546_275_796;
    }
    i64::from_ne_bytes(acc.to_ne_bytes())
}

/// Computes SipHash-1-3 with a zero key, matching CPython seed-0 parameters.
#[must_use]
fn siphash13_with_seed0(bytes: &[u8]) -> u64 {
    const K0: u64 = 0;
    const K1: u64 = 0;

    let mut v0 = K0 ^ 0x736f_6d65_7073_6575;
    let mut v1 = K1 ^ 0x646f_7261_6e64_6f6d;
    let mut v2 = K0 ^ 0x6c79_6765_6e65_7261;
    let mut v3 = K1 ^ 0x7465_6462_7974_6573;

    let mut chunks = bytes.chunks_exact(8);
    for chunk in &mut chunks {
        let mut block = [0_u8; 8];
        block.copy_from_slice(chunk);
        let message = u64::from_le_bytes(block);
        v3 ^= message;
        sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
        v0 ^= message;
    }

    let mut tail = (bytes.len() as u64) << 56;
    for (index, byte) in chunks.remainder().iter().copied().enumerate() {
        tail |= u64::from(byte) << (index * 8);
    }

    v3 ^= tail;
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    v0 ^= tail;
    v2 ^= 0xff;
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);

    v0 ^ v1 ^ v2 ^ v3
}

fn sip_round(v0: &mut u64, v1: &mut u64, v2: &mut u64, v3: &mut u64) {
    *v0 = v0.wrapping_add(*v1);
    *v1 = v1.rotate_left(13);
    *v1 ^= *v0;
    *v0 = v0.rotate_left(32);

    *v2 = v2.wrapping_add(*v3);
    *v3 = v3.rotate_left(16);
    *v3 ^= *v2;

    *v0 = v0.wrapping_add(*v3);
    *v3 = v3.rotate_left(21);
    *v3 ^= *v0;

    *v2 = v2.wrapping_add(*v1);
    *v1 = v1.rotate_left(17);
    *v1 ^= *v2;
    *v2 = v2.rotate_left(32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_hash_matches_cpython() {
        assert_eq!(hash_int(0), 0);
        assert_eq!(hash_int(42), 42);
        assert_eq!(hash_int(-1), -2);
        assert_eq!(hash_int(MODULUS), 0);
        assert_eq!(hash_int(MODULUS + 5), 5);
        assert_eq!(hash_int(i64::MIN), -4);
    }

    #[test]
    fn empty_tuple_hash_matches_cpython() {
        // hash(()) on 64-bit CPython 3.8+
        assert_eq!(hash_tuple(&[]), 5_740_354_900_026_072_187);
    }

    #[test]
    fn hashes_never_return_error_sentinel() {
        assert_ne!(fix_hash(-1), HASH_ERROR);
        assert_eq!(hash_str(""), 0);
        for index in 0..64 {
            assert_ne!(hash_identity(index), HASH_ERROR);
        }
    }
}
