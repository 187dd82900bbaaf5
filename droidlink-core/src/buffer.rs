//! Big-endian primitives shared by every wire format in the crate.
//!
//! Writers append to any [`BufMut`]. Readers take a slice and an offset
//! and return `None` when the slice is too short, so callers that have
//! already checked the length can rely on `Some`.

use bytes::BufMut;

// ── Readers ──────────────────────────────────────────────────────

/// Read a big-endian `u16` at `start`.
pub fn read16be(buf: &[u8], start: usize) -> Option<u16> {
    let bytes = buf.get(start..start.checked_add(2)?)?;
    Some(u16::from_be_bytes(bytes.try_into().ok()?))
}

/// Read a big-endian `u32` at `start`.
pub fn read32be(buf: &[u8], start: usize) -> Option<u32> {
    let bytes = buf.get(start..start.checked_add(4)?)?;
    Some(u32::from_be_bytes(bytes.try_into().ok()?))
}

/// Read a big-endian `u64` at `start`.
pub fn read64be(buf: &[u8], start: usize) -> Option<u64> {
    let bytes = buf.get(start..start.checked_add(8)?)?;
    Some(u64::from_be_bytes(bytes.try_into().ok()?))
}

// ── Writers ──────────────────────────────────────────────────────

pub fn write16be(buf: &mut impl BufMut, value: u16) {
    buf.put_u16(value);
}

pub fn write32be(buf: &mut impl BufMut, value: u32) {
    buf.put_u32(value);
}

pub fn write64be(buf: &mut impl BufMut, value: u64) {
    buf.put_u64(value);
}

// ── Strings ──────────────────────────────────────────────────────

/// Largest length `<= max_len` that does not split a UTF-8 sequence.
///
/// Scans backward from `max_len` while the byte there is a continuation
/// byte (`10xxxxxx`).
pub fn utf8_truncation_index(utf8: &[u8], max_len: usize) -> usize {
    if utf8.len() <= max_len {
        return utf8.len();
    }
    let mut len = max_len;
    while len > 0 && (utf8[len] & 0x80) != 0 && (utf8[len] & 0xC0) != 0xC0 {
        len -= 1;
    }
    len
}

/// Write a 32-bit length prefix followed by at most `max_len` bytes of
/// `utf8`, truncated on a character boundary.
///
/// Returns the number of text bytes written.
pub fn write_string(buf: &mut impl BufMut, utf8: &[u8], max_len: usize) -> usize {
    let len = utf8_truncation_index(utf8, max_len);
    // max_len never exceeds the 256 KiB message limit
    buf.put_u32(len as u32);
    buf.put_slice(&utf8[..len]);
    len
}

// ── Fixed point ──────────────────────────────────────────────────

/// Encode a value in `[0.0, 1.0]` as an unsigned 16-bit fraction.
///
/// Out-of-range input is clamped; `1.0` saturates to `0xFFFF`.
pub fn to_fixed_point_16(f: f32) -> u16 {
    let f = if f.is_nan() { 0.0 } else { f.clamp(0.0, 1.0) };
    let u = (f as f64 * 65536.0).round() as u32;
    u.min(0xFFFF) as u16
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_integers_big_endian() {
        let mut buf = Vec::new();
        write16be(&mut buf, 0x0102);
        write32be(&mut buf, 0x03040506);
        write64be(&mut buf, 0x0708090A0B0C0D0E);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14]);
    }

    #[test]
    fn read_at_offset() {
        let buf = [0xFF, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(read16be(&buf, 1), Some(0x0000));
        assert_eq!(read32be(&buf, 1), Some(0x00000102));
        assert_eq!(read64be(&buf, 3), Some(0x0102030405060708));
    }

    #[test]
    fn read_past_end_is_none() {
        let buf = [0u8; 7];
        assert_eq!(read64be(&buf, 0), None);
        assert_eq!(read32be(&buf, 4), None);
        assert_eq!(read16be(&buf, usize::MAX), None);
    }

    #[test]
    fn truncation_keeps_short_strings() {
        assert_eq!(utf8_truncation_index(b"abc", 3), 3);
        assert_eq!(utf8_truncation_index(b"abc", 10), 3);
    }

    #[test]
    fn truncation_never_splits_two_byte_codepoint() {
        // "aé" = 61 C3 A9
        let s = "aé".as_bytes();
        assert_eq!(utf8_truncation_index(s, 2), 1);
        assert_eq!(utf8_truncation_index(s, 1), 1);
    }

    #[test]
    fn truncation_always_yields_valid_utf8() {
        let s = "héllo wörld — ünïcödé ✓ 𝄞 end";
        let bytes = s.as_bytes();
        for n in 0..=bytes.len() {
            let idx = utf8_truncation_index(bytes, n);
            assert!(idx <= n);
            assert!(std::str::from_utf8(&bytes[..idx]).is_ok(), "split at {n}");
        }
    }

    #[test]
    fn write_string_prefixes_length() {
        let mut buf = Vec::new();
        let n = write_string(&mut buf, b"hello", 3);
        assert_eq!(n, 3);
        assert_eq!(buf, b"\x00\x00\x00\x03hel");
    }

    #[test]
    fn fixed_point_bounds() {
        assert_eq!(to_fixed_point_16(0.0), 0);
        assert_eq!(to_fixed_point_16(1.0), 0xFFFF);
        assert_eq!(to_fixed_point_16(0.5), 0x8000);
        assert_eq!(to_fixed_point_16(2.0), 0xFFFF);
        assert_eq!(to_fixed_point_16(-1.0), 0);
        assert_eq!(to_fixed_point_16(f32::NAN), 0);
    }
}
