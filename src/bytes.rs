//! Byte-slice helpers for the line-oriented readers

use bstr::ByteSlice;
use memchr::memchr;

// Divide a bytestring into two at delim
#[inline]
pub fn bs_split_once(bytes: &[u8], delim: u8) -> Option<(&[u8], &[u8])> {
    let pos = memchr(delim, bytes)?;
    Some((&bytes[..pos], &bytes[pos + 1..]))
}

/// Split a tab-separated line into exactly `N` fields
///
/// Returns None when the field count differs.
#[inline]
pub fn bs_fields<const N: usize>(line: &[u8]) -> Option<[&[u8]; N]> {
    let empty: &[u8] = &[];
    let mut out = [empty; N];
    let mut rest = line;
    for (i, slot) in out.iter_mut().enumerate() {
        if i + 1 == N {
            if memchr(b'\t', rest).is_some() {
                return None;
            }
            *slot = rest;
        } else {
            let (field, tail) = bs_split_once(rest, b'\t')?;
            *slot = field;
            rest = tail;
        }
    }
    Some(out)
}

/// Parse an unsigned decimal; rejects empty input, signs and trailing bytes
#[inline]
pub fn bs_atoi(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    atoi::atoi::<usize>(bytes)
}

/// Strip a trailing `\n` or `\r\n`
#[inline]
pub fn bs_trim_newline(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n")
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
        .unwrap_or(line)
}

/// Lossless view as &str, or None when the bytes are not UTF-8
#[inline]
pub fn bs_str(bytes: &[u8]) -> Option<&str> {
    bytes.to_str().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_once() {
        assert_eq!(
            bs_split_once(b"key=value", b'='),
            Some((b"key" as &[u8], b"value" as &[u8]))
        );
        assert_eq!(bs_split_once(b"nodelimiter", b'='), None);
        assert_eq!(
            bs_split_once(b"a:b:c", b':'),
            Some((b"a" as &[u8], b"b:c" as &[u8]))
        );
        assert_eq!(
            bs_split_once(b"key=", b'='),
            Some((b"key" as &[u8], b"" as &[u8]))
        );
    }

    #[test]
    fn test_fields() {
        let fields = bs_fields::<3>(b"a\tbb\t").unwrap();
        assert_eq!(fields, [&b"a"[..], &b"bb"[..], &b""[..]]);
        assert!(bs_fields::<3>(b"a\tb").is_none());
        assert!(bs_fields::<2>(b"a\tb\tc").is_none());
    }

    #[test]
    fn test_atoi() {
        assert_eq!(bs_atoi(b"0"), Some(0));
        assert_eq!(bs_atoi(b"42"), Some(42));
        assert_eq!(bs_atoi(b"007"), Some(7));
        assert_eq!(bs_atoi(b""), None);
        assert_eq!(bs_atoi(b"12a"), None);
        assert_eq!(bs_atoi(b"-4"), None);
        assert_eq!(bs_atoi(b"1.2"), None);
        assert_eq!(bs_atoi(b"99999999999999999999999"), None);
    }

    #[test]
    fn test_trim_newline() {
        assert_eq!(bs_trim_newline(b"abc\n"), b"abc");
        assert_eq!(bs_trim_newline(b"abc\r\n"), b"abc");
        assert_eq!(bs_trim_newline(b"abc"), b"abc");
    }
}
