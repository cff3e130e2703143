/// Decode a UTF-16LE buffer to UTF-8, stripping trailing NUL code units.
///
/// Surrogate pairs are combined; unpaired surrogates decode to U+FFFD. An
/// odd-length buffer cannot be UTF-16 and is passed through as-is (lossily).
pub fn utf16le_to_utf8(data: &[u8]) -> String {
    if data.is_empty() {
        return String::new();
    }

    if data.len() % 2 == 1 {
        return String::from_utf8_lossy(data).into_owned();
    }

    let mut units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    while units.last() == Some(&0) {
        units.pop();
    }

    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encode_utf16le(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn test_round_trips_bmp_strings() {
        for s in ["System", "Microsoft-Windows-Security-Auditing", "привет"] {
            assert_eq!(utf16le_to_utf8(&encode_utf16le(s)), s);
        }
    }

    #[test]
    fn test_strips_trailing_nuls() {
        let mut buf = encode_utf16le("Data");
        buf.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(utf16le_to_utf8(&buf), "Data");
    }

    #[test]
    fn test_interior_nuls_are_kept() {
        let mut buf = encode_utf16le("a");
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&encode_utf16le("b"));
        assert_eq!(utf16le_to_utf8(&buf), "a\0b");
    }

    #[test]
    fn test_surrogate_pairs() {
        assert_eq!(utf16le_to_utf8(&encode_utf16le("💻")), "💻");
    }

    #[test]
    fn test_odd_length_passes_through() {
        assert_eq!(utf16le_to_utf8(b"abc"), "abc");
    }
}
