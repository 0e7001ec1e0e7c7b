//! Latin-1 (ISO 8859-1) conversion helpers.
//!
//! Protocol A string payloads are opaque bytes; LysKOM traffic is by
//! convention Latin-1. Latin-1 maps code points U+0000..=U+00FF one-to-one
//! onto bytes, so conversion is a range check rather than a table lookup.

use crate::error::FormatError;

/// Encode a string as Latin-1 bytes.
///
/// Fails with [`FormatError::Unencodable`] if any character is above U+00FF.
pub fn encode(s: &str) -> Result<Vec<u8>, FormatError> {
    let mut out = Vec::with_capacity(s.len());
    encode_into(s, &mut out)?;
    Ok(out)
}

/// Encode a string as Latin-1, appending to an existing buffer.
pub fn encode_into(s: &str, out: &mut Vec<u8>) -> Result<(), FormatError> {
    for ch in s.chars() {
        let cp = ch as u32;
        if cp > 0xFF {
            return Err(FormatError::Unencodable);
        }
        out.push(cp as u8);
    }
    Ok(())
}

/// Decode Latin-1 bytes into a string. Infallible: every byte is a code point.
pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_round_trip() {
        let encoded = encode("gazonk").unwrap();
        assert_eq!(encoded, b"gazonk");
        assert_eq!(decode(&encoded), "gazonk");
    }

    #[test]
    fn test_high_latin1() {
        // "hämligt" is 7 characters and must encode to exactly 7 bytes
        let encoded = encode("h\u{e4}mligt").unwrap();
        assert_eq!(encoded, b"h\xe4mligt");
        assert_eq!(encoded.len(), 7);
        assert_eq!(decode(&encoded), "h\u{e4}mligt");
    }

    #[test]
    fn test_unencodable() {
        assert_eq!(encode("sn\u{f6}").unwrap().len(), 3);
        assert_eq!(encode("\u{2603}"), Err(FormatError::Unencodable));
    }
}
