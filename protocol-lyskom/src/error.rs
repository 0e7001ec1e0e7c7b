//! Error types for Protocol A tokenizing, parsing and request formatting.

/// Error type for tokenizing and message parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Need more data to complete parsing.
    /// This is not a fatal error - the caller should buffer more data and retry.
    #[error("incomplete data")]
    Incomplete,

    /// The byte stream violated the protocol grammar.
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// The server preface was not `LysKOM\n`.
    #[error("bad server handshake")]
    BadHandshake,

    /// Invalid or overlong number.
    #[error("invalid number")]
    InvalidNumber,

    /// A Hollerith string exceeded the configured maximum length.
    #[error("string of {len} bytes exceeds limit of {max}")]
    StringTooLong { len: usize, max: usize },

    /// An array header exceeded the configured maximum element count.
    #[error("array of {len} elements exceeds limit of {max}")]
    ArrayTooLong { len: usize, max: usize },
}

impl ParseError {
    /// Returns true if this error indicates more data is needed.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }
}

/// Error type for client-side request validation.
///
/// These are raised while serialising caller-supplied parameters, before any
/// bytes reach the wire. The connection is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// A declared structure field was not supplied.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A supplied field is not declared by the structure or bit-string.
    #[error("unknown field `{0}`")]
    UnknownField(&'static str),

    /// A value did not match the schema type at its position.
    #[error("expected {0}")]
    WrongType(&'static str),

    /// An integer outside the 32-bit unsigned wire range.
    #[error("integer {0} out of range")]
    IntOutOfRange(i64),

    /// A text value contains characters outside Latin-1.
    #[error("string is not representable in latin-1")]
    Unencodable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_incomplete() {
        assert!(ParseError::Incomplete.is_incomplete());
        assert!(!ParseError::Protocol("test").is_incomplete());
        assert!(!ParseError::BadHandshake.is_incomplete());
        assert!(!ParseError::InvalidNumber.is_incomplete());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ParseError::Incomplete.to_string(), "incomplete data");
        assert_eq!(
            ParseError::StringTooLong { len: 9, max: 4 }.to_string(),
            "string of 9 bytes exceeds limit of 4"
        );
        assert_eq!(
            FormatError::MissingField("passwd").to_string(),
            "missing field `passwd`"
        );
        assert_eq!(
            FormatError::Unencodable.to_string(),
            "string is not representable in latin-1"
        );
    }
}
