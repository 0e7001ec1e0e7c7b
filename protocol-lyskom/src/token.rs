//! Streaming tokenizer for Protocol A.
//!
//! [`TokenStream`] is an incremental lexer: bytes go in through
//! [`push`](TokenStream::push) in whatever chunks the transport delivers,
//! and complete [`Frame`]s come out of [`next_frame`](TokenStream::next_frame).
//! When the buffered bytes do not yet form a complete token the stream
//! suspends (`Ok(None)`) and resumes from the same point on the next push,
//! so chunk boundaries are never observable in the output.
//!
//! Hollerith string payloads and integer digit runs are `Bytes` slices split
//! out of the internal accumulator without copying. The raw digits of an
//! integer are kept alongside its value so that bit-string fields can be
//! re-read positionally (leading zeros are significant there).

use bytes::{Buf, Bytes, BytesMut};

use crate::error::ParseError;

/// Default maximum Hollerith string length in bytes (1MB).
///
/// A hostile server could otherwise declare a multi-gigabyte string and make
/// the client buffer it all. LysKOM texts are far below this in practice.
pub const DEFAULT_MAX_STRING_LEN: usize = 1024 * 1024;

/// Default maximum number of digits in one integer token.
///
/// 19 digits keeps the value inside `i64`; wire integers are 32-bit, and the
/// widest bit-string (Priv-Bits) is 16 digits.
pub const DEFAULT_MAX_INT_DIGITS: usize = 19;

const PREFACE: &[u8] = b"LysKOM\n";

/// A lexical token from the server byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// An integer, with its raw digit run preserved for bit-string reads.
    Int { value: i64, raw: Bytes },
    /// A floating point number.
    Float(f64),
    /// The payload of a Hollerith string, verbatim and uninterpreted.
    String(Bytes),
    /// `{`
    OpenBrace,
    /// `}`
    CloseBrace,
    /// `*`
    Star,
    /// `=`
    Equals,
    /// `%`
    Percent,
    /// `:`
    Colon,
}

impl Token {
    /// The integer value, if this is an `Int` token.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Token::Int { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// One item of tokenizer output.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A protocol token.
    Token(Token),
    /// The server preface `LysKOM\n` was received. Emitted at most once.
    Handshake,
    /// An out-of-band `%%` server error line (text up to the newline).
    ServerError(Bytes),
}

/// Limits applied while tokenizing data received from the peer.
#[derive(Debug, Clone, Copy)]
pub struct TokenLimits {
    /// Maximum Hollerith string length in bytes.
    pub max_string_len: usize,
    /// Maximum digits in a single integer token.
    pub max_int_digits: usize,
}

impl Default for TokenLimits {
    fn default() -> Self {
        Self {
            max_string_len: DEFAULT_MAX_STRING_LEN,
            max_int_digits: DEFAULT_MAX_INT_DIGITS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Accumulating the `LysKOM\n` preface.
    Handshake,
    /// Normal token lexing.
    Tokens,
    /// A fatal error was reported; no further output.
    Failed,
}

/// Outcome of one scan attempt.
enum Scan {
    /// A complete frame was lexed.
    Frame(Frame),
    /// The buffer is empty (after whitespace): nothing pending.
    Empty,
    /// Buffered bytes form an incomplete prefix. `flushable` marks the
    /// prefixes that a single trailing whitespace byte would complete
    /// (an unterminated integer or float), which is exactly what the
    /// end-of-stream flush is allowed to synthesize.
    NeedMore { flushable: bool },
}

/// Incremental tokenizer over arbitrarily chunked input.
#[derive(Debug)]
pub struct TokenStream {
    buf: BytesMut,
    state: State,
    limits: TokenLimits,
    ended: bool,
    flushed: bool,
}

impl TokenStream {
    /// Create a tokenizer. With `expect_handshake`, the stream must start
    /// with the server preface `LysKOM\n` before any token.
    pub fn new(expect_handshake: bool) -> Self {
        Self::with_limits(expect_handshake, TokenLimits::default())
    }

    /// Create a tokenizer with explicit limits.
    pub fn with_limits(expect_handshake: bool, limits: TokenLimits) -> Self {
        Self {
            buf: BytesMut::new(),
            state: if expect_handshake {
                State::Handshake
            } else {
                State::Tokens
            },
            limits,
            ended: false,
            flushed: false,
        }
    }

    /// Append a chunk of received bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Signal end of stream. Enables the final-token flush: remaining bytes
    /// are re-scanned with one synthetic whitespace byte so a trailing
    /// integer or float still comes out; any other residue is fatal.
    pub fn finish(&mut self) {
        self.ended = true;
    }

    /// Number of buffered, not yet consumed bytes.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Lex the next complete frame.
    ///
    /// Returns `Ok(None)` when the buffered bytes do not form a complete
    /// frame yet (push more and retry). Errors are fatal: the stream stops
    /// producing output permanently.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ParseError> {
        loop {
            match self.scan() {
                Ok(Scan::Frame(frame)) => return Ok(Some(frame)),
                Ok(Scan::Empty) => return Ok(None),
                Ok(Scan::NeedMore { flushable }) => {
                    if !self.ended {
                        return Ok(None);
                    }
                    if flushable && !self.flushed {
                        self.flushed = true;
                        self.buf.extend_from_slice(b" ");
                        continue;
                    }
                    self.state = State::Failed;
                    return Err(ParseError::Protocol("truncated data at end of stream"));
                }
                Err(e) => {
                    self.state = State::Failed;
                    return Err(e);
                }
            }
        }
    }

    fn scan(&mut self) -> Result<Scan, ParseError> {
        match self.state {
            State::Failed => Err(ParseError::Protocol("tokenizer already failed")),
            State::Handshake => self.scan_handshake(),
            State::Tokens => self.scan_token(),
        }
    }

    fn scan_handshake(&mut self) -> Result<Scan, ParseError> {
        if self.buf.is_empty() {
            return Ok(Scan::Empty);
        }
        if self.buf[0] == b'%' {
            // A server error instead of the preface carries a reason worth
            // surfacing, but the connection is unusable either way.
            if self.buf.len() < 2 {
                return Ok(Scan::NeedMore { flushable: false });
            }
            if self.buf[1] == b'%' {
                return match self.take_server_error() {
                    Some(text) => {
                        self.state = State::Failed;
                        Ok(Scan::Frame(Frame::ServerError(text)))
                    }
                    None => Ok(Scan::NeedMore { flushable: false }),
                };
            }
            return Err(ParseError::BadHandshake);
        }
        let n = self.buf.len().min(PREFACE.len());
        if self.buf[..n] != PREFACE[..n] {
            return Err(ParseError::BadHandshake);
        }
        if self.buf.len() < PREFACE.len() {
            return Ok(Scan::NeedMore { flushable: false });
        }
        self.buf.advance(PREFACE.len());
        self.state = State::Tokens;
        Ok(Scan::Frame(Frame::Handshake))
    }

    fn scan_token(&mut self) -> Result<Scan, ParseError> {
        while let Some(&b) = self.buf.first() {
            if is_whitespace(b) {
                self.buf.advance(1);
            } else {
                break;
            }
        }
        let Some(&first) = self.buf.first() else {
            return Ok(Scan::Empty);
        };
        let single = |stream: &mut Self, token| {
            stream.buf.advance(1);
            Ok(Scan::Frame(Frame::Token(token)))
        };
        match first {
            b'{' => single(self, Token::OpenBrace),
            b'}' => single(self, Token::CloseBrace),
            b'*' => single(self, Token::Star),
            b'=' => single(self, Token::Equals),
            b':' => single(self, Token::Colon),
            b'%' => {
                // One byte of lookahead separates the `%` error-reply marker
                // from a `%%` server error line.
                if self.buf.len() < 2 {
                    return Ok(Scan::NeedMore { flushable: true });
                }
                if self.buf[1] == b'%' {
                    match self.take_server_error() {
                        Some(text) => Ok(Scan::Frame(Frame::ServerError(text))),
                        None => Ok(Scan::NeedMore { flushable: false }),
                    }
                } else {
                    single(self, Token::Percent)
                }
            }
            b'0'..=b'9' => self.scan_number(),
            _ => Err(ParseError::Protocol("unexpected byte in stream")),
        }
    }

    /// Lex `<digits>` (integer), `<digits>H<payload>` (Hollerith string) or
    /// `<digits>.<digits>` (float). The buffer starts with a digit.
    fn scan_number(&mut self) -> Result<Scan, ParseError> {
        let Some(end) = self.buf.iter().position(|b| !b.is_ascii_digit()) else {
            if self.buf.len() > self.limits.max_int_digits {
                return Err(ParseError::InvalidNumber);
            }
            return Ok(Scan::NeedMore { flushable: true });
        };
        if end > self.limits.max_int_digits {
            return Err(ParseError::InvalidNumber);
        }
        match self.buf[end] {
            b'H' => {
                let len = parse_decimal(&self.buf[..end])? as usize;
                if len > self.limits.max_string_len {
                    return Err(ParseError::StringTooLong {
                        len,
                        max: self.limits.max_string_len,
                    });
                }
                if self.buf.len() - end - 1 < len {
                    // The synthetic end-of-stream whitespace must never leak
                    // into a payload, so a short Hollerith is not flushable.
                    return Ok(Scan::NeedMore { flushable: false });
                }
                self.buf.advance(end + 1);
                let payload = self.buf.split_to(len).freeze();
                Ok(Scan::Frame(Frame::Token(Token::String(payload))))
            }
            b'.' => {
                let mut i = end + 1;
                while i < self.buf.len() && self.buf[i].is_ascii_digit() {
                    i += 1;
                }
                if i - end - 1 > self.limits.max_int_digits {
                    return Err(ParseError::InvalidNumber);
                }
                if i == self.buf.len() {
                    return Ok(Scan::NeedMore { flushable: true });
                }
                if i == end + 1 || !is_whitespace(self.buf[i]) {
                    return Err(ParseError::Protocol("malformed float"));
                }
                let value = std::str::from_utf8(&self.buf[..i])
                    .ok()
                    .and_then(|s| s.parse::<f64>().ok())
                    .ok_or(ParseError::InvalidNumber)?;
                self.buf.advance(i);
                Ok(Scan::Frame(Frame::Token(Token::Float(value))))
            }
            b if is_whitespace(b) => {
                let raw = self.buf.split_to(end).freeze();
                let value = parse_decimal(&raw)?;
                Ok(Scan::Frame(Frame::Token(Token::Int { value, raw })))
            }
            _ => Err(ParseError::Protocol("unexpected byte after digits")),
        }
    }

    /// Take a complete `%%<text>\n` line off the buffer, or `None` if the
    /// newline has not arrived yet. The buffer starts with `%%`.
    fn take_server_error(&mut self) -> Option<Bytes> {
        let nl = self.buf[2..].iter().position(|&b| b == b'\n')? + 2;
        self.buf.advance(2);
        let text = self.buf.split_to(nl - 2).freeze();
        self.buf.advance(1);
        Some(text)
    }
}

#[inline]
fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\n' | b'\r' | b'\t')
}

/// Parse an all-digit slice as a non-negative integer with overflow checks.
fn parse_decimal(digits: &[u8]) -> Result<i64, ParseError> {
    if digits.is_empty() {
        return Err(ParseError::InvalidNumber);
    }
    let mut value: i64 = 0;
    for &b in digits {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as i64))
            .ok_or(ParseError::InvalidNumber)?;
    }
    Ok(value)
}
