//! Sans-io implementation of LysKOM Protocol A.
//!
//! Protocol A is a textual, line-oriented, pipelined RPC protocol. The
//! client tags each request with a reference number; the server interleaves
//! three kinds of messages on the return stream:
//!
//! - Reply: `=<refNo> <fields>`
//! - Error reply: `%<refNo> <errorCode> <errorStatus>`
//! - Asynchronous message: `:<numParams> <msgNum> <fields>`
//!
//! plus out-of-band `%%<text>` server errors. Strings are Hollerith coded
//! (`6Hfoobar`), arrays are `<n> { <elems> }` or the length-only `<n> *`,
//! and bit-strings are fixed-width runs of `0`/`1` digits.
//!
//! This crate has no sockets and no runtime: it turns arbitrarily chunked
//! bytes into tokens ([`TokenStream`]), tokens into typed values under
//! declarative schemas ([`Schema`], [`Parser`]), and typed values back into
//! request bytes ([`encode_request`]). The [`catalog`] module is the data
//! table of known calls, asynchronous messages, error codes and aux-item
//! tags.
//!
//! # Example - request encoding
//!
//! ```
//! use protocol_lyskom::{catalog, encode_request, Value};
//!
//! let rpc = catalog::rpc("send-message").unwrap();
//! let params = Value::structure([
//!     ("recipient", 4711u32.into()),
//!     ("message", "hello".into()),
//! ]);
//! let bytes = encode_request(7, rpc, &params).unwrap();
//! assert_eq!(bytes, b"7 53 4711 5Hhello\n");
//! ```
//!
//! # Example - tokenizing a reply
//!
//! ```
//! use protocol_lyskom::{Frame, Token, TokenStream};
//!
//! let mut stream = TokenStream::new(true);
//! stream.push(b"LysKOM\n=3 6Hfoobar ");
//! assert_eq!(stream.next_frame().unwrap(), Some(Frame::Handshake));
//! assert_eq!(
//!     stream.next_frame().unwrap(),
//!     Some(Frame::Token(Token::Equals))
//! );
//! ```

pub mod catalog;
mod error;
pub mod latin1;
mod request;
mod schema;
mod token;

pub use catalog::{AsyncDescriptor, RpcDescriptor};
pub use error::{FormatError, ParseError};
pub use request::{encode_handshake, encode_request};
pub use schema::{MAX_ARRAY_ELEMENTS, ParseProgress, Parser, Schema, Value};
pub use token::{
    DEFAULT_MAX_INT_DIGITS, DEFAULT_MAX_STRING_LEN, Frame, Token, TokenLimits, TokenStream,
};
