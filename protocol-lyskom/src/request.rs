//! Client-side request encoding.
//!
//! A request is `<refNo> <rpcNum>` followed by the request schema's fields
//! (each preceded by one space) and a terminating newline. Everything is
//! validated against the schema before the buffer is handed back, so a bad
//! parameter never puts partial bytes on the wire.

use std::io::Write;

use crate::catalog::RpcDescriptor;
use crate::error::FormatError;
use crate::latin1;
use crate::schema::Value;

/// Encode one request.
///
/// # Example
///
/// ```
/// use protocol_lyskom::{catalog, Value};
///
/// let rpc = catalog::rpc("logout").unwrap();
/// let bytes = protocol_lyskom::encode_request(10, rpc, &Value::Empty).unwrap();
/// assert_eq!(bytes, b"10 1\n");
/// ```
pub fn encode_request(
    ref_no: u32,
    rpc: &RpcDescriptor,
    params: &Value,
) -> Result<Vec<u8>, FormatError> {
    let mut buf = Vec::with_capacity(32);
    write!(buf, "{} {}", ref_no, rpc.number).unwrap();
    rpc.request.format(params, &mut buf)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Encode the client handshake `A<L>H<user>%<host>\n`, where `<L>` is the
/// byte length of the Latin-1 encoded `<user>%<host>`.
pub fn encode_handshake(user: &str, host: &str) -> Result<Vec<u8>, FormatError> {
    let mut ident = Vec::with_capacity(user.len() + host.len() + 1);
    latin1::encode_into(user, &mut ident)?;
    ident.push(b'%');
    latin1::encode_into(host, &mut ident)?;

    let mut buf = Vec::with_capacity(ident.len() + 8);
    write!(buf, "A{}H", ident.len()).unwrap();
    buf.extend_from_slice(&ident);
    buf.push(b'\n');
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::schema::Value;

    #[test]
    fn test_encode_logout() {
        let rpc = catalog::rpc("logout").unwrap();
        let bytes = encode_request(10, rpc, &Value::structure([])).unwrap();
        assert_eq!(bytes, b"10 1\n");
    }

    #[test]
    fn test_encode_login() {
        let rpc = catalog::rpc("login").unwrap();
        let params = Value::structure([
            ("person", 4711.into()),
            ("passwd", "h\u{e4}mligt".into()),
            ("invisible", true.into()),
        ]);
        let bytes = encode_request(11, rpc, &params).unwrap();
        assert_eq!(bytes, b"11 62 4711 7Hh\xe4mligt 1\n");
    }

    #[test]
    fn test_encode_accept_async() {
        let rpc = catalog::rpc("accept-async").unwrap();
        let params = Value::structure([(
            "requestList",
            Value::array([12.into(), 8.into(), 4.into()]),
        )]);
        let bytes = encode_request(12, rpc, &params).unwrap();
        assert_eq!(bytes, b"12 80 3 { 12 8 4 }\n");
    }

    #[test]
    fn test_encode_create_person() {
        let rpc = catalog::rpc("create-person").unwrap();
        let params = Value::structure([
            ("name", "foo".into()),
            ("passwd", "bar".into()),
            ("flags", Value::structure([("unreadIsSecret", true.into())])),
            (
                "auxItems",
                Value::array([
                    Value::structure([
                        ("tag", 17.into()),
                        (
                            "flags",
                            Value::structure([
                                ("inherit", true.into()),
                                ("dontGarb", true.into()),
                            ]),
                        ),
                        ("inheritLimit", 0.into()),
                        ("data", "gazonk".into()),
                    ]),
                    Value::structure([
                        ("tag", 18.into()),
                        ("flags", Value::structure([])),
                        ("inheritLimit", 10.into()),
                        ("data", "".into()),
                    ]),
                ]),
            ),
        ]);
        let bytes = encode_request(13, rpc, &params).unwrap();
        assert_eq!(
            bytes,
            &b"13 89 3Hfoo 3Hbar 10000000 2 { 17 01001000 0 6Hgazonk 18 00000000 10 0H }\n"[..]
        );
    }

    #[test]
    fn test_format_error_before_any_output() {
        let rpc = catalog::rpc("login").unwrap();
        // missing `passwd`
        let params = Value::structure([("person", 4711.into()), ("invisible", true.into())]);
        assert_eq!(
            encode_request(1, rpc, &params),
            Err(FormatError::MissingField("passwd"))
        );
    }

    #[test]
    fn test_encode_handshake() {
        let bytes = encode_handshake("oskar", "kom.example").unwrap();
        assert_eq!(bytes, b"A17Hoskar%kom.example\n");
    }

    #[test]
    fn test_encode_handshake_latin1_user() {
        let bytes = encode_handshake("\u{e5}sa", "10.0.0.1").unwrap();
        assert_eq!(bytes, b"A12H\xe5sa%10.0.0.1\n");
    }
}
