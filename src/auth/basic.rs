// src/auth/basic.rs

//! The `Basic` scheme (RFC 7617).

use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderWriter;
use base64::Engine as _;
use http::HeaderValue;

/// Encode credentials as a Basic authorization header value:
/// `"Basic " + base64(principal ":" secret)`.
///
/// The returned value is marked sensitive so it is left out of `Debug`
/// output and HPACK indexing.
pub fn encode(principal: &str, secret: &str) -> HeaderValue {
    let mut buf = b"Basic ".to_vec();
    {
        let mut encoder = EncoderWriter::new(&mut buf, &STANDARD);
        // writing into a Vec never fails
        let _ = write!(encoder, "{}:{}", principal, secret);
    }
    let mut header = match HeaderValue::from_bytes(&buf) {
        Ok(header) => header,
        Err(_) => unreachable!("base64 output is always a valid header value"),
    };
    header.set_sensitive(true);
    header
}

/// Decode a Basic authorization header value into `(principal, secret)`.
///
/// The scheme name is matched case-insensitively. Returns `None` for any
/// other scheme or for a payload that is not base64 of `principal:secret`.
pub fn decode(value: &str) -> Option<(String, String)> {
    let (scheme, payload) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(payload.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (principal, secret) = text.split_once(':')?;
    Some((principal.to_owned(), secret.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        // RFC 7617 example
        assert_eq!(
            encode("Aladdin", "open sesame"),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
        assert_eq!(encode("johndoe", "pass"), "Basic am9obmRvZTpwYXNz");
        assert_eq!(encode("user", "passwd"), "Basic dXNlcjpwYXNzd2Q=");
    }

    #[test]
    fn test_encode_is_sensitive() {
        assert!(encode("user", "passwd").is_sensitive());
    }

    #[test]
    fn test_secret_may_contain_colon() {
        let value = encode("user@domain", "p@ss:word!");
        let (principal, secret) = decode(value.to_str().unwrap()).unwrap();
        assert_eq!(principal, "user@domain");
        assert_eq!(secret, "p@ss:word!");
    }

    #[test]
    fn test_decode_invalid() {
        assert!(decode("NotBasic xxx").is_none());
        assert!(decode("Basic !@#invalid").is_none());
        assert!(decode("Basic").is_none());
        // "nocolon"
        assert!(decode("Basic bm9jb2xvbg==").is_none());
        assert_eq!(
            decode("basic dXNlcjpwYXNzd2Q="),
            Some(("user".to_owned(), "passwd".to_owned()))
        );
    }
}
