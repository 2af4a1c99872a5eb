use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};

/// A fully read response.
///
/// The negotiator hands back whichever response ended the exchange: a
/// success, any status other than `401`/`407`, or the last challenge when
/// authentication could not be satisfied.
#[derive(Clone)]
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Get the `StatusCode` of this `Response`.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the HTTP `Version` of this `Response`.
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the `Headers` of this `Response`.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the `Headers` of this `Response`.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns true for `401` and `407`.
    pub fn is_auth_challenge(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
            || self.status == StatusCode::PROXY_AUTHENTICATION_REQUIRED
    }

    /// Get the response body.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response, returning the body.
    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Get the response body as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status())
            .field("headers", self.headers())
            .finish()
    }
}

impl<T: Into<Bytes>> From<http::Response<T>> for Response {
    fn from(r: http::Response<T>) -> Response {
        let (parts, body) = r.into_parts();
        Response {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            body: body.into(),
        }
    }
}

impl From<Response> for http::Response<Bytes> {
    fn from(r: Response) -> http::Response<Bytes> {
        let mut response = http::Response::new(r.body);
        *response.status_mut() = r.status;
        *response.version_mut() = r.version;
        *response.headers_mut() = r.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http() {
        let response = http::Response::builder()
            .status(407)
            .header("proxy-authenticate", "Basic realm=\"Fake Realm\"")
            .body("denied")
            .unwrap();
        let response = Response::from(response);

        assert_eq!(response.status(), StatusCode::PROXY_AUTHENTICATION_REQUIRED);
        assert!(response.is_auth_challenge());
        assert_eq!(response.text(), "denied");
        assert_eq!(
            response.headers()["proxy-authenticate"],
            "Basic realm=\"Fake Realm\""
        );
    }

    #[test]
    fn test_into_http() {
        let response = Response::from(http::Response::new(Bytes::from_static(b"ok")));
        assert!(!response.is_auth_challenge());

        let http: http::Response<Bytes> = response.into();
        assert_eq!(http.status(), StatusCode::OK);
        assert_eq!(http.body().as_ref(), b"ok");
    }
}
