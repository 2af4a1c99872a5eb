use std::convert::TryFrom;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use url::Url;

use crate::auth::{ProxyCredential, Realm};
use crate::{Client, Response, Result};

/// A request which can be executed with `Client::execute()`.
///
/// The body is held as `Bytes`, so cloning a request for a retry is cheap
/// and always replays the same payload.
#[derive(Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
    realm: Option<Realm>,
    proxy: Option<ProxyCredential>,
    timeout: Option<Duration>,
}

/// A builder to construct the properties of a `Request`.
///
/// To construct a `RequestBuilder`, refer to the `Client` documentation.
#[must_use = "RequestBuilder does nothing until you 'send' it"]
pub struct RequestBuilder {
    client: Client,
    request: Result<Request>,
}

impl Request {
    /// Constructs a new request.
    #[inline]
    pub fn new(method: Method, url: Url) -> Self {
        Request {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            realm: None,
            proxy: None,
            timeout: None,
        }
    }

    /// Get the method.
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get a mutable reference to the method.
    #[inline]
    pub fn method_mut(&mut self) -> &mut Method {
        &mut self.method
    }

    /// Get the url.
    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get a mutable reference to the url.
    #[inline]
    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    /// Get the headers.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the headers.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get the body.
    #[inline]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Get a mutable reference to the body.
    #[inline]
    pub fn body_mut(&mut self) -> &mut Option<Bytes> {
        &mut self.body
    }

    /// Origin credentials attached to this request.
    #[inline]
    pub fn realm(&self) -> Option<&Realm> {
        self.realm.as_ref()
    }

    #[inline]
    pub fn realm_mut(&mut self) -> &mut Option<Realm> {
        &mut self.realm
    }

    /// The forward proxy this request is routed through, with its credentials.
    #[inline]
    pub fn proxy(&self) -> Option<&ProxyCredential> {
        self.proxy.as_ref()
    }

    #[inline]
    pub fn proxy_mut(&mut self) -> &mut Option<ProxyCredential> {
        &mut self.proxy
    }

    /// Get the timeout.
    #[inline]
    pub fn timeout(&self) -> Option<&Duration> {
        self.timeout.as_ref()
    }

    /// Get a mutable reference to the timeout.
    #[inline]
    pub fn timeout_mut(&mut self) -> &mut Option<Duration> {
        &mut self.timeout
    }
}

impl RequestBuilder {
    pub(super) fn new(client: Client, request: Result<Request>) -> RequestBuilder {
        RequestBuilder { client, request }
    }

    /// Add a `Header` to this Request.
    pub fn header<K, V>(mut self, key: K, value: V) -> RequestBuilder
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let mut error = None;
        if let Ok(ref mut req) = self.request {
            match <HeaderName as TryFrom<K>>::try_from(key) {
                Ok(key) => match <HeaderValue as TryFrom<V>>::try_from(value) {
                    Ok(value) => {
                        req.headers_mut().append(key, value);
                    }
                    Err(e) => error = Some(crate::error::builder(e.into())),
                },
                Err(e) => error = Some(crate::error::builder(e.into())),
            };
        }
        if let Some(err) = error {
            self.request = Err(err);
        }
        self
    }

    /// Add a set of Headers to the existing ones on this Request.
    ///
    /// The headers will be merged in to any already set.
    pub fn headers(mut self, headers: HeaderMap) -> RequestBuilder {
        if let Ok(ref mut req) = self.request {
            req.headers_mut().extend(headers);
        }
        self
    }

    /// Set the request body.
    pub fn body<T: Into<Bytes>>(mut self, body: T) -> RequestBuilder {
        if let Ok(ref mut req) = self.request {
            *req.body_mut() = Some(body.into());
        }
        self
    }

    /// Attach origin server credentials.
    pub fn realm(mut self, realm: Realm) -> RequestBuilder {
        if let Ok(ref mut req) = self.request {
            *req.realm_mut() = Some(realm);
        }
        self
    }

    /// Route the request through a forward proxy that expects `proxy`'s
    /// credentials.
    pub fn proxy(mut self, proxy: ProxyCredential) -> RequestBuilder {
        if let Ok(ref mut req) = self.request {
            *req.proxy_mut() = Some(proxy);
        }
        self
    }

    /// Enables a request timeout.
    ///
    /// The timeout is applied to each attempt separately, from when the
    /// transport starts connecting until the response body has been read.
    pub fn timeout(mut self, timeout: Duration) -> RequestBuilder {
        if let Ok(ref mut req) = self.request {
            *req.timeout_mut() = Some(timeout);
        }
        self
    }

    /// Build a `Request`, which can be inspected, modified and executed with
    /// `Client::execute()`.
    pub fn build(self) -> Result<Request> {
        self.request
    }

    /// Build a `Request` and return it together with the `Client`.
    pub fn build_split(self) -> (Client, Result<Request>) {
        (self.client, self.request)
    }

    /// Constructs the Request and sends it, negotiating any origin or proxy
    /// challenges on the way, and returns a future of the final response.
    ///
    /// # Errors
    ///
    /// This method fails if there was an error while connecting, sending the
    /// request or reading the response. An unsatisfied `401` or `407` is not
    /// an error; it is returned as the final response.
    pub fn send(self) -> impl Future<Output = Result<Response>> {
        let (client, request) = self.build_split();
        async move { client.execute(request?).await }
    }

    /// Attempt to clone the RequestBuilder.
    ///
    /// `None` is returned if the builder already holds an error.
    pub fn try_clone(&self) -> Option<RequestBuilder> {
        self.request
            .as_ref()
            .ok()
            .map(|req| RequestBuilder::new(self.client.clone(), Ok(req.clone())))
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt_request_fields(&mut f.debug_struct("Request"), self).finish()
    }
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("RequestBuilder");
        match self.request {
            Ok(ref req) => fmt_request_fields(&mut builder, req).finish(),
            Err(ref err) => builder.field("error", err).finish(),
        }
    }
}

fn fmt_request_fields<'a, 'b>(
    f: &'a mut fmt::DebugStruct<'a, 'b>,
    req: &Request,
) -> &'a mut fmt::DebugStruct<'a, 'b> {
    f.field("method", &req.method)
        .field("url", &req.url.as_str())
        .field("headers", &req.headers)
        .field("realm", &req.realm)
        .field("proxy", &req.proxy)
}
