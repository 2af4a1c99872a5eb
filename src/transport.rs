//! The built-in HTTP/1.1 transport.
//!
//! Every attempt opens its own connection. A request routed through a proxy
//! connects to the proxy and names its target in absolute-form
//! (`GET http://origin/path HTTP/1.1`); otherwise the request goes straight
//! to the origin in origin-form.

use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_core::future::BoxFuture;
use http::header::{HeaderValue, HOST};
use http::Uri;
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tower_service::Service;
use url::{Host, Url};

use crate::error::{self, TimedOut};
use crate::{Error, Request, Response, Result};

/// A `tower::Service` that sends one attempt over a fresh HTTP/1.1
/// connection.
///
/// Requires a Tokio runtime.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new() -> Self {
        HttpTransport::default()
    }

    /// Timeout for attempts whose request does not carry its own.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Service<Request> for HttpTransport {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let timeout = req.timeout().copied().or(self.timeout);
        Box::pin(async move {
            let url = req.url().clone();
            let attempt = send(req);
            let result = match timeout {
                Some(timeout) => match tokio::time::timeout(timeout, attempt).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(error::request(TimedOut)),
                },
                None => attempt.await,
            };
            result.map_err(|err| err.with_url(url))
        })
    }
}

async fn send(mut req: Request) -> Result<Response> {
    let url = req.url().clone();
    if url.scheme() != "http" {
        return Err(error::builder(format!("unsupported URL scheme: {}", url.scheme())));
    }

    let (host, port) = match req.proxy() {
        Some(proxy) => (unbracket(proxy.host()).to_owned(), proxy.port()),
        None => {
            let port = url
                .port_or_known_default()
                .ok_or_else(|| error::builder("URL has no port"))?;
            (connect_host(&url)?, port)
        }
    };

    let uri = request_target(&url, req.proxy().is_some())?;
    let mut request = http::Request::new(Full::new(req.body().cloned().unwrap_or_default()));
    *request.method_mut() = req.method().clone();
    *request.uri_mut() = uri;
    *request.headers_mut() = std::mem::take(req.headers_mut());
    if !request.headers().contains_key(HOST) {
        request.headers_mut().insert(HOST, host_header(&url)?);
    }

    log::trace!("connecting to {}:{} for {}", host, port, url);
    let stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(error::connect)?;

    let (mut sender, conn) = hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
        .await
        .map_err(error::connect)?;
    tokio::spawn(async move {
        if let Err(err) = conn.await {
            log::debug!("connection error: {}", err);
        }
    });

    let response = sender.send_request(request).await.map_err(error::request)?;
    let (parts, body) = response.into_parts();
    let body = body.collect().await.map_err(error::body)?.to_bytes();

    Ok(Response::from(http::Response::from_parts(parts, body)))
}

fn request_target(url: &Url, proxied: bool) -> Result<Uri> {
    let target = if proxied {
        let mut absolute = url.clone();
        absolute.set_fragment(None);
        String::from(absolute)
    } else {
        match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_owned(),
        }
    };
    target.parse::<Uri>().map_err(error::builder)
}

/// The host to dial, without the brackets an IPv6 literal carries in a URL.
fn connect_host(url: &Url) -> Result<String> {
    match url.host() {
        Some(Host::Domain(domain)) => Ok(domain.to_owned()),
        Some(Host::Ipv4(addr)) => Ok(addr.to_string()),
        Some(Host::Ipv6(addr)) => Ok(addr.to_string()),
        None => Err(error::builder("URL has no host")),
    }
}

fn unbracket(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

fn host_header(url: &Url) -> Result<HeaderValue> {
    let host = url.host_str().ok_or_else(|| error::builder("URL has no host"))?;
    let value = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_owned(),
    };
    HeaderValue::from_str(&value).map_err(error::builder)
}
