use std::fmt;
use std::future::Future;
use std::time::Duration;

use http::Method;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};

use crate::auth::negotiate::DEFAULT_MAX_AUTH_RETRIES;
use crate::auth::{AuthLayer, AuthService, Negotiator, ProxyCredentialCache, SchemeCodec, Schemes};
use crate::into_url::IntoUrlSealed;
use crate::{Error, IntoUrl, Request, RequestBuilder, Response, Result};

type BoxedTransport = BoxCloneSyncService<Request, Response, Error>;

const DEFAULT_PROXY_CACHE_CAPACITY: usize = 256;

/// An HTTP client that answers origin and proxy authentication challenges.
///
/// The Client holds the transport and the proxy credential cache, so it is
/// advised to create one and **reuse** it. Cloning is cheap and every clone
/// shares the same cache.
///
/// Credentials are attached per request with
/// [`RequestBuilder::realm`] and [`RequestBuilder::proxy`].
#[derive(Clone)]
pub struct Client {
    inner: AuthService<BoxedTransport>,
    timeout: Option<Duration>,
}

/// A `ClientBuilder` can be used to create a `Client` with custom configuration.
#[must_use]
pub struct ClientBuilder {
    config: Config,
}

struct Config {
    transport: Option<BoxedTransport>,
    max_auth_retries: usize,
    proxy_cache: Option<ProxyCredentialCache>,
    proxy_cache_capacity: usize,
    schemes: Schemes,
    timeout: Option<Duration>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Constructs a new `ClientBuilder`.
    ///
    /// This is the same as `Client::builder()`.
    pub fn new() -> ClientBuilder {
        ClientBuilder {
            config: Config {
                transport: None,
                max_auth_retries: DEFAULT_MAX_AUTH_RETRIES,
                proxy_cache: None,
                proxy_cache_capacity: DEFAULT_PROXY_CACHE_CAPACITY,
                schemes: Schemes::default(),
                timeout: None,
            },
        }
    }

    /// Returns a `Client` that uses this `ClientBuilder` configuration.
    ///
    /// # Errors
    ///
    /// This method fails if no transport was configured and the built-in
    /// `transport` feature is disabled.
    pub fn build(self) -> Result<Client> {
        let config = self.config;

        let transport = match config.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };
        let cache = config
            .proxy_cache
            .unwrap_or_else(|| ProxyCredentialCache::with_capacity(config.proxy_cache_capacity));

        log::trace!(
            "building client: max_auth_retries={}, proxy cache capacity={}",
            config.max_auth_retries,
            cache.capacity()
        );

        let negotiator = Negotiator::new(config.schemes, cache).max_retries(config.max_auth_retries);
        Ok(Client {
            inner: AuthLayer::new(negotiator).layer(transport),
            timeout: config.timeout,
        })
    }

    /// Use a custom transport for every attempt.
    ///
    /// The transport sees each attempt as a separate request, already
    /// carrying whatever `Authorization` and `Proxy-Authorization` headers
    /// the negotiator composed for it.
    pub fn transport<S>(mut self, transport: S) -> ClientBuilder
    where
        S: Service<Request, Response = Response, Error = Error> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        self.config.transport = Some(BoxCloneSyncService::new(transport));
        self
    }

    /// Maximum challenge-driven retries per request.
    ///
    /// Default is 2, enough to satisfy the proxy and then the origin. Zero
    /// disables reactive authentication; preemptive and cached headers are
    /// still sent.
    pub fn max_auth_retries(mut self, max: usize) -> ClientBuilder {
        self.config.max_auth_retries = max;
        self
    }

    /// Bound the number of proxies remembered in the credential cache.
    ///
    /// Default is 256. Ignored if `proxy_cache` is also set.
    pub fn proxy_cache_capacity(mut self, capacity: usize) -> ClientBuilder {
        self.config.proxy_cache_capacity = capacity;
        self
    }

    /// Share an existing credential cache, for example across several
    /// clients talking to the same proxies.
    pub fn proxy_cache(mut self, cache: ProxyCredentialCache) -> ClientBuilder {
        self.config.proxy_cache = Some(cache);
        self
    }

    /// Register an additional authentication scheme.
    ///
    /// `Basic` is always registered first.
    pub fn scheme<C>(mut self, codec: C) -> ClientBuilder
    where
        C: SchemeCodec + 'static,
    {
        self.config.schemes.register(codec);
        self
    }

    /// Default timeout for each attempt of requests that do not set their own.
    pub fn timeout(mut self, timeout: Duration) -> ClientBuilder {
        self.config.timeout = Some(timeout);
        self
    }
}

#[cfg(feature = "transport")]
fn default_transport() -> Result<BoxedTransport> {
    Ok(BoxCloneSyncService::new(crate::HttpTransport::new()))
}

#[cfg(not(feature = "transport"))]
fn default_transport() -> Result<BoxedTransport> {
    Err(crate::error::builder("no transport configured"))
}

impl Client {
    /// Constructs a new `Client` over the built-in HTTP transport.
    ///
    /// # Panics
    ///
    /// This method panics if the client cannot be built. Use
    /// `Client::builder()` to handle the failure as an `Error` instead.
    #[cfg(feature = "transport")]
    pub fn new() -> Client {
        ClientBuilder::new().build().expect("Client::new()")
    }

    /// Creates a `ClientBuilder` to configure a `Client`.
    ///
    /// This is the same as `ClientBuilder::new()`.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Convenience method to make a `GET` request to a URL.
    ///
    /// # Errors
    ///
    /// This method fails whenever the supplied `Url` cannot be parsed.
    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Convenience method to make a `POST` request to a URL.
    ///
    /// # Errors
    ///
    /// This method fails whenever the supplied `Url` cannot be parsed.
    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Start building a `Request` with the `Method` and `Url`.
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        let req = url.into_url().map(move |url| Request::new(method, url));
        RequestBuilder::new(self.clone(), req)
    }

    /// Executes a `Request`, negotiating origin and proxy authentication.
    ///
    /// A `Request` can be built manually with `Request::new()` or obtained
    /// from a RequestBuilder with `RequestBuilder::build()`.
    ///
    /// # Errors
    ///
    /// This method fails if there was an error while connecting, sending the
    /// request or reading the response. A `401` or `407` that could not be
    /// satisfied is returned as `Ok`.
    pub fn execute(&self, mut request: Request) -> impl Future<Output = Result<Response>> {
        if request.timeout().is_none() {
            *request.timeout_mut() = self.timeout;
        }
        self.inner.clone().oneshot(request)
    }

    /// The proxy credential cache shared by every clone of this client.
    pub fn proxy_cache(&self) -> &ProxyCredentialCache {
        self.inner.negotiator().cache()
    }
}

#[cfg(feature = "transport")]
impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("Client");
        builder.field("negotiator", self.inner.negotiator());
        if let Some(ref d) = self.timeout {
            builder.field("timeout", d);
        }
        builder.finish()
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("ClientBuilder");
        builder
            .field("custom_transport", &self.config.transport.is_some())
            .field("max_auth_retries", &self.config.max_auth_retries)
            .field("schemes", &self.config.schemes);
        match self.config.proxy_cache {
            Some(ref cache) => builder.field("proxy_cache", cache),
            None => builder.field("proxy_cache_capacity", &self.config.proxy_cache_capacity),
        };
        if let Some(ref d) = self.config.timeout {
            builder.field("timeout", d);
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};

    async fn ok(_req: Request) -> Result<Response> {
        Ok(Response::from(http::Response::new(Bytes::new())))
    }

    #[test]
    fn builder_defaults() {
        let client = Client::builder().transport(tower::service_fn(ok)).build().unwrap();
        assert_eq!(client.proxy_cache().capacity(), 256);
        assert!(client.proxy_cache().is_empty());
    }

    #[test]
    fn builder_shares_cache() {
        let cache = ProxyCredentialCache::with_capacity(4);
        let client = Client::builder()
            .transport(tower::service_fn(ok))
            .proxy_cache(cache.clone())
            .proxy_cache_capacity(100)
            .build()
            .unwrap();

        assert_eq!(client.proxy_cache().capacity(), 4);
        cache.clear();
        assert!(client.clone().proxy_cache().is_empty());
    }

    #[tokio::test]
    async fn execute_applies_default_timeout() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let transport = tower::service_fn(move |req: Request| {
            recorded.lock().unwrap().push(req.timeout().copied());
            async { Ok::<_, Error>(Response::from(http::Response::new(Bytes::new()))) }
        });
        let client = Client::builder()
            .transport(transport)
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap();

        client.get("http://localhost/").send().await.unwrap();
        client
            .get("http://localhost/")
            .timeout(Duration::from_millis(10))
            .send()
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(Duration::from_secs(3)), Some(Duration::from_millis(10))]
        );
    }

    #[tokio::test]
    async fn builder_error_surfaces_on_send() {
        let client = Client::builder().transport(tower::service_fn(ok)).build().unwrap();
        let err = client.get("not a url").send().await.unwrap_err();
        assert!(err.is_builder());
    }
}
