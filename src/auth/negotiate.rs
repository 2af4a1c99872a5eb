// src/auth/negotiate.rs

//! The authentication negotiator.
//!
//! One logical request moves through these states:
//!
//! ```text
//! INIT -> IN_FLIGHT -> SUCCESS | CHALLENGED | EXHAUSTED | TRANSPORT_FAILURE
//!              ^            |
//!              +------------+  (retry with composed auth headers)
//! ```
//!
//! `INIT` attaches whatever can be sent before any challenge: a preemptive
//! origin realm, and proxy credentials the cache says this proxy accepted
//! before. Each challenge round answers the proxy first and the origin
//! second, folding both headers into a single retry. Retries are bounded,
//! and a `(hop, scheme)` pair that was already answered after a challenge is
//! never sent again, so a wrong credential ends the exchange instead of
//! looping. Exhaustion returns the last `401`/`407` as an ordinary response.

use std::collections::HashSet;
use std::fmt;
use std::task::{Context, Poll};
use std::sync::Arc;

use futures_core::future::BoxFuture;
use http::{HeaderValue, StatusCode};
use tower::{Layer, Service, ServiceExt};

use super::{parse_challenges, AuthScheme, Challenge, Credentials, Hop, ProxyCredentialCache, Schemes};
use crate::{Error, Request, Response, Result};

pub(crate) const DEFAULT_MAX_AUTH_RETRIES: usize = 2;

/// Drives the challenge/response exchange for one request at a time.
///
/// A `Negotiator` holds no per-request state; it is cheap to clone and may
/// run any number of negotiations concurrently. The only thing they share
/// is the [`ProxyCredentialCache`].
#[derive(Clone)]
pub struct Negotiator {
    schemes: Arc<Schemes>,
    cache: ProxyCredentialCache,
    max_retries: usize,
}

/// Per-request bookkeeping. Never shared.
#[derive(Debug, Default)]
struct AttemptContext {
    attempts: usize,
    retries: usize,
    // hops whose auth header is on the outbound request
    applied: HashSet<Hop>,
    // pairs already sent in answer to a challenge
    attempted: HashSet<(Hop, AuthScheme)>,
    // the outbound Proxy-Authorization came from the cache
    cached_proxy: bool,
    // the outbound Proxy-Authorization answered a challenge, with this scheme
    reactive_proxy: Option<AuthScheme>,
}

impl Negotiator {
    pub fn new(schemes: Schemes, cache: ProxyCredentialCache) -> Self {
        Negotiator {
            schemes: Arc::new(schemes),
            cache,
            max_retries: DEFAULT_MAX_AUTH_RETRIES,
        }
    }

    /// Maximum number of challenge-driven retries per request.
    ///
    /// Defaults to 2, one per hop.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn cache(&self) -> &ProxyCredentialCache {
        &self.cache
    }

    pub fn schemes(&self) -> &Schemes {
        &self.schemes
    }

    /// Send `request` through `transport`, answering `401` and `407`
    /// challenges until the exchange ends.
    ///
    /// Resolves to the final response, which may itself be a `401` or `407`
    /// when the challenge cannot be satisfied or the retry budget runs out.
    /// Transport errors are returned immediately and never retried.
    ///
    /// Dropping the returned future drops the in-flight transport call and
    /// leaves the proxy cache untouched.
    pub async fn negotiate<S>(&self, request: Request, transport: &mut S) -> Result<Response>
    where
        S: Service<Request, Response = Response, Error = Error>,
    {
        let mut ctx = AttemptContext::default();
        let mut outbound = self.prepare(&request, &mut ctx);

        loop {
            ctx.attempts += 1;
            log::trace!(
                "attempt {} for {}, authorization={}, proxy-authorization={}",
                ctx.attempts,
                request.url(),
                ctx.applied.contains(&Hop::Origin),
                ctx.applied.contains(&Hop::Proxy),
            );

            let response = transport.ready().await?.call(outbound.clone()).await?;

            let challenges = challenges_by_hop(&response);
            if challenges.is_empty() {
                if !response.is_auth_challenge() {
                    self.remember_proxy(&request, &ctx);
                } else {
                    log::debug!(
                        "{} from {} carried no usable challenge",
                        response.status(),
                        request.url()
                    );
                }
                return Ok(response);
            }

            let proxy_challenged = challenges.iter().any(|(hop, _)| *hop == Hop::Proxy);
            if proxy_challenged && ctx.cached_proxy {
                self.forget_proxy(&request);
                ctx.cached_proxy = false;
            }

            if ctx.retries >= self.max_retries {
                log::debug!(
                    "auth retries exhausted after {} attempts for {}",
                    ctx.attempts,
                    request.url()
                );
                return Ok(response);
            }

            if !self.answer(&request, &challenges, &mut ctx, &mut outbound) {
                return Ok(response);
            }
            ctx.retries += 1;
        }
    }

    /// `INIT`: headers that can go out before any challenge.
    fn prepare(&self, request: &Request, ctx: &mut AttemptContext) -> Request {
        let mut outbound = request.clone();

        if let Some(realm) = request.realm().filter(|realm| realm.is_preemptive()) {
            if let Some(value) = self.encode_unprompted(Hop::Origin, realm.credentials()) {
                outbound
                    .headers_mut()
                    .insert(Hop::Origin.authorization_header(), value);
                ctx.applied.insert(Hop::Origin);
            }
        }

        if let Some(proxy) = request.proxy() {
            let cached = self.cache.lookup(proxy.host(), proxy.port(), proxy.scheme());
            if cached == Some(proxy.credentials().digest()) {
                if let Some(value) = self.encode_unprompted(Hop::Proxy, proxy.credentials()) {
                    log::trace!("proxy {}:{} primed from cache", proxy.host(), proxy.port());
                    outbound
                        .headers_mut()
                        .insert(Hop::Proxy.authorization_header(), value);
                    ctx.applied.insert(Hop::Proxy);
                    ctx.cached_proxy = true;
                }
            }
        }

        outbound
    }

    /// `CHALLENGED`: compose the next attempt. The first entry belongs to
    /// the hop named by the status; if it cannot be answered the exchange
    /// ends. Other hops are answered when possible and skipped otherwise.
    fn answer(
        &self,
        request: &Request,
        challenges: &[(Hop, Vec<Challenge>)],
        ctx: &mut AttemptContext,
        outbound: &mut Request,
    ) -> bool {
        let mut origin_offered = false;
        for (index, (hop, offered)) in challenges.iter().enumerate() {
            let hop = *hop;
            origin_offered |= hop == Hop::Origin;
            if !self.answer_hop(request, hop, offered, ctx, outbound) {
                if index == 0 {
                    return false;
                }
                log::debug!("skipping {} challenge riding on a {}", hop, challenges[0].0);
            }
        }

        // A proxy round trip already happened, so the preemptive flag has
        // nothing left to save: send known origin credentials now.
        let proxy_challenged = challenges.iter().any(|(hop, _)| *hop == Hop::Proxy);
        if proxy_challenged && !origin_offered && !ctx.applied.contains(&Hop::Origin) {
            if let Some(realm) = request.realm() {
                if let Some(value) = self.encode_unprompted(Hop::Origin, realm.credentials()) {
                    log::trace!("adding origin credentials after proxy challenge");
                    outbound
                        .headers_mut()
                        .insert(Hop::Origin.authorization_header(), value);
                    ctx.applied.insert(Hop::Origin);
                }
            }
        }

        for hop in ctx.applied.iter().copied() {
            if let Some((credentials, _)) = credentials_for(request, hop) {
                ctx.attempted.insert((hop, credentials.scheme().clone()));
            }
        }

        true
    }

    /// Put an answer to one hop's challenges on `outbound`. Returns `false`
    /// when there is nothing new to send for that hop.
    fn answer_hop(
        &self,
        request: &Request,
        hop: Hop,
        offered: &[Challenge],
        ctx: &mut AttemptContext,
        outbound: &mut Request,
    ) -> bool {
        let Some((credentials, realm_name)) = credentials_for(request, hop) else {
            log::debug!("{} challenged but no {} credentials configured", hop, hop);
            return false;
        };

        let Some((challenge, codec)) = self.schemes.select(offered, credentials, realm_name) else {
            log::debug!(
                "no answerable {} challenge for {} credentials",
                hop,
                credentials.scheme()
            );
            return false;
        };

        let scheme = challenge.scheme().clone();
        if ctx.attempted.contains(&(hop, scheme.clone())) {
            log::debug!("{} rejected {} credentials already sent", hop, scheme);
            return false;
        }

        let value = match codec.encode(Some(challenge), credentials) {
            Ok(value) => value,
            Err(err) => {
                log::debug!("{} {} credentials not encodable: {}", hop, scheme, err);
                return false;
            }
        };

        log::debug!("answering {} {} challenge", hop, scheme);
        outbound.headers_mut().insert(hop.authorization_header(), value);
        ctx.applied.insert(hop);
        if hop == Hop::Proxy {
            ctx.cached_proxy = false;
            ctx.reactive_proxy = Some(scheme);
        }
        true
    }

    fn encode_unprompted(&self, hop: Hop, credentials: &Credentials) -> Option<HeaderValue> {
        let codec = self.schemes.codec_for(credentials.scheme())?;
        match codec.encode(None, credentials) {
            Ok(value) => Some(value),
            Err(err) => {
                log::debug!(
                    "{} {} credentials need a challenge first: {}",
                    hop,
                    credentials.scheme(),
                    err
                );
                None
            }
        }
    }

    fn remember_proxy(&self, request: &Request, ctx: &AttemptContext) {
        if let (Some(scheme), Some(proxy)) = (&ctx.reactive_proxy, request.proxy()) {
            log::debug!(
                "proxy {}:{} accepted {} credentials",
                proxy.host(),
                proxy.port(),
                scheme
            );
            self.cache
                .record(proxy.host(), proxy.port(), scheme, proxy.credentials().digest());
        }
    }

    fn forget_proxy(&self, request: &Request) {
        if let Some(proxy) = request.proxy() {
            log::debug!(
                "proxy {}:{} rejected cached {} credentials",
                proxy.host(),
                proxy.port(),
                proxy.scheme()
            );
            self.cache.invalidate(proxy.host(), proxy.port(), proxy.scheme());
        }
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("schemes", &self.schemes)
            .field("cache", &self.cache)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Parsed challenges, starting with the hop the status names. A `401` only
/// ever concerns the origin; a `407` may carry origin challenges as well.
/// Empty when the named hop offered nothing usable.
fn challenges_by_hop(response: &Response) -> Vec<(Hop, Vec<Challenge>)> {
    let hops: &[Hop] = match response.status() {
        StatusCode::PROXY_AUTHENTICATION_REQUIRED => &Hop::ORDERED,
        StatusCode::UNAUTHORIZED => &[Hop::Origin],
        _ => return Vec::new(),
    };
    let challenges: Vec<_> = hops
        .iter()
        .map(|hop| (*hop, parse_challenges(response.headers(), *hop)))
        .filter(|(_, offered)| !offered.is_empty())
        .collect();

    match challenges.first() {
        Some((hop, _)) if *hop == hops[0] => challenges,
        _ => Vec::new(),
    }
}

fn credentials_for(request: &Request, hop: Hop) -> Option<(&Credentials, Option<&str>)> {
    match hop {
        Hop::Origin => request
            .realm()
            .map(|realm| (realm.credentials(), realm.name())),
        Hop::Proxy => request.proxy().map(|proxy| (proxy.credentials(), None)),
    }
}

/// Applies a [`Negotiator`] to a transport service.
#[derive(Clone, Debug)]
pub struct AuthLayer {
    negotiator: Negotiator,
}

impl AuthLayer {
    pub fn new(negotiator: Negotiator) -> Self {
        AuthLayer { negotiator }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            negotiator: self.negotiator.clone(),
        }
    }
}

/// A transport wrapped with authentication negotiation.
#[derive(Clone, Debug)]
pub struct AuthService<S> {
    inner: S,
    negotiator: Negotiator,
}

impl<S> AuthService<S> {
    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }
}

impl<S> Service<Request> for AuthService<S>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // take the service that was driven to readiness, leave a fresh clone
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let negotiator = self.negotiator.clone();
        Box::pin(async move { negotiator.negotiate(request, &mut inner).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ProxyCredential, Realm};
    use http::header::{AUTHORIZATION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, WWW_AUTHENTICATE};
    use http::Method;

    fn request() -> Request {
        let url = url::Url::parse("http://127.0.0.1:8080/foo").unwrap();
        let mut request = Request::new(Method::GET, url);
        *request.proxy_mut() = Some(ProxyCredential::basic("127.0.0.1", 3128, "johndoe", "pass"));
        request
    }

    fn response(status: u16, headers: &[(http::header::HeaderName, &'static str)]) -> Response {
        let mut builder = http::Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(name, *value);
        }
        Response::from(builder.body(bytes::Bytes::new()).unwrap())
    }

    fn negotiator() -> Negotiator {
        Negotiator::new(Schemes::default(), ProxyCredentialCache::new())
    }

    #[test]
    fn test_prepare_without_preemptive_sends_nothing() {
        let mut req = request();
        *req.realm_mut() = Some(Realm::basic("user", "passwd"));
        let mut ctx = AttemptContext::default();

        let outbound = negotiator().prepare(&req, &mut ctx);
        assert!(!outbound.headers().contains_key(AUTHORIZATION));
        assert!(!outbound.headers().contains_key(PROXY_AUTHORIZATION));
        assert!(ctx.applied.is_empty());
    }

    #[test]
    fn test_prepare_preemptive_origin_only() {
        let mut req = request();
        *req.realm_mut() = Some(Realm::basic("user", "passwd").preemptive(true));
        let mut ctx = AttemptContext::default();

        let outbound = negotiator().prepare(&req, &mut ctx);
        assert_eq!(outbound.headers()[AUTHORIZATION], "Basic dXNlcjpwYXNzd2Q=");
        assert!(!outbound.headers().contains_key(PROXY_AUTHORIZATION));
        // preemptive headers are not answers to a challenge
        assert!(ctx.attempted.is_empty());
    }

    #[test]
    fn test_prepare_uses_cache_only_for_matching_digest() {
        let negotiator = negotiator();
        let req = request();
        let proxy = req.proxy().unwrap().clone();

        let stale = Credentials::new(AuthScheme::Basic, "johndoe", "old").digest();
        negotiator.cache().record("127.0.0.1", 3128, &AuthScheme::Basic, stale);
        let mut ctx = AttemptContext::default();
        let outbound = negotiator.prepare(&req, &mut ctx);
        assert!(!outbound.headers().contains_key(PROXY_AUTHORIZATION));

        negotiator
            .cache()
            .record("127.0.0.1", 3128, &AuthScheme::Basic, proxy.credentials().digest());
        let mut ctx = AttemptContext::default();
        let outbound = negotiator.prepare(&req, &mut ctx);
        assert_eq!(outbound.headers()[PROXY_AUTHORIZATION], "Basic am9obmRvZTpwYXNz");
        assert!(ctx.cached_proxy);
    }

    #[test]
    fn test_challenges_proxy_first() {
        let res = response(
            407,
            &[
                (WWW_AUTHENTICATE, "Basic realm=\"origin\""),
                (PROXY_AUTHENTICATE, "Basic realm=\"proxy\""),
            ],
        );
        let hops: Vec<Hop> = challenges_by_hop(&res).into_iter().map(|(hop, _)| hop).collect();
        assert_eq!(hops, vec![Hop::Proxy, Hop::Origin]);
    }

    #[test]
    fn test_challenges_ignored_outside_401_407() {
        let res = response(200, &[(WWW_AUTHENTICATE, "Basic realm=\"origin\"")]);
        assert!(challenges_by_hop(&res).is_empty());
    }

    #[test]
    fn test_401_only_concerns_origin() {
        let res = response(
            401,
            &[
                (WWW_AUTHENTICATE, "Basic realm=\"origin\""),
                (PROXY_AUTHENTICATE, "Basic realm=\"proxy\""),
            ],
        );
        let hops: Vec<Hop> = challenges_by_hop(&res).into_iter().map(|(hop, _)| hop).collect();
        assert_eq!(hops, vec![Hop::Origin]);
    }

    #[test]
    fn test_407_without_proxy_challenge_is_unusable() {
        let res = response(407, &[(WWW_AUTHENTICATE, "Basic realm=\"origin\"")]);
        assert!(challenges_by_hop(&res).is_empty());
    }

    #[test]
    fn test_answer_skips_unanswerable_origin_on_407() {
        let req = request();
        let negotiator = negotiator();
        let mut ctx = AttemptContext::default();
        let mut outbound = negotiator.prepare(&req, &mut ctx);

        let res = response(
            407,
            &[
                (PROXY_AUTHENTICATE, "Basic realm=\"proxy\""),
                (WWW_AUTHENTICATE, "Basic realm=\"origin\""),
            ],
        );
        assert!(negotiator.answer(&req, &challenges_by_hop(&res), &mut ctx, &mut outbound));
        assert_eq!(outbound.headers()[PROXY_AUTHORIZATION], "Basic am9obmRvZTpwYXNz");
        assert!(!outbound.headers().contains_key(AUTHORIZATION));
    }

    #[test]
    fn test_answer_proxy_adds_origin_unconditionally() {
        let mut req = request();
        *req.realm_mut() = Some(Realm::basic("user", "passwd"));
        let negotiator = negotiator();
        let mut ctx = AttemptContext::default();
        let mut outbound = negotiator.prepare(&req, &mut ctx);

        let res = response(407, &[(PROXY_AUTHENTICATE, "Basic realm=\"Fake Realm\"")]);
        assert!(negotiator.answer(&req, &challenges_by_hop(&res), &mut ctx, &mut outbound));

        assert_eq!(outbound.headers()[PROXY_AUTHORIZATION], "Basic am9obmRvZTpwYXNz");
        assert_eq!(outbound.headers()[AUTHORIZATION], "Basic dXNlcjpwYXNzd2Q=");
        assert!(ctx.attempted.contains(&(Hop::Proxy, AuthScheme::Basic)));
        assert!(ctx.attempted.contains(&(Hop::Origin, AuthScheme::Basic)));
        assert_eq!(ctx.reactive_proxy, Some(AuthScheme::Basic));
    }

    #[test]
    fn test_answer_origin_leaves_proxy_alone() {
        let mut req = request();
        *req.realm_mut() = Some(Realm::basic("user", "passwd"));
        let negotiator = negotiator();
        let mut ctx = AttemptContext::default();
        let mut outbound = negotiator.prepare(&req, &mut ctx);

        let res = response(401, &[(WWW_AUTHENTICATE, "Basic realm=\"Fake Realm\"")]);
        assert!(negotiator.answer(&req, &challenges_by_hop(&res), &mut ctx, &mut outbound));

        assert!(outbound.headers().contains_key(AUTHORIZATION));
        assert!(!outbound.headers().contains_key(PROXY_AUTHORIZATION));
        assert!(ctx.reactive_proxy.is_none());
    }

    #[test]
    fn test_answer_refuses_repeat() {
        let req = request();
        let negotiator = negotiator();
        let mut ctx = AttemptContext::default();
        let mut outbound = negotiator.prepare(&req, &mut ctx);
        let res = response(407, &[(PROXY_AUTHENTICATE, "Basic realm=\"Fake Realm\"")]);
        let challenges = challenges_by_hop(&res);

        assert!(negotiator.answer(&req, &challenges, &mut ctx, &mut outbound));
        assert!(!negotiator.answer(&req, &challenges, &mut ctx, &mut outbound));
    }

    #[test]
    fn test_answer_without_credentials_or_codec() {
        let negotiator = negotiator();

        // origin challenge, no realm configured
        let req = request();
        let mut ctx = AttemptContext::default();
        let mut outbound = req.clone();
        let res = response(401, &[(WWW_AUTHENTICATE, "Basic realm=\"r\"")]);
        assert!(!negotiator.answer(&req, &challenges_by_hop(&res), &mut ctx, &mut outbound));

        // proxy offers only a scheme nobody registered
        let res = response(407, &[(PROXY_AUTHENTICATE, "Digest realm=\"r\", nonce=\"n\"")]);
        assert!(!negotiator.answer(&req, &challenges_by_hop(&res), &mut ctx, &mut outbound));
        assert!(!outbound.headers().contains_key(PROXY_AUTHORIZATION));
    }
}
