// src/auth/mod.rs

//! Origin and proxy authentication.
//!
//! Two credential scopes are negotiated over one logical request: the origin
//! server's [`Realm`] and the forward proxy's [`ProxyCredential`]. Each scope
//! is bound to a [`Hop`], and a hop only ever produces its own header:
//! `Authorization` for the origin, `Proxy-Authorization` for the proxy.

pub mod basic;
pub mod cache;
pub mod challenge;
pub(crate) mod negotiate;
pub mod scheme;

pub use self::cache::{CredentialDigest, ProxyCredentialCache};
pub use self::challenge::{parse_challenges, Challenge};
pub use self::negotiate::{AuthLayer, AuthService, Negotiator};
pub use self::scheme::{BasicCodec, SchemeCodec, Schemes};

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::OnceLock;

use http::header::{
    HeaderName, AUTHORIZATION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, WWW_AUTHENTICATE,
};
use http::StatusCode;

/// The party a challenge or credential applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hop {
    /// The origin server, challenging with `401` and `WWW-Authenticate`.
    Origin,
    /// The forward proxy, challenging with `407` and `Proxy-Authenticate`.
    Proxy,
}

impl Hop {
    /// Hops in resolution order. Proxies are traversed before the origin.
    pub(crate) const ORDERED: [Hop; 2] = [Hop::Proxy, Hop::Origin];

    /// The response header carrying this hop's challenges.
    pub fn challenge_header(self) -> HeaderName {
        match self {
            Hop::Origin => WWW_AUTHENTICATE,
            Hop::Proxy => PROXY_AUTHENTICATE,
        }
    }

    /// The request header carrying this hop's credentials.
    pub fn authorization_header(self) -> HeaderName {
        match self {
            Hop::Origin => AUTHORIZATION,
            Hop::Proxy => PROXY_AUTHORIZATION,
        }
    }

    /// The status code this hop challenges with.
    pub fn status(self) -> StatusCode {
        match self {
            Hop::Origin => StatusCode::UNAUTHORIZED,
            Hop::Proxy => StatusCode::PROXY_AUTHENTICATION_REQUIRED,
        }
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hop::Origin => f.write_str("origin"),
            Hop::Proxy => f.write_str("proxy"),
        }
    }
}

/// An HTTP authentication scheme identifier.
///
/// Well-known schemes are matched case-insensitively; anything else is kept
/// verbatim in [`AuthScheme::Other`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    Basic,
    Digest,
    Ntlm,
    Negotiate,
    Other(String),
}

impl AuthScheme {
    pub fn from_name(name: &str) -> AuthScheme {
        if name.eq_ignore_ascii_case("basic") {
            AuthScheme::Basic
        } else if name.eq_ignore_ascii_case("digest") {
            AuthScheme::Digest
        } else if name.eq_ignore_ascii_case("ntlm") {
            AuthScheme::Ntlm
        } else if name.eq_ignore_ascii_case("negotiate") {
            AuthScheme::Negotiate
        } else {
            AuthScheme::Other(name.to_owned())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AuthScheme::Basic => "Basic",
            AuthScheme::Digest => "Digest",
            AuthScheme::Ntlm => "NTLM",
            AuthScheme::Negotiate => "Negotiate",
            AuthScheme::Other(name) => name,
        }
    }

    /// Returns `true` for schemes this crate knows by name.
    pub fn is_known(&self) -> bool {
        !matches!(self, AuthScheme::Other(_))
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A principal and secret bound to an authentication scheme.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    principal: String,
    secret: String,
    scheme: AuthScheme,
}

impl Credentials {
    pub fn new(
        scheme: AuthScheme,
        principal: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Credentials {
            principal: principal.into(),
            secret: secret.into(),
            scheme,
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn scheme(&self) -> &AuthScheme {
        &self.scheme
    }

    /// A fingerprint of these credentials, used as the proxy cache value in
    /// place of the secret.
    ///
    /// The hash is keyed with a random key chosen once per process, so
    /// digests compare equal within a process but are meaningless outside
    /// it, and cannot be checked against guessed passwords without the key.
    /// It is still a 64-bit fingerprint, not a password hash.
    pub fn digest(&self) -> CredentialDigest {
        static KEY: OnceLock<RandomState> = OnceLock::new();

        let mut hasher = KEY.get_or_init(RandomState::new).build_hasher();
        self.scheme.hash(&mut hasher);
        self.principal.hash(&mut hasher);
        self.secret.hash(&mut hasher);
        CredentialDigest::new(hasher.finish())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("principal", &self.principal)
            .field("secret", &"<redacted>")
            .field("scheme", &self.scheme)
            .finish()
    }
}

/// Origin server credentials and their preemptive-send policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Realm {
    credentials: Credentials,
    realm_name: Option<String>,
    preemptive: bool,
}

impl Realm {
    pub fn new(
        scheme: AuthScheme,
        principal: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Realm {
            credentials: Credentials::new(scheme, principal, secret),
            realm_name: None,
            preemptive: false,
        }
    }

    /// Shorthand for a non-preemptive Basic realm.
    pub fn basic(principal: impl Into<String>, secret: impl Into<String>) -> Self {
        Realm::new(AuthScheme::Basic, principal, secret)
    }

    /// Send `Authorization` on the very first attempt, before any challenge.
    pub fn preemptive(mut self, preemptive: bool) -> Self {
        self.preemptive = preemptive;
        self
    }

    /// Only answer origin challenges that name this realm (or none at all).
    pub fn realm_name(mut self, name: impl Into<String>) -> Self {
        self.realm_name = Some(name.into());
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn principal(&self) -> &str {
        self.credentials.principal()
    }

    pub fn secret(&self) -> &str {
        self.credentials.secret()
    }

    pub fn scheme(&self) -> &AuthScheme {
        self.credentials.scheme()
    }

    pub fn name(&self) -> Option<&str> {
        self.realm_name.as_deref()
    }

    pub fn is_preemptive(&self) -> bool {
        self.preemptive
    }
}

/// A forward proxy endpoint together with the credentials it expects.
///
/// Proxy credentials are always applied reactively, unless the client's
/// [`ProxyCredentialCache`] remembers this proxy accepting them before.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyCredential {
    host: String,
    port: u16,
    credentials: Credentials,
}

impl ProxyCredential {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        scheme: AuthScheme,
        principal: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        ProxyCredential {
            host: host.into(),
            port,
            credentials: Credentials::new(scheme, principal, secret),
        }
    }

    /// Shorthand for a proxy answering Basic challenges.
    pub fn basic(
        host: impl Into<String>,
        port: u16,
        principal: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        ProxyCredential::new(host, port, AuthScheme::Basic, principal, secret)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn principal(&self) -> &str {
        self.credentials.principal()
    }

    pub fn secret(&self) -> &str {
        self.credentials.secret()
    }

    pub fn scheme(&self) -> &AuthScheme {
        self.credentials.scheme()
    }
}
