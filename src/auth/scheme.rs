// src/auth/scheme.rs

//! Pluggable authentication schemes.
//!
//! A [`SchemeCodec`] turns a challenge and a set of credentials into the
//! value of an `Authorization` or `Proxy-Authorization` header. The
//! negotiator never knows which scheme it is speaking; it asks the
//! [`Schemes`] registry for the first challenge it can answer.

use std::fmt;
use std::sync::Arc;

use http::HeaderValue;

use super::{basic, AuthScheme, Challenge, Credentials};
use crate::error;
use crate::Result;

/// Capability interface for one authentication scheme.
pub trait SchemeCodec: fmt::Debug + Send + Sync {
    /// Returns true if this codec speaks `scheme`.
    fn matches(&self, scheme: &AuthScheme) -> bool;

    /// Produce a header value for `credentials`.
    ///
    /// `challenge` is `None` when credentials are sent preemptively, before
    /// the server said anything. Codecs that cannot work without a challenge
    /// (Digest needs a nonce) should return an error there; the negotiator
    /// then skips the preemptive header.
    fn encode(&self, challenge: Option<&Challenge>, credentials: &Credentials) -> Result<HeaderValue>;
}

/// The `Basic` scheme. Stateless; the challenge is ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicCodec;

impl SchemeCodec for BasicCodec {
    fn matches(&self, scheme: &AuthScheme) -> bool {
        *scheme == AuthScheme::Basic
    }

    fn encode(&self, _challenge: Option<&Challenge>, credentials: &Credentials) -> Result<HeaderValue> {
        if credentials.principal().contains(':') {
            return Err(error::auth("Basic principal must not contain ':'"));
        }
        Ok(basic::encode(credentials.principal(), credentials.secret()))
    }
}

/// The registered set of scheme codecs.
#[derive(Clone, Debug)]
pub struct Schemes {
    codecs: Vec<Arc<dyn SchemeCodec>>,
}

impl Schemes {
    /// A registry with no codecs at all; every challenge is unsatisfiable.
    pub fn empty() -> Self {
        Schemes { codecs: Vec::new() }
    }

    /// Add a codec. Earlier registrations win when two codecs match the
    /// same scheme.
    pub fn register<C>(&mut self, codec: C) -> &mut Self
    where
        C: SchemeCodec + 'static,
    {
        self.codecs.push(Arc::new(codec));
        self
    }

    /// The codec for `scheme`, if one is registered.
    pub fn codec_for(&self, scheme: &AuthScheme) -> Option<&dyn SchemeCodec> {
        self.codecs
            .iter()
            .find(|codec| codec.matches(scheme))
            .map(|codec| &**codec)
    }

    /// Pick the first challenge, in received order, that a registered codec
    /// can answer with `credentials`.
    ///
    /// A challenge qualifies when its scheme is known, equals the
    /// credentials' scheme, has a codec, and, if `realm_name` is given,
    /// either names no realm or names that one.
    pub fn select<'c>(
        &self,
        challenges: &'c [Challenge],
        credentials: &Credentials,
        realm_name: Option<&str>,
    ) -> Option<(&'c Challenge, &dyn SchemeCodec)> {
        challenges
            .iter()
            .filter(|challenge| challenge.is_supported())
            .filter(|challenge| challenge.scheme() == credentials.scheme())
            .filter(|challenge| match (realm_name, challenge.realm()) {
                (Some(wanted), Some(offered)) => wanted == offered,
                _ => true,
            })
            .find_map(|challenge| {
                self.codec_for(challenge.scheme())
                    .map(|codec| (challenge, codec))
            })
    }
}

impl Default for Schemes {
    /// Basic only.
    fn default() -> Self {
        let mut schemes = Schemes::empty();
        schemes.register(BasicCodec);
        schemes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{parse_challenges, Hop};
    use http::header::WWW_AUTHENTICATE;
    use http::HeaderMap;

    fn challenges(values: &[&'static str]) -> Vec<Challenge> {
        let mut headers = HeaderMap::new();
        for value in values {
            headers.append(WWW_AUTHENTICATE, HeaderValue::from_static(value));
        }
        parse_challenges(&headers, Hop::Origin)
    }

    #[derive(Debug)]
    struct Refuses;

    impl SchemeCodec for Refuses {
        fn matches(&self, scheme: &AuthScheme) -> bool {
            *scheme == AuthScheme::Digest
        }

        fn encode(&self, challenge: Option<&Challenge>, _: &Credentials) -> Result<HeaderValue> {
            match challenge {
                Some(_) => Ok(HeaderValue::from_static("Digest stub")),
                None => Err(error::auth("digest needs a nonce")),
            }
        }
    }

    #[test]
    fn test_basic_codec() {
        let creds = Credentials::new(AuthScheme::Basic, "johndoe", "pass");
        let value = BasicCodec.encode(None, &creds).unwrap();
        assert_eq!(value, "Basic am9obmRvZTpwYXNz");
        assert!(BasicCodec.matches(&AuthScheme::Basic));
        assert!(!BasicCodec.matches(&AuthScheme::Digest));
    }

    #[test]
    fn test_basic_rejects_colon_in_principal() {
        let creds = Credentials::new(AuthScheme::Basic, "a:b", "pass");
        let err = BasicCodec.encode(None, &creds).unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn test_select_first_supported_in_order() {
        let creds = Credentials::new(AuthScheme::Basic, "user", "passwd");
        let offered = challenges(&["Negotiate", "Mutual realm=\"m\"", "Basic realm=\"one\"", "Basic realm=\"two\""]);

        let schemes = Schemes::default();
        let (challenge, codec) = schemes.select(&offered, &creds, None).unwrap();
        assert_eq!(challenge.realm(), Some("one"));
        assert!(codec.matches(&AuthScheme::Basic));
    }

    #[test]
    fn test_select_requires_registered_codec() {
        let creds = Credentials::new(AuthScheme::Digest, "user", "passwd");
        let offered = challenges(&["Digest realm=\"d\", nonce=\"n\""]);

        assert!(Schemes::default().select(&offered, &creds, None).is_none());

        let mut schemes = Schemes::default();
        schemes.register(Refuses);
        let (challenge, codec) = schemes.select(&offered, &creds, None).unwrap();
        assert_eq!(challenge.param("nonce"), Some("n"));
        assert!(codec.encode(None, &creds).is_err());
        assert_eq!(codec.encode(Some(challenge), &creds).unwrap(), "Digest stub");
    }

    #[test]
    fn test_select_requires_matching_scheme() {
        let creds = Credentials::new(AuthScheme::Basic, "user", "passwd");
        let offered = challenges(&["Digest realm=\"d\", nonce=\"n\""]);

        let mut schemes = Schemes::default();
        schemes.register(Refuses);
        assert!(schemes.select(&offered, &creds, None).is_none());
    }

    #[test]
    fn test_select_filters_realm_name() {
        let creds = Credentials::new(AuthScheme::Basic, "user", "passwd");
        let offered = challenges(&["Basic realm=\"other\"", "Basic realm=\"Fake Realm\""]);
        let schemes = Schemes::default();

        let (challenge, _) = schemes.select(&offered, &creds, Some("Fake Realm")).unwrap();
        assert_eq!(challenge.realm(), Some("Fake Realm"));
        assert!(schemes.select(&offered, &creds, Some("missing")).is_none());

        let unnamed = challenges(&["Basic"]);
        assert!(schemes.select(&unnamed, &creds, Some("Fake Realm")).is_some());
    }

    #[test]
    fn test_empty_registry() {
        let creds = Credentials::new(AuthScheme::Basic, "user", "passwd");
        let offered = challenges(&["Basic realm=\"x\""]);
        assert!(Schemes::empty().select(&offered, &creds, None).is_none());
        assert!(Schemes::empty().codec_for(&AuthScheme::Basic).is_none());
    }
}
