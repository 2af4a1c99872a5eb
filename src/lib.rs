#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # hopauth
//!
//! Origin and proxy authentication for HTTP requests.
//!
//! A single request can be challenged twice: by a forward proxy with
//! `407 Proxy Authentication Required` and by the origin server with
//! `401 Unauthorized`. `hopauth` keeps the two apart. Origin credentials
//! live in a [`Realm`](auth::Realm) and only ever become `Authorization`;
//! proxy credentials live in a [`ProxyCredential`](auth::ProxyCredential)
//! and only ever become `Proxy-Authorization`.
//!
//! ```no_run
//! use hopauth::auth::{ProxyCredential, Realm};
//!
//! # async fn run() -> hopauth::Result<()> {
//! let client = hopauth::Client::new();
//!
//! let res = client
//!     .get("http://127.0.0.1:8080/foo")
//!     .realm(Realm::basic("user", "passwd"))
//!     .proxy(ProxyCredential::basic("127.0.0.1", 3128, "johndoe", "pass"))
//!     .send()
//!     .await?;
//!
//! println!("{}", res.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Retries
//!
//! Each challenge round folds every answerable header into one retry. A
//! request that meets both a proxy and an origin challenge therefore costs
//! three attempts. The number of retries is bounded by
//! [`ClientBuilder::max_auth_retries`], and a credential that was already
//! rejected is never sent again. When negotiation cannot go further the
//! last `401` or `407` is returned as a normal [`Response`].
//!
//! ## Proxy credential cache
//!
//! Once a proxy accepts a credential, later requests to the same proxy send
//! `Proxy-Authorization` on the first attempt. A cached entry is dropped as
//! soon as the proxy rejects it.
//!
//! ## Transports
//!
//! With the default `transport` feature, [`HttpTransport`] speaks HTTP/1.1
//! over hyper. Any `tower::Service<Request, Response = Response, Error =
//! Error>` can stand in for it via [`ClientBuilder::transport`], and the
//! negotiator is also available as a tower layer,
//! [`AuthLayer`](auth::AuthLayer).
//!
//! ## Optional Features
//!
//! - **transport** *(enabled by default)*: the hyper-based `HttpTransport`.

pub use http::header;
pub use http::Method;
pub use http::{StatusCode, Version};
pub use url::Url;

pub use self::client::{Client, ClientBuilder};
pub use self::error::{Error, Result};
pub use self::into_url::IntoUrl;
pub use self::request::{Request, RequestBuilder};
pub use self::response::Response;
#[cfg(feature = "transport")]
pub use self::transport::HttpTransport;

pub mod auth;
mod client;
mod error;
mod into_url;
mod request;
mod response;
#[cfg(feature = "transport")]
mod transport;

fn _assert_impls() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    fn assert_clone<T: Clone>() {}

    assert_send::<Client>();
    assert_sync::<Client>();
    assert_clone::<Client>();

    assert_send::<Request>();
    assert_send::<RequestBuilder>();
    assert_send::<Response>();

    assert_send::<Error>();
    assert_sync::<Error>();

    assert_send::<auth::ProxyCredentialCache>();
    assert_sync::<auth::ProxyCredentialCache>();
}
