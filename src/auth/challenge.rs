// src/auth/challenge.rs

//! Parsing of `WWW-Authenticate` and `Proxy-Authenticate` headers.
//!
//! A header value holds one or more challenges:
//!
//! ```text
//! Basic realm="Fake Realm", Digest realm="x", nonce="abc", qop="auth"
//! ```
//!
//! Every parameter following a scheme belongs to that scheme until the next
//! scheme token. Parsing is lenient: a malformed value yields no challenges
//! instead of an error, and the negotiator treats the hop as unchallenged.

use http::HeaderMap;

use super::{AuthScheme, Hop};

/// A single authentication challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    scheme: AuthScheme,
    realm: Option<String>,
    hop: Hop,
    token: Option<String>,
    params: Vec<(String, String)>,
}

impl Challenge {
    pub fn scheme(&self) -> &AuthScheme {
        &self.scheme
    }

    /// The `realm` parameter, if the challenge carried one.
    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    pub fn hop(&self) -> Hop {
        self.hop
    }

    /// A bare token68 following the scheme, as used by `Negotiate`/`NTLM`.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// All `name=value` parameters in received order, unquoted. Names are
    /// lowercased.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Look up a parameter by name, case-insensitively.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Unknown schemes are preserved but never answered.
    pub fn is_supported(&self) -> bool {
        self.scheme.is_known()
    }
}

/// Extract every challenge addressed to `hop` from a response's headers.
///
/// Reads `WWW-Authenticate` for [`Hop::Origin`] and `Proxy-Authenticate` for
/// [`Hop::Proxy`]. Challenges come back in received order across all header
/// lines. A malformed line contributes nothing; the others still count.
pub fn parse_challenges(headers: &HeaderMap, hop: Hop) -> Vec<Challenge> {
    let mut challenges = Vec::new();

    for value in headers.get_all(hop.challenge_header()) {
        let Ok(value) = value.to_str() else {
            log::debug!("ignoring non-ascii {} challenge", hop);
            continue;
        };
        match parse_value(value, hop) {
            Some(parsed) => challenges.extend(parsed),
            None => log::debug!("ignoring malformed {} challenge: {:?}", hop, value),
        }
    }

    challenges
}

fn parse_value(value: &str, hop: Hop) -> Option<Vec<Challenge>> {
    let mut challenges: Vec<Challenge> = Vec::new();

    for item in split_items(value)? {
        let item = tighten(item.trim());
        let item = item.as_str();
        if item.is_empty() {
            continue;
        }

        // `scheme`, `scheme token68`, `scheme name=value` or `name=value`
        let (head, rest) = match item.find(|c: char| c == ' ' || c == '\t') {
            Some(idx) => (&item[..idx], item[idx..].trim_start()),
            None => (item, ""),
        };

        if head.contains('=') {
            let current = challenges.last_mut()?;
            push_param(current, item)?;
            continue;
        }

        if !is_token(head) {
            return None;
        }

        let mut challenge = Challenge {
            scheme: AuthScheme::from_name(head),
            realm: None,
            hop,
            token: None,
            params: Vec::new(),
        };

        if !rest.is_empty() {
            if is_param(rest) {
                push_param(&mut challenge, rest)?;
            } else if is_token68(rest) {
                challenge.token = Some(rest.to_owned());
            } else {
                return None;
            }
        }

        challenges.push(challenge);
    }

    Some(challenges)
}

fn push_param(challenge: &mut Challenge, item: &str) -> Option<()> {
    let (name, value) = item.split_once('=')?;
    let name = name.trim();
    if name.is_empty() || !is_token(name) {
        return None;
    }
    let value = unquote(value.trim())?;
    let name = name.to_ascii_lowercase();
    if name == "realm" && challenge.realm.is_none() {
        challenge.realm = Some(value.clone());
    }
    challenge.params.push((name, value));
    Some(())
}

/// Split on commas outside quoted strings. `None` on an unterminated quote.
fn split_items(value: &str) -> Option<Vec<&str>> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (idx, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                items.push(&value[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    if in_quotes {
        return None;
    }
    items.push(&value[start..]);
    Some(items)
}

/// Drop the optional whitespace around `=` outside quoted strings, so
/// `realm = "x"` reads like `realm="x"`.
fn tighten(item: &str) -> String {
    let mut out = String::with_capacity(item.len());
    let mut in_quotes = false;
    let mut escaped = false;
    let mut after_eq = false;

    for c in item.chars() {
        if in_quotes {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        match c {
            '=' => {
                out.truncate(out.trim_end().len());
                out.push(c);
                after_eq = true;
            }
            ' ' | '\t' if after_eq => {}
            _ => {
                in_quotes = c == '"';
                after_eq = false;
                out.push(c);
            }
        }
    }
    out
}

fn unquote(value: &str) -> Option<String> {
    let Some(inner) = value.strip_prefix('"') else {
        return if value.contains('"') {
            None
        } else {
            Some(value.to_owned())
        };
    };
    let inner = inner.strip_suffix('"')?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?),
            '"' => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

// `abc==` is token68 padding, not a parameter with an empty value
fn is_param(s: &str) -> bool {
    match s.split_once('=') {
        Some((name, value)) => {
            let value = value.trim();
            is_token(name.trim()) && !value.is_empty() && !value.starts_with('=')
        }
        None => false,
    }
}

// RFC 7230 tchar
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}

// RFC 7235 token68
fn is_token68(s: &str) -> bool {
    let body = s.trim_end_matches('=');
    !body.is_empty()
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b'+' | b'/'))
}
