//! Accumulate URLs.
//!
//! Every record in the ledger is addressed by an `acc://` URL. The lowercased
//! authority hashes to the identity chain, authority plus path to the
//! resource chain, and the first eight bytes of the identity chain select the
//! subnet that owns the account.

use core::fmt;

use url::Url as NetUrl;

use crate::hash::{sha256, Hash256};

/// Error returned when a string cannot be parsed as an Accumulate URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("wrong scheme")]
    WrongScheme,

    #[error("missing host")]
    MissingHost,

    #[error("invalid url: {0}")]
    Invalid(String),
}

/// An Accumulate URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Url {
    user_info: String,
    authority: String,
    path: String,
    query: String,
    fragment: String,
}

fn split_colon(s: &str) -> (&str, &str) {
    match s.split_once(':') {
        Some((a, b)) => (a, b),
        None => (s, ""),
    }
}

fn ensure_path(s: &str) -> String {
    if s.is_empty() || s.starts_with('/') {
        s.to_string()
    } else {
        format!("/{s}")
    }
}

fn chain(s: &str) -> Hash256 {
    Hash256::new(sha256(s.to_lowercase()))
}

impl Url {
    /// Parses the string as an Accumulate URL. The scheme may be omitted, in
    /// which case `acc://` is assumed, but if present it must be `acc`. The
    /// authority must be non-empty.
    pub fn parse(s: &str) -> Result<Self, UrlError> {
        let parsed = match NetUrl::parse(s) {
            Ok(u) => u,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                match NetUrl::parse(&format!("acc://{s}")) {
                    Ok(u) => u,
                    Err(url::ParseError::EmptyHost) => return Err(UrlError::MissingHost),
                    Err(e) => return Err(UrlError::Invalid(e.to_string())),
                }
            }
            Err(url::ParseError::EmptyHost) => return Err(UrlError::MissingHost),
            Err(e) => return Err(UrlError::Invalid(e.to_string())),
        };

        if parsed.scheme() != "acc" {
            return Err(UrlError::WrongScheme);
        }

        let host = parsed.host_str().unwrap_or("");
        if host.is_empty() {
            return Err(UrlError::MissingHost);
        }

        let mut authority = host.to_string();
        if let Some(port) = parsed.port() {
            authority.push(':');
            authority.push_str(&port.to_string());
        }

        let mut user_info = parsed.username().to_string();
        if let Some(pw) = parsed.password() {
            user_info.push(':');
            user_info.push_str(pw);
        }

        Ok(Self {
            user_info,
            authority,
            path: parsed.path().to_string(),
            query: parsed.query().unwrap_or("").to_string(),
            fragment: parsed.fragment().unwrap_or("").to_string(),
        })
    }

    /// The authority component, `host[:port]`.
    #[inline]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// The path component. Empty or beginning with `/`.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The query component, without the leading `?`.
    #[inline]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The hostname from the authority component, without the port.
    #[inline]
    pub fn hostname(&self) -> &str {
        split_colon(&self.authority).0
    }

    /// The port from the authority component, if any.
    #[inline]
    pub fn port(&self) -> &str {
        split_colon(&self.authority).1
    }

    /// Concatenates the URL parts without re-encoding. Primarily used for
    /// validation checks.
    pub fn raw_string(&self) -> String {
        let mut s = String::from("acc://");
        if !self.user_info.is_empty() {
            s.push_str(&self.user_info);
            s.push('@');
        }
        s.push_str(&self.authority);
        s.push_str(&self.path);
        if !self.query.is_empty() {
            s.push('?');
            s.push_str(&self.query);
        }
        if !self.fragment.is_empty() {
            s.push('#');
            s.push_str(&self.fragment);
        }
        s
    }

    /// Parses the query component into key/value pairs. Malformed pairs are
    /// silently discarded.
    pub fn query_values(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Returns the first value for the given query key, if present.
    pub fn query_value(&self, key: &str) -> Option<String> {
        self.query_values()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns a copy of the URL with an empty path.
    pub fn identity(&self) -> Self {
        let mut v = self.clone();
        v.path = String::new();
        v
    }

    /// Reports whether this URL is its own identity (the path is empty).
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.path.is_empty()
    }

    /// Returns a copy of the URL with additional POSIX-joined path elements.
    pub fn join_path<S: AsRef<str>>(&self, parts: &[S]) -> Self {
        let absolute = self.path.starts_with('/');
        let mut segments: Vec<&str> = Vec::new();
        let all = core::iter::once(self.path.as_str()).chain(parts.iter().map(|p| p.as_ref()));
        for part in all {
            for seg in part.split('/') {
                match seg {
                    "" | "." => {}
                    ".." => {
                        segments.pop();
                    }
                    seg => segments.push(seg),
                }
            }
        }
        let joined = segments.join("/");
        let mut v = self.clone();
        v.path = if absolute && !joined.is_empty() {
            format!("/{joined}")
        } else {
            joined
        };
        v
    }

    /// The identity chain id: `sha256(lowercase(hostname))`. The port is not
    /// included.
    pub fn identity_chain(&self) -> Hash256 {
        chain(self.hostname())
    }

    /// The resource chain id: `sha256(lowercase(hostname + path))`, with a
    /// `/` inserted when the path does not begin with one. An empty path
    /// yields the identity chain.
    pub fn resource_chain(&self) -> Hash256 {
        chain(&format!("{}{}", self.hostname(), ensure_path(&self.path)))
    }

    /// The first eight bytes of the identity chain as a big-endian integer.
    /// Selects the subnet that owns this account.
    pub fn routing(&self) -> u64 {
        let id = self.identity_chain();
        u64::from_be_bytes(id.as_slice()[..8].try_into().expect("8-byte prefix"))
    }

    /// Reports whether the two URLs are equal under case-folding of their
    /// string forms.
    pub fn eq_fold(&self, other: &Self) -> bool {
        self.to_string().to_lowercase() == other.to_string().to_lowercase()
    }

    /// For a lite (anonymous) account URL, the 20-byte key digest embedded in
    /// the authority: exactly forty hex characters.
    pub fn lite_key_hash(&self) -> Option<[u8; 20]> {
        let host = self.hostname();
        if host.len() != 40 {
            return None;
        }
        let bytes = hex::decode(host).ok()?;
        let mut digest = [0u8; 20];
        digest.copy_from_slice(&bytes);
        Some(digest)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_string())
    }
}

impl core::str::FromStr for Url {
    type Err = UrlError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_and_without_scheme() {
        let a = Url::parse("acc://alice/tokens").unwrap();
        let b = Url::parse("alice/tokens").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.authority(), "alice");
        assert_eq!(a.path(), "/tokens");
    }

    #[test]
    fn parse_rejects_wrong_scheme() {
        assert_eq!(
            Url::parse("http://alice").unwrap_err(),
            UrlError::WrongScheme
        );
    }

    #[test]
    fn parse_rejects_missing_host() {
        assert_eq!(Url::parse("acc://").unwrap_err(), UrlError::MissingHost);
    }

    #[test]
    fn string_round_trip() {
        for s in ["acc://alice", "acc://alice/tokens", "acc://alice/a/b?x=1#f"] {
            let u = Url::parse(s).unwrap();
            let reparsed = Url::parse(&u.to_string()).unwrap();
            assert_eq!(u, reparsed);
            assert_eq!(u.to_string(), reparsed.to_string());
        }
    }

    #[test]
    fn empty_path_resource_chain_equals_identity_chain() {
        let u = Url::parse("acc://alice").unwrap();
        assert_eq!(u.resource_chain(), u.identity_chain());
    }

    #[test]
    fn resource_chain_includes_path() {
        let id = Url::parse("acc://alice").unwrap();
        let res = Url::parse("acc://alice/tokens").unwrap();
        assert_eq!(id.identity_chain(), res.identity_chain());
        assert_ne!(res.resource_chain(), res.identity_chain());
    }

    #[test]
    fn chains_are_case_insensitive() {
        let a = Url::parse("acc://Alice/Tokens").unwrap();
        let b = Url::parse("acc://alice/tokens").unwrap();
        assert_eq!(a.identity_chain(), b.identity_chain());
        assert_eq!(a.resource_chain(), b.resource_chain());
        assert_eq!(a.routing(), b.routing());
    }

    #[test]
    fn routing_ignores_path_and_query() {
        let a = Url::parse("acc://alice").unwrap();
        let b = Url::parse("acc://alice/tokens?x=1").unwrap();
        assert_eq!(a.routing(), b.routing());
        assert_eq!(
            a.routing(),
            u64::from_be_bytes(a.identity_chain().as_slice()[..8].try_into().unwrap())
        );
    }

    #[test]
    fn identity_clears_path() {
        let u = Url::parse("acc://alice/tokens").unwrap();
        let id = u.identity();
        assert_eq!(id.path(), "");
        assert!(id.is_identity());
        assert_eq!(id.authority(), "alice");
    }

    #[test]
    fn join_path_behaves_like_posix_join() {
        let root = Url::parse("acc://alice").unwrap();
        assert_eq!(root.join_path(&["ssg0"]).path(), "ssg0");
        let deep = Url::parse("acc://alice/a").unwrap();
        assert_eq!(deep.join_path(&["b", "c"]).path(), "/a/b/c");
        assert_eq!(deep.join_path(&["..", "x"]).path(), "/x");
    }

    #[test]
    fn joined_path_resource_chain_matches_explicit() {
        let joined = Url::parse("acc://alice").unwrap().join_path(&["ssg0"]);
        let explicit = Url::parse("acc://alice/ssg0").unwrap();
        assert_eq!(joined.resource_chain(), explicit.resource_chain());
    }

    #[test]
    fn eq_fold_ignores_case() {
        let a = Url::parse("acc://Alice/Tokens").unwrap();
        let b = Url::parse("acc://alice/tokens").unwrap();
        assert!(a.eq_fold(&b));
    }

    #[test]
    fn query_values_dispatch() {
        let u = Url::parse("acc://alice?txid=abcd12").unwrap();
        assert_eq!(u.query_value("txid").unwrap(), "abcd12");
        assert!(u.query_value("other").is_none());
    }

    #[test]
    fn lite_key_hash_requires_forty_hex_chars() {
        let digest = [0xabu8; 20];
        let u = Url::parse(&format!("acc://{}", hex::encode(digest))).unwrap();
        assert_eq!(u.lite_key_hash().unwrap(), digest);

        assert!(Url::parse("acc://alice").unwrap().lite_key_hash().is_none());
    }
}
