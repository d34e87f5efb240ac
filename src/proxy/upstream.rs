//! Upstream (backend) address handling.

use std::fmt;
use std::str::FromStr;

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::Uri;
use url::Url;

/// Error type for upstream parsing.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("'{0}' is not a valid upstream address")]
    Invalid(String),
    #[error("unsupported upstream scheme '{0}', only http is proxied")]
    Scheme(String),
}

/// The backend server requests are forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    host: String,
    port: u16,
    authority: Authority,
}

impl Upstream {
    /// Parse `host:port` or `http://host:port`. A missing port means 80.
    pub fn parse(raw: &str) -> Result<Self, UpstreamError> {
        let trimmed = raw.trim();
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };

        let url = Url::parse(&with_scheme).map_err(|_| UpstreamError::Invalid(raw.to_string()))?;
        if url.scheme() != "http" {
            return Err(UpstreamError::Scheme(url.scheme().to_string()));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| UpstreamError::Invalid(raw.to_string()))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| UpstreamError::Invalid(raw.to_string()))?;
        let authority = Authority::from_str(&format!("{host}:{port}"))
            .map_err(|_| UpstreamError::Invalid(raw.to_string()))?;

        Ok(Self {
            host,
            port,
            authority,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Rewrite an incoming request URI to target this upstream, keeping the
    /// path and query.
    pub fn rewrite(&self, uri: &Uri) -> Uri {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(Scheme::HTTP);
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}", self.authority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_host_port() {
        let upstream = Upstream::parse("localhost:5000").unwrap();
        assert_eq!(upstream.host(), "localhost");
        assert_eq!(upstream.port(), 5000);
        assert_eq!(upstream.to_string(), "http://localhost:5000");
    }

    #[test]
    fn test_parse_with_scheme_and_default_port() {
        let upstream = Upstream::parse("http://127.0.0.1").unwrap();
        assert_eq!(upstream.port(), 80);
        assert_eq!(upstream.authority().as_str(), "127.0.0.1:80");
    }

    #[test]
    fn test_rejects_https_and_garbage() {
        assert!(matches!(
            Upstream::parse("https://localhost:5000"),
            Err(UpstreamError::Scheme(_))
        ));
        assert!(Upstream::parse("http://").is_err());
        assert!(Upstream::parse("local host:5000").is_err());
    }

    #[test]
    fn test_rewrite_keeps_path_and_query() {
        let upstream = Upstream::parse("localhost:5000").unwrap();
        let uri: Uri = "/static/app.css?v=3".parse().unwrap();
        assert_eq!(
            upstream.rewrite(&uri).to_string(),
            "http://localhost:5000/static/app.css?v=3"
        );
    }
}
