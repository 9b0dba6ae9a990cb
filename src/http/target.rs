//! Request-target parsing.
//!
//! Three forms reach a forward proxy:
//! - absolute-form `http://host[:port]/path?query#fragment` (plain proxying)
//! - authority-form `host:port` (CONNECT)
//! - origin-form `/path?query`, whose host comes from the `Host` header
//!
//! The raw string is kept verbatim; it is the cache key.

use std::fmt;

use url::Url;

use crate::config::HostPort;

/// The only absolute-form scheme a plain HTTP forward proxy can serve.
const SCHEME_PREFIX: &str = "http://";

/// A parsed request-target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    raw: String,
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl RequestTarget {
    /// Parse `raw` as sent with `method`.
    ///
    /// An empty host is allowed for origin-form; the caller fills it in from
    /// the `Host` header.
    pub fn parse(raw: &str, method: &str) -> Result<Self, String> {
        if raw.is_empty() {
            return Err("empty target".to_string());
        }

        if method == "CONNECT" {
            // A non-special scheme keeps every explicit port, including 80 and 443.
            let url = Url::parse(&format!("connect://{}", raw)).map_err(|e| e.to_string())?;
            let host = url.host_str().unwrap_or_default();
            if host.is_empty() || !matches!(url.path(), "" | "/") {
                return Err("expected host:port".to_string());
            }
            return Ok(Self {
                raw: raw.to_string(),
                scheme: String::new(),
                host: host.to_string(),
                port: url.port(),
                path: String::new(),
                query: None,
                fragment: None,
            });
        }

        if raw.starts_with('/') {
            if !raw.bytes().all(|b| b.is_ascii_graphic()) {
                return Err("invalid character in path".to_string());
            }
            let (path, query, fragment) = split_tail(raw);
            return Ok(Self {
                raw: raw.to_string(),
                scheme: "http".to_string(),
                host: String::new(),
                port: None,
                path: path.to_string(),
                query: query.map(str::to_string),
                fragment: fragment.map(str::to_string),
            });
        }

        let url = Url::parse(raw).map_err(|e| e.to_string())?;
        if url.scheme() != "http" {
            return Err(format!("unsupported scheme {}", url.scheme()));
        }
        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err("missing host".to_string()),
        };

        // Everything but the host is taken from the received text, so the
        // origin sees the path as the client wrote it.
        let rest = raw
            .get(..SCHEME_PREFIX.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(SCHEME_PREFIX))
            .map(|_| &raw[SCHEME_PREFIX.len()..])
            .ok_or_else(|| format!("expected {}host", SCHEME_PREFIX))?;
        let authority_end = rest.find(|c: char| matches!(c, '/' | '?' | '#')).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(authority_end);
        let (path, query, fragment) = split_tail(tail);

        Ok(Self {
            raw: raw.to_string(),
            scheme: url.scheme().to_string(),
            host,
            port: explicit_port(authority)?,
            path: path.to_string(),
            query: query.map(str::to_string),
            fragment: fragment.map(str::to_string),
        })
    }

    /// The target exactly as it appeared on the request line.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn has_host(&self) -> bool {
        !self.host.is_empty()
    }

    /// Host and port, falling back to `default_port`.
    pub fn authority(&self, default_port: u16) -> HostPort {
        HostPort::new(self.host.clone(), self.port.unwrap_or(default_port))
    }

    /// Point the target at a different host and port.
    pub fn set_authority(&mut self, authority: &HostPort) {
        self.host = authority.host.clone();
        self.port = Some(authority.port);
    }

    /// Fill in the host from a `Host` header value (`host[:port]`).
    pub fn set_host_header(&mut self, value: &str) {
        let value = value.trim();
        match value.rsplit_once(':') {
            Some((host, port)) if port.parse::<u16>().is_ok() => {
                self.host = host.to_string();
                self.port = port.parse().ok();
            }
            _ => {
                self.host = value.to_string();
                self.port = None;
            }
        }
    }

    /// `path[?query][#fragment]`, as written on the wire to an origin.
    pub fn origin_form(&self) -> String {
        let mut out = if self.path.is_empty() {
            "/".to_string()
        } else {
            self.path.clone()
        };
        if let Some(query) = &self.query {
            out.push('?');
            out.push_str(query);
        }
        if let Some(fragment) = &self.fragment {
            out.push('#');
            out.push_str(fragment);
        }
        out
    }
}

/// Split `path[?query][#fragment]`.
fn split_tail(tail: &str) -> (&str, Option<&str>, Option<&str>) {
    let (rest, fragment) = match tail.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (tail, None),
    };
    match rest.split_once('?') {
        Some((path, query)) => (path, Some(query), fragment),
        None => (rest, None, fragment),
    }
}

/// The port written in `[userinfo@]host[:port]`, if any.
fn explicit_port(authority: &str) -> Result<Option<u16>, String> {
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host_port)| host_port);
    let port = match host_port.rfind(':') {
        // A colon inside `[...]` belongs to an IPv6 literal.
        Some(i) if !host_port[i..].contains(']') => &host_port[i + 1..],
        _ => "",
    };
    if port.is_empty() {
        return Ok(None);
    }
    port.parse::<u16>()
        .map(Some)
        .map_err(|_| format!("invalid port {}", port))
}

impl fmt::Display for RequestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scheme.is_empty() {
            return match self.port {
                Some(port) => write!(f, "{}:{}", self.host, port),
                None => write!(f, "{}", self.host),
            };
        }
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "{}", self.origin_form())
    }
}
