//! Redirect resolution for stream URLs.
//!
//! Many stations publish a URL that only redirects to the real stream (a load
//! balancer, a tokenised proxy, an http -> https hop). External players cope
//! with this badly, so the final URL is worked out before playback starts.
//!
//! Every hop opens its own connection through a [`Transport`]. A connection is
//! closed when its handle is dropped, which happens on every exit path.

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::Url;
use tracing::{debug, info};

use crate::config::ResolverConfig;
use crate::error::ResolveError;

/// Opens one connection per request. Closing happens on drop of the
/// returned [`Connection`].
#[async_trait]
pub trait Transport: Send + Sync {
    type Connection: Connection;

    async fn open(&self, url: &Url) -> Result<Self::Connection, ResolveError>;
}

/// A response whose status and headers have been read.
pub trait Connection: Send {
    fn status(&self) -> u16;

    /// Raw `Location` header value, if any.
    fn location(&self) -> Option<&[u8]>;
}

/// Statuses followed by the resolver: 301, 302 and 303.
pub fn is_redirect(status: u16) -> bool {
    matches!(status, 301..=303)
}

pub struct RedirectResolver<T> {
    transport: T,
    max_redirects: usize,
}

impl<T: Transport> RedirectResolver<T> {
    pub fn new(transport: T, max_redirects: usize) -> Self {
        Self {
            transport,
            max_redirects,
        }
    }

    /// Follow redirects from `seed` until a non-redirect response and return
    /// the URL that produced it. A seed that is not redirected comes back
    /// exactly as given, without normalisation.
    ///
    /// At most `max_redirects + 1` requests are issued. No retries: the first
    /// network failure is returned as is.
    pub async fn resolve(&self, seed: &str) -> Result<String, ResolveError> {
        let mut current = parse_seed(seed)?;

        for hop in 0..=self.max_redirects {
            let conn = self.transport.open(&current).await?;
            let status = conn.status();

            if !is_redirect(status) {
                if hop == 0 {
                    return Ok(seed.to_string());
                }
                info!("Resolved {} -> {} after {} redirect(s)", seed, current, hop);
                return Ok(current.into());
            }

            let next = next_location(&current, conn.location())?;
            drop(conn);

            debug!(hop, status, from = %current, to = %next, "Following redirect");
            current = next;
        }

        Err(ResolveError::RedirectLoop {
            seed: seed.to_string(),
            limit: self.max_redirects,
        })
    }
}

fn parse_seed(seed: &str) -> Result<Url, ResolveError> {
    let url = Url::parse(seed).map_err(|e| ResolveError::InvalidUrl {
        url: seed.to_string(),
        reason: e.to_string(),
    })?;
    if !is_http(&url) {
        return Err(ResolveError::InvalidUrl {
            url: seed.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}

/// Interpret a `Location` header relative to the URL that returned it.
fn next_location(current: &Url, location: Option<&[u8]>) -> Result<Url, ResolveError> {
    let raw = location.ok_or_else(|| ResolveError::malformed(current.as_str(), "missing Location header"))?;
    let value = std::str::from_utf8(raw)
        .map_err(|_| ResolveError::malformed(current.as_str(), "Location header is not valid UTF-8"))?
        .trim();

    if value.is_empty() {
        return Err(ResolveError::malformed(current.as_str(), "empty Location header"));
    }

    let next = current
        .join(value)
        .map_err(|e| ResolveError::malformed(current.as_str(), format!("bad Location '{}': {}", value, e)))?;

    if !is_http(&next) {
        return Err(ResolveError::malformed(
            current.as_str(),
            format!("Location '{}' is not an http(s) URL", value),
        ));
    }
    Ok(next)
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// reqwest-backed transport. Automatic redirects are disabled so each hop is
/// visible to the resolver.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ResolverConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

/// An open response. Dropping it drops the body stream and frees the socket.
pub struct HttpConnection {
    response: reqwest::Response,
}

impl Connection for HttpConnection {
    fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    fn location(&self) -> Option<&[u8]> {
        self.response.headers().get(LOCATION).map(|v| v.as_bytes())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    type Connection = HttpConnection;

    async fn open(&self, url: &Url) -> Result<HttpConnection, ResolveError> {
        // GET rather than HEAD: several streaming servers reject HEAD outright
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ResolveError::network(url.as_str(), e))?;
        Ok(HttpConnection { response })
    }
}
