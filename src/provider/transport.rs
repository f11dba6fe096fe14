//! HTTP transport used by network-backed providers.
//!
//! [`HttpTransport`] wraps a blocking reqwest client with a persistent cookie
//! jar, so session cookies set by one request carry over to the next, and
//! sends the page that linked to a resource as its `Referer`. Failures are
//! mapped onto [`ProviderError`]: anything a later attempt could plausibly
//! get past (timeouts, refused connections, 408/429/5xx) is transient.

use super::ProviderError;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::REFERER;
use std::time::Duration;

/// Opaque byte fetcher. Implementations must be shareable across workers.
pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str, referer: Option<&str>) -> Result<Vec<u8>, ProviderError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| ProviderError::Permanent(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str, referer: Option<&str>) -> Result<Vec<u8>, ProviderError> {
        let mut request = self.client.get(url);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().map_err(|e| classify_error(url, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(url, status));
        }

        let body = response.bytes().map_err(|e| classify_error(url, &e))?;
        tracing::trace!(url, bytes = body.len(), "fetched");
        Ok(body.to_vec())
    }
}

fn classify_error(url: &str, err: &reqwest::Error) -> ProviderError {
    let message = format!("GET {url}: {err}");
    if err.is_timeout() || err.is_connect() {
        ProviderError::Transient(message)
    } else {
        ProviderError::Permanent(message)
    }
}

/// Map a non-success HTTP status to a provider fault.
pub fn classify_status(url: &str, status: StatusCode) -> ProviderError {
    let message = format!("GET {url}: HTTP {status}");
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        ProviderError::Transient(message)
    } else {
        ProviderError::Permanent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        for code in [408, 429, 500, 502, 503, 504] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(
                classify_status("https://x", status).is_transient(),
                "{code} should be transient"
            );
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        for code in [400, 401, 403, 404, 410] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(
                !classify_status("https://x", status).is_transient(),
                "{code} should be permanent"
            );
        }
    }

    #[test]
    fn status_message_names_the_url() {
        let err = classify_status("https://example.org/c1", StatusCode::NOT_FOUND);
        assert_eq!(
            err,
            ProviderError::Permanent("GET https://example.org/c1: HTTP 404 Not Found".into())
        );
    }

    #[test]
    fn client_builds() {
        assert!(HttpTransport::new("chapter-sync-test", Duration::from_secs(1)).is_ok());
    }
}
