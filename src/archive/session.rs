//! HTTP session bound to one retry policy

use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use super::error::{FetchError, FetchResult};
use crate::config::RetryPolicy;

/// Statuses worth retrying when the response is not itself an archived memento
const RETRY_STATUSES: &[u16] = &[413, 421, 429, 500, 502, 503, 504, 599];

/// A pooled HTTP client plus the retry policy it applies to every request
///
/// Each worker owns one session exclusively and replaces it wholesale after a
/// connection failure, so a broken connection pool never outlives its session.
#[derive(Debug, Clone)]
pub struct WaybackSession {
    client: Client,
    policy: RetryPolicy,
}

impl WaybackSession {
    pub fn new(policy: RetryPolicy, user_agent: &str) -> FetchResult<Self> {
        let timeout = policy.timeout.as_duration();
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Other {
                url: String::new(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET with retries
    ///
    /// Transport failures and retryable statuses are retried up to
    /// `max_retries` times with exponential backoff. Once retries run out the
    /// last response is returned as-is for the caller to classify; a transport
    /// failure becomes a [`FetchError`].
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> FetchResult<Response> {
        let mut retries = 0;

        loop {
            let outcome = self.client.get(url).query(query).send().await;

            let retry_reason = match &outcome {
                Ok(response) if should_retry_status(response) => {
                    Some(format!("HTTP {}", response.status().as_u16()))
                }
                Ok(_) => None,
                Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => Some(e.to_string()),
                Err(_) => None,
            };

            match retry_reason {
                Some(reason) if retries < self.policy.max_retries => {
                    retries += 1;
                    let backoff = self.policy.backoff(retries);
                    debug!(url, retries, ?backoff, %reason, "Request failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Some(reason) => {
                    if retries > 0 {
                        warn!(url, retries, %reason, "Request failed after retries");
                    }
                    return outcome.map_err(|e| FetchError::from_reqwest(url, &e));
                }
                None => {
                    if retries > 0 {
                        debug!(url, retries, "Request succeeded after retry");
                    }
                    return outcome.map_err(|e| FetchError::from_reqwest(url, &e));
                }
            }
        }
    }
}

/// Whether a response carries an archived capture rather than an archive error
pub fn is_memento(response: &Response) -> bool {
    response.headers().contains_key("memento-datetime")
}

fn should_retry_status(response: &Response) -> bool {
    let status: StatusCode = response.status();
    RETRY_STATUSES.contains(&status.as_u16()) && !is_memento(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, 0.0, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_retries_server_errors_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let session = WaybackSession::new(fast_policy(3), "test").unwrap();
        let response = session
            .get(&format!("{}/flaky", server.uri()), &[])
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_returns_last_response_when_retries_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let session = WaybackSession::new(fast_policy(2), "test").unwrap();
        let response = session
            .get(&format!("{}/down", server.uri()), &[])
            .await
            .unwrap();
        assert_eq!(response.status(), 502);
    }

    #[tokio::test]
    async fn test_archived_server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/archived-500"))
            .respond_with(
                ResponseTemplate::new(500)
                    .insert_header("Memento-Datetime", "Wed, 01 Jan 2020 00:00:00 GMT"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = WaybackSession::new(fast_policy(5), "test").unwrap();
        let response = session
            .get(&format!("{}/archived-500", server.uri()), &[])
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
        assert!(is_memento(&response));
    }

    #[tokio::test]
    async fn test_connection_refused_is_classified() {
        // Bind and drop a listener to get a port nobody is listening on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let session = WaybackSession::new(fast_policy(0), "test").unwrap();
        let error = session
            .get(&format!("http://127.0.0.1:{}/", port), &[])
            .await
            .unwrap_err();
        assert!(error.is_connection_failure(), "unexpected error: {error}");
    }
}
