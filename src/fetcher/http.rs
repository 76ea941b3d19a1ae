//! Plain HTTP fetcher

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::{FetchError, FetchedPage, FetcherConfig, looks_blocked};

/// Fetches pages with a single GET, no script execution
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    /// Create a new HTTP fetcher
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.page_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// GET `url` and return the body
    pub async fn get(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = url::Url::parse(url)?;
        debug!("HTTP GET {}", parsed);

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| self.map_send_error(url, e))?;

        let status = response.status();
        let final_url = response.url().to_string();

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            warn!("{} answered {}", url, status);
            return Err(FetchError::Blocked {
                url: url.to_string(),
                status: Some(status.as_u16()),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Navigation {
                url: url.to_string(),
                reason: format!("HTTP status {}", status),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| self.map_send_error(url, e))?;

        if looks_blocked(&html) {
            return Err(FetchError::Blocked {
                url: url.to_string(),
                status: Some(status.as_u16()),
            });
        }

        Ok(FetchedPage { html, final_url })
    }

    fn map_send_error(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                after: self.config.page_timeout,
            }
        } else if err.is_connect() || err.is_request() || err.is_body() {
            FetchError::Navigation {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            FetchError::Http(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::time::Duration;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(
            FetcherConfig::builder()
                .page_timeout(Duration::from_secs(5))
                .build(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/board")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body("<html><body><div class='board_view'>공고</div></body></html>")
            .create_async()
            .await;

        let url = format!("{}/board", server.url());
        let page = fetcher().get(&url).await.unwrap();

        mock.assert_async().await;
        assert!(page.html.contains("board_view"));
        assert_eq!(page.final_url, url);
    }

    #[tokio::test]
    async fn test_get_rate_limited_is_blocked() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/board")
            .with_status(429)
            .create_async()
            .await;

        let url = format!("{}/board", server.url());
        let err = fetcher().get(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Blocked { status: Some(429), .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_get_server_error_is_navigation() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/board")
            .with_status(500)
            .create_async()
            .await;

        let url = format!("{}/board", server.url());
        let err = fetcher().get(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Navigation { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_get_challenge_page_is_blocked() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/board")
            .with_status(200)
            .with_body("<html><body><div id='cf-challenge'>Checking your browser</div></body></html>")
            .create_async()
            .await;

        let url = format!("{}/board", server.url());
        let err = fetcher().get(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Blocked { .. }));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = fetcher().get("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::UrlParse(_)));
    }
}
