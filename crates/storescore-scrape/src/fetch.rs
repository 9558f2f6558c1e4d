use std::time::Duration;

use async_trait::async_trait;

use crate::ScrapeError;

const TIMEOUT: Duration = Duration::from_secs(20);

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and return the body as text. Non-2xx is an error.
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, ScrapeError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("storescore/", env!("CARGO_PKG_VERSION")))
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| ScrapeError::Http {
                url: String::new(),
                message: format!("build client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, ScrapeError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let http_err = |e: reqwest::Error| ScrapeError::Http {
            url: url.to_string(),
            message: e.to_string(),
        };
        let response = request.send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(http_err)
    }
}
