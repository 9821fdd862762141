use crate::error::FetchError;
use alert_core::Config;
use alert_core::api::RegionAlerts;
use reqwest::header::AUTHORIZATION;
use std::future::Future;
use tracing::instrument;

pub trait AlertSource {
    fn fetch(&self) -> impl Future<Output = Result<Vec<RegionAlerts>, FetchError>> + Send;
}

/// Polls the alerts API over HTTP.
#[derive(Debug)]
pub struct HttpAlertSource {
    client: reqwest::Client,
    url: String,
    auth_header: Option<String>,
}

impl HttpAlertSource {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            url: config.api_url.clone(),
            auth_header: config.auth_header.clone(),
        })
    }
}

impl AlertSource for HttpAlertSource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Vec<RegionAlerts>, FetchError> {
        let mut request = self.client.get(&self.url);
        if let Some(auth_header) = &self.auth_header
            && !auth_header.is_empty()
        {
            request = request.header(AUTHORIZATION, auth_header);
        }

        let resp = request.send().await?.error_for_status()?.text().await?;

        Ok(serde_json::from_str(&resp)?)
    }
}
