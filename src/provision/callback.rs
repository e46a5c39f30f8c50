use super::Response;

/// Delivers the completion status of a provisioning request
#[async_trait::async_trait]
pub trait Callback: Send + Sync {
    /// Sends `response` to `url`
    async fn send(&self, url: &str, response: &Response) -> anyhow::Result<()>;
}

/// [`Callback`] which `PUT`s the response to the pre-signed response url
#[derive(Debug, Clone, Default)]
pub struct HttpCallback {
    client: reqwest::Client,
}

impl HttpCallback {
    /// Creates a new callback client
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Callback for HttpCallback {
    async fn send(&self, url: &str, response: &Response) -> anyhow::Result<()> {
        use anyhow::Context;

        let body = serde_json::to_string(response).context("Unable to serialize response")?;
        log::debug!("Sending response: {}", body);
        // Pre-signed S3 urls are signed without a content type
        let res = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "")
            .body(body)
            .send()
            .await
            .context("Unable to send response to ResponseURL")?;
        log::debug!("Response status code: {}", res.status());
        let _ = res
            .error_for_status()
            .context("ResponseURL rejected the response")?;
        Ok(())
    }
}
