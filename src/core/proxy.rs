use crate::adapters::upstream::{adapter_for, UpstreamAdapter};
use crate::core::prompt::PromptTemplate;
use crate::domain::model::Credential;
use crate::domain::ports::{ConfigProvider, TextEnhancer};
use crate::utils::error::{EnhanceError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

/// Calls the upstream generative-text API once per request and normalizes the result.
pub struct EnhancementProxy {
    client: Client,
    endpoint: String,
    adapter: Box<dyn UpstreamAdapter>,
    template: PromptTemplate,
}

impl EnhancementProxy {
    pub fn new(
        endpoint: impl Into<String>,
        adapter: Box<dyn UpstreamAdapter>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            adapter,
            template: PromptTemplate::default(),
        })
    }

    pub fn from_config<C: ConfigProvider>(config: &C) -> Result<Self> {
        Self::new(
            config.upstream_endpoint(),
            adapter_for(config.upstream_schema()),
            config.upstream_timeout(),
        )
    }

    async fn call_upstream(&self, text: &str, credential: &Credential) -> Result<String> {
        let prompt = self.template.render(text);

        let request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&self.adapter.request_body(&prompt));
        let request = self.adapter.authorize(request, credential);

        tracing::debug!(
            "Making upstream request ({} schema, {} chars of input)",
            self.adapter.schema(),
            text.chars().count()
        );

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("Upstream response status: {}", status);

        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(EnhanceError::UpstreamStatusError {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        self.adapter.extract_text(&body)
    }
}

#[async_trait]
impl TextEnhancer for EnhancementProxy {
    async fn enhance(&self, text: &str, credential: &Credential) -> Result<String> {
        match self.call_upstream(text, credential).await {
            Ok(enhanced) => {
                if enhanced.is_empty() {
                    tracing::warn!("Upstream succeeded but returned no text");
                }
                Ok(enhanced)
            }
            Err(e) => {
                tracing::error!("Enhancement API error: {}", e);
                Err(e)
            }
        }
    }
}
