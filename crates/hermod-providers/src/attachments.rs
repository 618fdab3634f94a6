//! Attachment fetching from tenant service APIs.

use async_trait::async_trait;
use bytes::Bytes;
use hermod_core::{AttachmentFetcher, CoreError, DocumentRef, Result, TenantConfig};
use tracing::{debug, warn};

use crate::{response_excerpt, PROVIDER_TIMEOUT};

/// Fetches invoice and work-order PDFs from the tenant's service API.
#[derive(Debug, Clone)]
pub struct HttpAttachmentFetcher {
    client: reqwest::Client,
}

impl HttpAttachmentFetcher {
    /// Creates the fetcher with a pooled HTTP client.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| CoreError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    fn document_url(base: &str, reference: &DocumentRef) -> String {
        let base = base.trim_end_matches('/');
        match reference {
            DocumentRef::Invoice { id } => format!("{base}/api/Invoice/{id}/pdf"),
            DocumentRef::WorkOrder { id } => format!("{base}/api/workorder/{id}/pdf"),
        }
    }
}

#[async_trait]
impl AttachmentFetcher for HttpAttachmentFetcher {
    async fn fetch(&self, config: &TenantConfig, reference: &DocumentRef) -> Result<Option<Bytes>> {
        let base = config
            .api_base_url
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CoreError::configuration(format!(
                    "tenant {} has no service API base URL",
                    config.tenant_id
                ))
            })?;

        let url = Self::document_url(base, reference);
        debug!(url = %url, "fetching attachment document");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::provider(format!("failed to fetch document: {e}")))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            warn!(url = %url, "attachment document not found");
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::provider(format!(
                "document endpoint returned status {status}: {}",
                response_excerpt(&body)
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let content = response
            .bytes()
            .await
            .map_err(|e| CoreError::provider(format!("failed to read document body: {e}")))?;

        if !content_type.to_lowercase().contains("pdf") && !content.is_empty() {
            warn!(url = %url, content_type = %content_type, "document has unexpected content type");
        }

        Ok(Some(content))
    }
}

#[cfg(test)]
mod tests {
    use hermod_core::TenantId;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn config(base: &str) -> TenantConfig {
        TenantConfig {
            tenant_id: TenantId::new("t1"),
            api_base_url: Some(base.to_string()),
            ..TenantConfig::default()
        }
    }

    #[tokio::test]
    async fn fetches_invoice_pdf_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Invoice/R-9/pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.7".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpAttachmentFetcher::new().unwrap();
        let content = fetcher
            .fetch(&config(&server.uri()), &DocumentRef::Invoice { id: "R-9".to_string() })
            .await
            .unwrap();

        assert_eq!(content.unwrap().as_ref(), b"%PDF-1.7");
        server.verify().await;
    }

    #[tokio::test]
    async fn missing_document_is_none_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpAttachmentFetcher::new().unwrap();
        let content = fetcher
            .fetch(&config(&server.uri()), &DocumentRef::WorkOrder { id: "77".to_string() })
            .await
            .unwrap();

        assert!(content.is_none());
    }

    #[tokio::test]
    async fn server_error_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let fetcher = HttpAttachmentFetcher::new().unwrap();
        let err = fetcher
            .fetch(&config(&server.uri()), &DocumentRef::Invoice { id: "R-9".to_string() })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn missing_api_base_is_a_configuration_error() {
        let fetcher = HttpAttachmentFetcher::new().unwrap();
        let mut cfg = config("http://unused.example");
        cfg.api_base_url = None;

        let err = fetcher
            .fetch(&cfg, &DocumentRef::Invoice { id: "R-9".to_string() })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no service API base URL"));
    }
}
