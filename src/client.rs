//! HTTP client for the invoice server

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::models::{Invoice, InvoicePayload, InvoiceStatus, InvoiceSummary, StatusUpdate};
use crate::service::{InvoiceService, ServiceError};

/// [`InvoiceService`] over HTTP/JSON with bearer-token auth
pub struct HttpInvoiceService {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpInvoiceService {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ServiceError> {
        let response = builder.send().await.map_err(|e| {
            tracing::error!(error = %e, "Invoice service request failed");
            ServiceError::Transport(e.to_string())
        })?;

        let response = check_status(response).await?;

        response.json::<T>().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to decode invoice service response");
            ServiceError::Decode(e.to_string())
        })
    }
}

/// Turn a non-success response into the matching [`ServiceError`].
async fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::NOT_FOUND => Err(ServiceError::NotFound),
        StatusCode::UNAUTHORIZED => Err(ServiceError::Unauthorized),
        _ => {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body)
                .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));
            tracing::warn!(status = status.as_u16(), %message, "Invoice service rejected request");
            Err(ServiceError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Pull the message out of an `{"error": ..}` (or `{"detail": ..}`) body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "detail"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[async_trait]
impl InvoiceService for HttpInvoiceService {
    async fn list(&self) -> Result<Vec<InvoiceSummary>, ServiceError> {
        self.execute(self.request(Method::GET, "/invoices")).await
    }

    async fn get(&self, id: i64) -> Result<Invoice, ServiceError> {
        self.execute(self.request(Method::GET, &format!("/invoices/{id}")))
            .await
    }

    async fn create(&self, payload: &InvoicePayload) -> Result<Invoice, ServiceError> {
        self.execute(self.request(Method::POST, "/invoices").json(payload))
            .await
    }

    async fn update(&self, id: i64, payload: &InvoicePayload) -> Result<Invoice, ServiceError> {
        self.execute(
            self.request(Method::PUT, &format!("/invoices/{id}"))
                .json(payload),
        )
        .await
    }

    async fn change_status(&self, id: i64, status: InvoiceStatus) -> Result<Invoice, ServiceError> {
        self.execute(
            self.request(Method::PATCH, &format!("/invoices/{id}/status"))
                .json(&StatusUpdate { status }),
        )
        .await
    }

    async fn send(&self, id: i64) -> Result<Invoice, ServiceError> {
        self.execute(self.request(Method::POST, &format!("/invoices/{id}/send")))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let service = HttpInvoiceService::new("http://localhost:3030/", None);
        assert_eq!(service.base_url(), "http://localhost:3030");
    }

    #[test]
    fn error_message_reads_error_or_detail() {
        assert_eq!(
            error_message(r#"{"error":"cannot edit an invoice that is sent"}"#).as_deref(),
            Some("cannot edit an invoice that is sent")
        );
        assert_eq!(
            error_message(r#"{"detail":"Invoice not found"}"#).as_deref(),
            Some("Invoice not found")
        );
        assert_eq!(error_message("<html>bad gateway</html>"), None);
    }
}
