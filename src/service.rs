//! Interface to the remote invoice service

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Invoice, InvoicePayload, InvoiceStatus, InvoiceSummary};

/// Failure reported by an [`InvoiceService`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("invoice not found")]
    NotFound,

    #[error("not authorized, check the API token")]
    Unauthorized,

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("could not reach invoice service: {0}")]
    Transport(String),

    #[error("unexpected response from invoice service: {0}")]
    Decode(String),
}

/// The backend that persists invoices and computes their authoritative totals.
///
/// Every call is a single request. Nothing is retried here.
#[async_trait]
pub trait InvoiceService: Send + Sync {
    async fn list(&self) -> Result<Vec<InvoiceSummary>, ServiceError>;

    async fn get(&self, id: i64) -> Result<Invoice, ServiceError>;

    async fn create(&self, payload: &InvoicePayload) -> Result<Invoice, ServiceError>;

    async fn update(&self, id: i64, payload: &InvoicePayload) -> Result<Invoice, ServiceError>;

    async fn change_status(&self, id: i64, status: InvoiceStatus) -> Result<Invoice, ServiceError>;

    async fn send(&self, id: i64) -> Result<Invoice, ServiceError>;
}
