//! Session store for invoices
//!
//! Holds the summary list and at most one full invoice (the one currently open), and
//! keeps the two in step. Caches change only from a successful service response;
//! a failed call leaves them exactly as they were.

use rust_decimal::Decimal;

use crate::calculator::compute_totals;
use crate::error::{RepositoryError, ValidationError};
use crate::lifecycle::{authorize_edit, authorize_send, authorize_status_change};
use crate::models::{Invoice, InvoicePayload, InvoiceStatus, InvoiceSummary};
use crate::service::{InvoiceService, ServiceError};

/// Owned per session: create one at login and drop or [`clear`](Self::clear) it at logout.
pub struct InvoiceRepository<S> {
    service: S,
    summaries: Vec<InvoiceSummary>,
    current: Option<Invoice>,
    loading: bool,
    error: Option<String>,
}

impl<S: InvoiceService> InvoiceRepository<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            summaries: Vec::new(),
            current: None,
            loading: false,
            error: None,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Cached invoice list, newest first.
    pub fn summaries(&self) -> &[InvoiceSummary] {
        &self.summaries
    }

    pub fn summary(&self, id: i64) -> Option<&InvoiceSummary> {
        self.summaries.iter().find(|s| s.id == id)
    }

    /// The invoice currently open, if any.
    pub fn current(&self) -> Option<&Invoice> {
        self.current.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Message from the last failed call, cleared by the next success.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }

    /// Forget everything cached, e.g. on logout.
    pub fn clear(&mut self) {
        self.summaries.clear();
        self.current = None;
        self.loading = false;
        self.error = None;
    }

    /// Replace the summary list with a fresh copy from the service.
    pub async fn list(&mut self) -> Result<&[InvoiceSummary], RepositoryError> {
        self.begin();
        let result = self.service.list().await;
        let summaries = self.finish(result, None)?;

        tracing::debug!(count = summaries.len(), "Invoice list loaded");
        self.summaries = summaries;
        Ok(&self.summaries)
    }

    /// Load one invoice as the current detail, dropping whichever was open.
    pub async fn get(&mut self, id: i64) -> Result<Invoice, RepositoryError> {
        self.begin();
        let result = self.service.get(id).await;
        let invoice = self.finish(result, Some(id))?;

        self.current = Some(invoice.clone());
        Ok(invoice)
    }

    /// Submit a new invoice. It goes to the top of the list and becomes current.
    pub async fn create(&mut self, payload: InvoicePayload) -> Result<Invoice, RepositoryError> {
        self.preflight(validate_submission(&payload))?;

        self.begin();
        let result = self.service.create(&payload).await;
        let invoice = self.finish(result, None)?;

        tracing::info!(invoice_id = invoice.id, "Invoice created");
        self.summaries.insert(0, InvoiceSummary::from(&invoice));
        self.current = Some(invoice.clone());
        Ok(invoice)
    }

    /// Replace the editable fields of a draft.
    ///
    /// The payload is always validated locally. The draft-only rule is checked locally
    /// only when `id` is the open invoice; otherwise the service enforces it.
    pub async fn update(
        &mut self,
        id: i64,
        payload: InvoicePayload,
    ) -> Result<Invoice, RepositoryError> {
        let check = validate_submission(&payload).and_then(|()| match self.cached_status(id) {
            Some(status) => authorize_edit(status).map_err(RepositoryError::from),
            None => Ok(()),
        });
        self.preflight(check)?;

        self.begin();
        let result = self.service.update(id, &payload).await;
        let invoice = self.finish(result, Some(id))?;

        tracing::info!(invoice_id = id, "Invoice updated");
        Ok(self.reconcile(invoice))
    }

    /// Move an invoice to `status`, e.g. mark it paid.
    ///
    /// The transition is checked locally only when `id` is the open invoice. Any other id
    /// goes straight to the service, which applies its own rules.
    pub async fn change_status(
        &mut self,
        id: i64,
        status: InvoiceStatus,
    ) -> Result<Invoice, RepositoryError> {
        if let Some(from) = self.cached_status(id) {
            self.preflight(
                authorize_status_change(from, status)
                    .map(|_| ())
                    .map_err(RepositoryError::from),
            )?;
        }

        self.begin();
        let result = self.service.change_status(id, status).await;
        let invoice = self.finish(result, Some(id))?;

        tracing::info!(invoice_id = id, status = %invoice.status, "Invoice status changed");
        Ok(self.reconcile(invoice))
    }

    /// Send (or re-send) an invoice to the client.
    ///
    /// Send preconditions are checked locally only when `id` is the open invoice. Any other
    /// id goes straight to the service, which applies its own rules.
    pub async fn send(&mut self, id: i64) -> Result<Invoice, RepositoryError> {
        if let Some(current) = self.current.as_ref().filter(|c| c.id == id) {
            let check = authorize_send(current).map(|_| ()).map_err(RepositoryError::from);
            self.preflight(check)?;
        }

        self.begin();
        let result = self.service.send(id).await;
        let invoice = self.finish(result, Some(id))?;

        tracing::info!(invoice_id = id, pdf_url = ?invoice.pdf_url, "Invoice sent");
        Ok(self.reconcile(invoice))
    }

    fn cached_status(&self, id: i64) -> Option<InvoiceStatus> {
        self.current
            .as_ref()
            .filter(|current| current.id == id)
            .map(|current| current.status)
    }

    /// Record a failed local check; nothing has been sent.
    fn preflight(&mut self, check: Result<(), RepositoryError>) -> Result<(), RepositoryError> {
        check.inspect_err(|err| {
            tracing::debug!(error = %err, "Rejected before contacting invoice service");
            self.error = Some(err.to_string());
        })
    }

    fn begin(&mut self) {
        self.loading = true;
    }

    fn finish<T>(
        &mut self,
        result: Result<T, ServiceError>,
        id: Option<i64>,
    ) -> Result<T, RepositoryError> {
        self.loading = false;
        match result {
            Ok(value) => {
                self.error = None;
                Ok(value)
            }
            Err(err) => {
                let err = RepositoryError::from_service(err, id);
                tracing::warn!(invoice_id = ?id, error = %err, "Invoice service call failed");
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Fold an authoritative response into both caches.
    ///
    /// Every projected field is copied, so list and detail agree on status and total
    /// whatever the mutation was. The row keeps its position; ids not in the list are
    /// left out of it.
    fn reconcile(&mut self, invoice: Invoice) -> Invoice {
        if let Some(row) = self.summaries.iter_mut().find(|s| s.id == invoice.id) {
            *row = InvoiceSummary::from(&invoice);
        }
        self.current = Some(invoice.clone());
        invoice
    }
}

/// Checks run before a create or update reaches the service.
fn validate_submission(payload: &InvoicePayload) -> Result<(), RepositoryError> {
    payload.validate()?;

    let totals = compute_totals(&payload.line_items, payload.tax_rate);
    if totals.total <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveTotal.into());
    }
    Ok(())
}
