//! Invoice delivery: where a sent invoice's PDF lives, and trade boilerplate

use crate::config::DeliveryConfig;
use crate::models::{Invoice, TradeType};

/// Public URL of the PDF for an invoice.
pub fn pdf_url(config: &DeliveryConfig, invoice_id: i64) -> String {
    format!(
        "{}/invoices/{}.pdf",
        config.pdf_base_url.trim_end_matches('/'),
        invoice_id
    )
}

/// Hand a sent invoice to the delivery pipeline.
///
/// Rendering and emailing happen outside this process; this records the dispatch.
pub fn dispatch(invoice: &Invoice, pdf_url: &str) {
    tracing::info!(
        invoice_id = invoice.id,
        to = %invoice.client_email,
        total = %invoice.totals.total,
        pdf_url,
        "Invoice dispatched"
    );
}

/// Warranty and compliance paragraph printed on invoices for a trade.
pub fn compliance_notes(trade_type: TradeType) -> &'static str {
    match trade_type {
        TradeType::Plumbing => {
            "This plumbing work was performed in accordance with local plumbing codes and \
             regulations. All fixtures and installations are guaranteed for 1 year from date \
             of completion. Keep this invoice for warranty claims and tax records."
        }
        TradeType::Electrical => {
            "This electrical work was performed in accordance with the National Electrical \
             Code and local regulations. All work is guaranteed for 1 year from date of \
             completion. Electrical permit information available upon request. Keep this \
             invoice for warranty claims and tax records."
        }
        TradeType::Hvac => {
            "This HVAC work was performed in accordance with industry standards and local \
             regulations. Equipment warranties may require registration with manufacturer. \
             All labor is guaranteed for 1 year from date of completion. Keep this invoice \
             for warranty claims and tax records."
        }
    }
}
