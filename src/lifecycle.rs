//! Invoice status transitions
//!
//! ```text
//! draft --send-----> sent
//! draft --edit-----> draft
//! draft --markPaid-> paid
//! sent  --resend---> sent
//! sent  --markPaid-> paid
//! paid  --markPaid-> paid
//! ```
//!
//! Only drafts can be edited or go through the first send. `markPaid` is accepted from
//! every state, so repeating it is harmless.

use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

use crate::calculator::compute_totals;
use crate::models::{Invoice, InvoiceStatus};

/// Something a user can do to an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvoiceAction {
    Edit,
    Send,
    Resend,
    MarkPaid,
}

impl InvoiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceAction::Edit => "edit",
            InvoiceAction::Send => "send",
            InvoiceAction::Resend => "resend",
            InvoiceAction::MarkPaid => "mark paid",
        }
    }
}

impl fmt::Display for InvoiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} an invoice that is {status}")]
    NotPermitted {
        status: InvoiceStatus,
        action: InvoiceAction,
    },

    #[error("invoice has no valid line items")]
    NoValidLineItems,

    #[error("invoice total must be greater than zero")]
    NonPositiveTotal,

    #[error("a draft is moved to sent by sending it")]
    SendRequired,
}

impl InvoiceStatus {
    /// Whether `action` is offered in this state (ignoring send preconditions).
    pub fn permits(self, action: InvoiceAction) -> bool {
        use InvoiceAction::*;
        use InvoiceStatus::*;

        matches!(
            (self, action),
            (Draft, Edit) | (Draft, Send) | (Sent, Resend) | (_, MarkPaid)
        )
    }

    /// The state reached by applying `action`.
    pub fn apply(self, action: InvoiceAction) -> Result<InvoiceStatus, TransitionError> {
        if !self.permits(action) {
            return Err(TransitionError::NotPermitted {
                status: self,
                action,
            });
        }

        Ok(match action {
            InvoiceAction::Edit => InvoiceStatus::Draft,
            InvoiceAction::Send | InvoiceAction::Resend => InvoiceStatus::Sent,
            InvoiceAction::MarkPaid => InvoiceStatus::Paid,
        })
    }

    pub fn available_actions(self) -> Vec<InvoiceAction> {
        [
            InvoiceAction::Edit,
            InvoiceAction::Send,
            InvoiceAction::Resend,
            InvoiceAction::MarkPaid,
        ]
        .into_iter()
        .filter(|action| self.permits(*action))
        .collect()
    }

    /// Line items and client details can change only while drafting.
    pub fn is_editable(self) -> bool {
        self.permits(InvoiceAction::Edit)
    }
}

/// Allow a field/line item change on an invoice in `status`.
pub fn authorize_edit(status: InvoiceStatus) -> Result<(), TransitionError> {
    status.apply(InvoiceAction::Edit).map(|_| ())
}

/// Decide whether `invoice` may be sent and which action that is.
///
/// A draft needs at least one valid line item and a positive total. A sent invoice is
/// re-sent without further checks. Paid invoices are not sent again.
pub fn authorize_send(invoice: &Invoice) -> Result<InvoiceAction, TransitionError> {
    match invoice.status {
        InvoiceStatus::Draft => {
            let has_valid_item = invoice
                .line_items
                .iter()
                .any(|item| !item.description.trim().is_empty() && item.unit_price > Decimal::ZERO);
            if !has_valid_item {
                return Err(TransitionError::NoValidLineItems);
            }

            let totals = compute_totals(&invoice.line_items, invoice.tax_rate);
            if totals.total <= Decimal::ZERO {
                return Err(TransitionError::NonPositiveTotal);
            }

            Ok(InvoiceAction::Send)
        }
        InvoiceStatus::Sent => Ok(InvoiceAction::Resend),
        status => Err(TransitionError::NotPermitted {
            status,
            action: InvoiceAction::Send,
        }),
    }
}

/// Map a direct status change onto an action and check it.
///
/// Moving to `sent` this way is only a re-send; a draft gets there through
/// [`authorize_send`] so its preconditions and delivery run.
pub fn authorize_status_change(
    from: InvoiceStatus,
    to: InvoiceStatus,
) -> Result<InvoiceAction, TransitionError> {
    let action = match to {
        InvoiceStatus::Draft => InvoiceAction::Edit,
        InvoiceStatus::Sent if from == InvoiceStatus::Draft => InvoiceAction::Send,
        InvoiceStatus::Sent => InvoiceAction::Resend,
        InvoiceStatus::Paid => InvoiceAction::MarkPaid,
    };

    if action == InvoiceAction::Send {
        return Err(TransitionError::SendRequired);
    }

    from.apply(action)?;
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::{LineItem, LineItemCategory, Totals, TradeType};

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn invoice(status: InvoiceStatus, items: Vec<(&str, &str, &str)>) -> Invoice {
        Invoice {
            id: 1,
            client_name: "Ana".to_string(),
            client_email: "ana@example.com".to_string(),
            job_address: "5 Pine Rd".to_string(),
            trade_type: TradeType::Plumbing,
            tax_rate: d("8.25"),
            status,
            pdf_url: None,
            created_at: Utc::now(),
            updated_at: None,
            line_items: items
                .into_iter()
                .enumerate()
                .map(|(i, (desc, qty, price))| LineItem {
                    id: i as i64 + 1,
                    description: desc.to_string(),
                    quantity: d(qty),
                    unit_price: d(price),
                    category: LineItemCategory::Parts,
                    line_total: d(qty) * d(price),
                })
                .collect(),
            totals: Totals::default(),
        }
    }

    #[test]
    fn transition_table() {
        use InvoiceAction::*;
        use InvoiceStatus::*;

        assert_eq!(Draft.apply(Send), Ok(Sent));
        assert_eq!(Draft.apply(Edit), Ok(Draft));
        assert_eq!(Draft.apply(MarkPaid), Ok(Paid));
        assert_eq!(Sent.apply(Resend), Ok(Sent));
        assert_eq!(Sent.apply(MarkPaid), Ok(Paid));

        assert!(Draft.apply(Resend).is_err());
        assert!(Sent.apply(Edit).is_err());
        assert!(Sent.apply(Send).is_err());
        assert!(Paid.apply(Edit).is_err());
        assert!(Paid.apply(Send).is_err());
        assert!(Paid.apply(Resend).is_err());
    }

    #[test]
    fn resend_and_mark_paid_are_idempotent() {
        let once = InvoiceStatus::Sent.apply(InvoiceAction::Resend).unwrap();
        let twice = once.apply(InvoiceAction::Resend).unwrap();
        assert_eq!((once, twice), (InvoiceStatus::Sent, InvoiceStatus::Sent));

        let paid = InvoiceStatus::Paid.apply(InvoiceAction::MarkPaid).unwrap();
        assert_eq!(paid.apply(InvoiceAction::MarkPaid), Ok(InvoiceStatus::Paid));
    }

    #[test]
    fn only_drafts_are_editable() {
        assert!(InvoiceStatus::Draft.is_editable());
        assert!(!InvoiceStatus::Sent.is_editable());
        assert_eq!(
            authorize_edit(InvoiceStatus::Paid),
            Err(TransitionError::NotPermitted {
                status: InvoiceStatus::Paid,
                action: InvoiceAction::Edit,
            })
        );
        assert_eq!(
            InvoiceStatus::Paid.available_actions(),
            vec![InvoiceAction::MarkPaid]
        );
    }

    #[test]
    fn send_requires_a_billable_draft() {
        let ok = invoice(InvoiceStatus::Draft, vec![("Trap", "1", "12")]);
        assert_eq!(authorize_send(&ok), Ok(InvoiceAction::Send));

        let empty = invoice(InvoiceStatus::Draft, vec![]);
        assert_eq!(authorize_send(&empty), Err(TransitionError::NoValidLineItems));

        let net_zero = invoice(
            InvoiceStatus::Draft,
            vec![("Trap", "1", "12"), ("Refund", "-1", "12")],
        );
        assert_eq!(authorize_send(&net_zero), Err(TransitionError::NonPositiveTotal));

        let sent = invoice(InvoiceStatus::Sent, vec![]);
        assert_eq!(authorize_send(&sent), Ok(InvoiceAction::Resend));

        let paid = invoice(InvoiceStatus::Paid, vec![("Trap", "1", "12")]);
        assert!(authorize_send(&paid).is_err());
    }

    #[test]
    fn status_changes_map_to_actions() {
        use InvoiceStatus::*;

        assert_eq!(authorize_status_change(Draft, Paid), Ok(InvoiceAction::MarkPaid));
        assert_eq!(authorize_status_change(Paid, Paid), Ok(InvoiceAction::MarkPaid));
        assert_eq!(authorize_status_change(Sent, Sent), Ok(InvoiceAction::Resend));
        assert_eq!(authorize_status_change(Draft, Draft), Ok(InvoiceAction::Edit));
        assert_eq!(
            authorize_status_change(Draft, Sent),
            Err(TransitionError::SendRequired)
        );
        assert!(authorize_status_change(Sent, Draft).is_err());
        assert!(authorize_status_change(Paid, Sent).is_err());
    }
}
