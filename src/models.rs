//! Invoice data models (shared types between client and server)
//!
//! Money and rates are `Decimal`. They serialize as strings so nothing is lost in
//! transit, and deserialize from either strings or JSON numbers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::calculator::MINOR_UNIT_DP;
use crate::error::ValidationError;

/// The tradesperson's specialty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    #[default]
    Plumbing,
    Electrical,
    Hvac,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Plumbing => "plumbing",
            TradeType::Electrical => "electrical",
            TradeType::Hvac => "hvac",
        }
    }
}

/// Invoice lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
        }
    }
}

/// Line item grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineItemCategory {
    Parts,
    Labor,
}

impl LineItemCategory {
    /// Display and breakdown order
    pub const ALL: [LineItemCategory; 2] = [LineItemCategory::Parts, LineItemCategory::Labor];

    pub fn as_str(&self) -> &'static str {
        match self {
            LineItemCategory::Parts => "parts",
            LineItemCategory::Labor => "labor",
        }
    }
}

/// Error for enum values read back from storage or the command line
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

macro_rules! str_enum {
    ($ty:ident, $kind:literal, [$($variant:ident),+]) => {
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($ty::$variant.as_str()) {
                        return Ok($ty::$variant);
                    }
                )+
                Err(UnknownVariant {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }
    };
}

str_enum!(TradeType, "trade type", [Plumbing, Electrical, Hvac]);
str_enum!(InvoiceStatus, "invoice status", [Draft, Sent, Paid]);
str_enum!(LineItemCategory, "line item category", [Parts, Labor]);

/// One submitted line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemPayload {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub category: LineItemCategory,
}

/// Body of `POST /invoices` and `PUT /invoices/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePayload {
    pub client_name: String,
    pub client_email: String,
    pub job_address: String,
    pub trade_type: TradeType,
    pub tax_rate: Decimal,
    pub line_items: Vec<LineItemPayload>,
}

const MAX_NAME_LEN: usize = 255;
const MAX_ADDRESS_LEN: usize = 500;
const MAX_DESCRIPTION_LEN: usize = 500;

/// Quantities and prices are stored with 8 integer digits and 2 decimal places.
const MAX_AMOUNT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

impl InvoicePayload {
    /// Check field rules shared by the client pre-flight and the server.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("client_name", &self.client_name, MAX_NAME_LEN)?;
        require_text("client_email", &self.client_email, MAX_NAME_LEN)?;
        require_text("job_address", &self.job_address, MAX_ADDRESS_LEN)?;

        if self.tax_rate < Decimal::ZERO || self.tax_rate > Decimal::ONE_HUNDRED {
            return Err(ValidationError::TaxRateOutOfRange(self.tax_rate));
        }
        if exceeds_minor_unit(self.tax_rate) {
            return Err(ValidationError::TooPrecise("tax_rate"));
        }

        if self.line_items.is_empty() {
            return Err(ValidationError::NoValidLineItems);
        }

        for (index, item) in self.line_items.iter().enumerate() {
            if item.description.trim().is_empty() {
                return Err(ValidationError::LineItem {
                    index,
                    reason: "description is required",
                });
            }
            if item.description.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(ValidationError::LineItem {
                    index,
                    reason: "description is too long",
                });
            }
            if item.quantity <= Decimal::ZERO {
                return Err(ValidationError::LineItem {
                    index,
                    reason: "quantity must be greater than zero",
                });
            }
            if item.unit_price <= Decimal::ZERO {
                return Err(ValidationError::LineItem {
                    index,
                    reason: "unit price must be greater than zero",
                });
            }
            if item.quantity >= MAX_AMOUNT {
                return Err(ValidationError::LineItem {
                    index,
                    reason: "quantity must be below 100,000,000",
                });
            }
            if item.unit_price >= MAX_AMOUNT {
                return Err(ValidationError::LineItem {
                    index,
                    reason: "unit price must be below 100,000,000",
                });
            }
            if exceeds_minor_unit(item.quantity) {
                return Err(ValidationError::LineItem {
                    index,
                    reason: "quantity allows at most 2 decimal places",
                });
            }
            if exceeds_minor_unit(item.unit_price) {
                return Err(ValidationError::LineItem {
                    index,
                    reason: "unit price allows at most 2 decimal places",
                });
            }
        }

        Ok(())
    }
}

fn exceeds_minor_unit(amount: Decimal) -> bool {
    amount.normalize().scale() > MINOR_UNIT_DP
}

fn require_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Body of `PATCH /invoices/{id}/status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: InvoiceStatus,
}

/// A persisted line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: i64,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub category: LineItemCategory,
    pub line_total: Decimal,
}

/// Total for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: LineItemCategory,
    pub total: Decimal,
}

/// Computed monetary summary of an invoice
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    #[serde(default)]
    pub category_breakdown: Vec<CategoryTotal>,
}

/// A persisted invoice with server-computed totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub client_name: String,
    pub client_email: String,
    pub job_address: String,
    pub trade_type: TradeType,
    pub tax_rate: Decimal,
    pub status: InvoiceStatus,
    #[serde(default)]
    pub pdf_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    pub totals: Totals,
}

/// List-view projection of an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub id: i64,
    pub client_name: String,
    pub job_address: String,
    pub trade_type: TradeType,
    pub status: InvoiceStatus,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<&Invoice> for InvoiceSummary {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id,
            client_name: invoice.client_name.clone(),
            job_address: invoice.job_address.clone(),
            trade_type: invoice.trade_type,
            status: invoice.status,
            total: invoice.totals.total,
            created_at: invoice.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn payload() -> InvoicePayload {
        InvoicePayload {
            client_name: "Dana Ruiz".to_string(),
            client_email: "dana@example.com".to_string(),
            job_address: "12 Elm St".to_string(),
            trade_type: TradeType::Plumbing,
            tax_rate: d("8.25"),
            line_items: vec![LineItemPayload {
                description: "Water heater".to_string(),
                quantity: d("1"),
                unit_price: d("640"),
                category: LineItemCategory::Parts,
            }],
        }
    }

    #[test]
    fn enums_use_lowercase_wire_names() {
        assert_eq!(serde_json::to_string(&TradeType::Hvac).unwrap(), "\"hvac\"");
        assert_eq!(
            serde_json::from_str::<InvoiceStatus>("\"paid\"").unwrap(),
            InvoiceStatus::Paid
        );
        assert_eq!("Labor".parse::<LineItemCategory>().unwrap(), LineItemCategory::Labor);
        assert!("roofing".parse::<TradeType>().is_err());
    }

    #[test]
    fn decimals_accept_json_numbers() {
        let json = r#"{"description":"Pipe","quantity":1.5,"unit_price":"12.40","category":"parts"}"#;
        let item: LineItemPayload = serde_json::from_str(json).unwrap();
        assert_eq!(item.quantity, d("1.5"));
        assert_eq!(item.unit_price, d("12.40"));
    }

    #[test]
    fn valid_payload_passes() {
        assert_eq!(payload().validate(), Ok(()));
    }

    #[test]
    fn blank_client_fields_are_rejected() {
        let mut p = payload();
        p.job_address = "   ".to_string();
        assert_eq!(p.validate(), Err(ValidationError::MissingField("job_address")));
    }

    #[test]
    fn tax_rate_must_be_a_percentage() {
        let mut p = payload();
        p.tax_rate = d("100.01");
        assert!(matches!(
            p.validate(),
            Err(ValidationError::TaxRateOutOfRange(_))
        ));
    }

    #[test]
    fn amounts_fit_the_stored_precision() {
        let mut p = payload();
        p.line_items[0].quantity = d("79228162514264337593543950335");
        assert_eq!(
            p.validate(),
            Err(ValidationError::LineItem {
                index: 0,
                reason: "quantity must be below 100,000,000",
            })
        );

        let mut p = payload();
        p.line_items[0].unit_price = d("99999999.99");
        assert_eq!(p.validate(), Ok(()));
        p.line_items[0].unit_price = d("100000000");
        assert!(matches!(p.validate(), Err(ValidationError::LineItem { index: 0, .. })));

        let mut p = payload();
        p.line_items[0].unit_price = d("12.345");
        assert_eq!(
            p.validate(),
            Err(ValidationError::LineItem {
                index: 0,
                reason: "unit price allows at most 2 decimal places",
            })
        );
        p.line_items[0].unit_price = d("12.3400");
        assert_eq!(p.validate(), Ok(()));

        let mut p = payload();
        p.tax_rate = d("8.875");
        assert_eq!(p.validate(), Err(ValidationError::TooPrecise("tax_rate")));
    }

    #[test]
    fn line_items_are_checked() {
        let mut p = payload();
        p.line_items[0].quantity = Decimal::ZERO;
        assert!(matches!(
            p.validate(),
            Err(ValidationError::LineItem { index: 0, .. })
        ));

        p.line_items.clear();
        assert_eq!(p.validate(), Err(ValidationError::NoValidLineItems));
    }
}
