//! Client-side invoice drafting: line item rows and intake fields

use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use crate::calculator::{Billable, compute_totals};
use crate::error::ValidationError;
use crate::models::{Invoice, InvoicePayload, LineItemCategory, LineItemPayload, TradeType, Totals};

/// Tax rate pre-filled on a new draft
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(825, 0, 0, false, 2);

/// A line item row as typed by the user.
///
/// Quantity and price are kept as entered so a half-typed number never blocks the
/// preview. The `id` is local to the editor and never submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftLineItem {
    pub id: Uuid,
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
    pub category: LineItemCategory,
}

impl DraftLineItem {
    /// A fresh row: no description, quantity 1, no price.
    pub fn empty(category: LineItemCategory) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: String::new(),
            quantity: "1".to_string(),
            unit_price: String::new(),
            category,
        }
    }

    /// Whether this row passes the submission filter.
    pub fn is_valid(&self) -> bool {
        !self.description.trim().is_empty()
            && parse_amount(&self.unit_price).is_some_and(|price| price > Decimal::ZERO)
    }

    fn to_payload(&self) -> Option<LineItemPayload> {
        if !self.is_valid() {
            return None;
        }

        let quantity = parse_amount(&self.quantity)
            .filter(|qty| !qty.is_zero())
            .unwrap_or(Decimal::ONE);

        Some(LineItemPayload {
            description: self.description.trim().to_string(),
            quantity,
            unit_price: parse_amount(&self.unit_price)?,
            category: self.category,
        })
    }
}

impl Billable for DraftLineItem {
    fn category(&self) -> LineItemCategory {
        self.category
    }

    fn quantity(&self) -> Decimal {
        parse_amount(&self.quantity).unwrap_or(Decimal::ZERO)
    }

    fn unit_price(&self) -> Decimal {
        parse_amount(&self.unit_price).unwrap_or(Decimal::ZERO)
    }
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw).ok()
}

/// Editable field of a [`DraftLineItem`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineItemField {
    Description,
    Quantity,
    UnitPrice,
}

/// Two ordered groups of draft rows, parts and labor.
///
/// Neither group is ever empty: it starts with one blank row and removing the last
/// row leaves a blank one in its place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemEditor {
    parts: Vec<DraftLineItem>,
    labor: Vec<DraftLineItem>,
}

impl Default for LineItemEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl LineItemEditor {
    pub fn new() -> Self {
        Self {
            parts: vec![DraftLineItem::empty(LineItemCategory::Parts)],
            labor: vec![DraftLineItem::empty(LineItemCategory::Labor)],
        }
    }

    /// Build an editor from persisted rows, e.g. when editing an existing invoice.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = DraftLineItem>,
    {
        let mut editor = Self {
            parts: Vec::new(),
            labor: Vec::new(),
        };
        for item in items {
            editor.group_mut(item.category).push(item);
        }
        for category in LineItemCategory::ALL {
            if editor.group(category).is_empty() {
                editor.group_mut(category).push(DraftLineItem::empty(category));
            }
        }
        editor
    }

    pub fn parts(&self) -> &[DraftLineItem] {
        &self.parts
    }

    pub fn labor(&self) -> &[DraftLineItem] {
        &self.labor
    }

    pub fn group(&self, category: LineItemCategory) -> &[DraftLineItem] {
        match category {
            LineItemCategory::Parts => &self.parts,
            LineItemCategory::Labor => &self.labor,
        }
    }

    fn group_mut(&mut self, category: LineItemCategory) -> &mut Vec<DraftLineItem> {
        match category {
            LineItemCategory::Parts => &mut self.parts,
            LineItemCategory::Labor => &mut self.labor,
        }
    }

    /// All rows, parts first.
    pub fn items(&self) -> impl Iterator<Item = &DraftLineItem> {
        self.parts.iter().chain(self.labor.iter())
    }

    /// Append a blank row and return its id.
    pub fn add_item(&mut self, category: LineItemCategory) -> Uuid {
        let item = DraftLineItem::empty(category);
        let id = item.id;
        self.group_mut(category).push(item);
        id
    }

    /// Replace one field of one row. Unknown ids are ignored.
    pub fn update_item(
        &mut self,
        category: LineItemCategory,
        id: Uuid,
        field: LineItemField,
        value: impl Into<String>,
    ) {
        let Some(item) = self.group_mut(category).iter_mut().find(|item| item.id == id) else {
            return;
        };

        let value = value.into();
        match field {
            LineItemField::Description => item.description = value,
            LineItemField::Quantity => item.quantity = value,
            LineItemField::UnitPrice => item.unit_price = value,
        }
    }

    /// Remove a row. The last row of a group is replaced by a blank one.
    pub fn remove_item(&mut self, category: LineItemCategory, id: Uuid) {
        let group = self.group_mut(category);
        group.retain(|item| item.id != id);
        if group.is_empty() {
            group.push(DraftLineItem::empty(category));
        }
    }

    /// Rows that pass the submission filter, as payloads.
    ///
    /// This is the only path from rows to submitted line items, for new and edited
    /// invoices alike.
    pub fn valid_items(&self) -> Vec<LineItemPayload> {
        self.items().filter_map(DraftLineItem::to_payload).collect()
    }

    /// Live totals over every row, complete or not.
    pub fn preview(&self, tax_rate: Decimal) -> Totals {
        compute_totals(self.items(), tax_rate)
    }
}

/// An invoice being written, before or while it is submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDraft {
    pub trade_type: TradeType,
    pub client_name: String,
    pub client_email: String,
    pub job_address: String,
    pub tax_rate: Decimal,
    pub items: LineItemEditor,
}

impl Default for InvoiceDraft {
    fn default() -> Self {
        Self {
            trade_type: TradeType::default(),
            client_name: String::new(),
            client_email: String::new(),
            job_address: String::new(),
            tax_rate: DEFAULT_TAX_RATE,
            items: LineItemEditor::new(),
        }
    }
}

impl InvoiceDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-fill a draft from an existing invoice for editing.
    pub fn from_invoice(invoice: &Invoice) -> Self {
        let rows = invoice.line_items.iter().map(|item| DraftLineItem {
            id: Uuid::new_v4(),
            description: item.description.clone(),
            quantity: item.quantity.normalize().to_string(),
            unit_price: item.unit_price.normalize().to_string(),
            category: item.category,
        });

        Self {
            trade_type: invoice.trade_type,
            client_name: invoice.client_name.clone(),
            client_email: invoice.client_email.clone(),
            job_address: invoice.job_address.clone(),
            tax_rate: invoice.tax_rate,
            items: LineItemEditor::from_items(rows),
        }
    }

    /// Client name, email and job address are all filled in.
    pub fn intake_complete(&self) -> bool {
        [&self.client_name, &self.client_email, &self.job_address]
            .iter()
            .all(|field| !field.trim().is_empty())
    }

    pub fn preview(&self) -> Totals {
        self.items.preview(self.tax_rate)
    }

    /// Build the submission body, dropping incomplete rows.
    pub fn to_payload(&self) -> Result<InvoicePayload, ValidationError> {
        let line_items = self.items.valid_items();
        if line_items.is_empty() {
            return Err(ValidationError::NoValidLineItems);
        }

        let payload = InvoicePayload {
            client_name: self.client_name.trim().to_string(),
            client_email: self.client_email.trim().to_string(),
            job_address: self.job_address.trim().to_string(),
            trade_type: self.trade_type,
            tax_rate: self.tax_rate,
            line_items,
        };
        payload.validate()?;
        Ok(payload)
    }
}
