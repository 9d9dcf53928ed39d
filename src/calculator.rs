//! Money and tax computation
//!
//! Totals accumulate at full decimal precision. Rounding to the minor unit happens once,
//! in [`Totals::rounded`], when totals are persisted or shown.
//!
//! Every function here is total. An amount that does not fit in a `Decimal` contributes
//! zero instead of panicking, so a runaway number typed into the editor never crashes the
//! preview. Validated payloads are bounded well below that range.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{CategoryTotal, LineItem, LineItemCategory, LineItemPayload, Totals};

/// Digits after the decimal point for the currency's minor unit
pub const MINOR_UNIT_DP: u32 = 2;

/// Anything that contributes `quantity × unit_price` to an invoice
pub trait Billable {
    fn category(&self) -> LineItemCategory;
    fn quantity(&self) -> Decimal;
    fn unit_price(&self) -> Decimal;

    fn line_total(&self) -> Decimal {
        line_total(self.quantity(), self.unit_price())
    }
}

/// `quantity × unit_price` at full precision, or zero if the product overflows.
pub fn line_total(quantity: Decimal, unit_price: Decimal) -> Decimal {
    quantity.checked_mul(unit_price).unwrap_or(Decimal::ZERO)
}

impl Billable for LineItemPayload {
    fn category(&self) -> LineItemCategory {
        self.category
    }

    fn quantity(&self) -> Decimal {
        self.quantity
    }

    fn unit_price(&self) -> Decimal {
        self.unit_price
    }
}

/// Persisted items carry the line total the server computed.
impl Billable for LineItem {
    fn category(&self) -> LineItemCategory {
        self.category
    }

    fn quantity(&self) -> Decimal {
        self.quantity
    }

    fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    fn line_total(&self) -> Decimal {
        self.line_total
    }
}

/// Compute totals over every supplied item.
///
/// Nothing is filtered and nothing fails. Negative quantities or prices contribute
/// negative amounts; rejecting them is the editor's job. A line that would overflow the
/// running sum is left out of it.
pub fn compute_totals<'a, B, I>(items: I, tax_rate: Decimal) -> Totals
where
    B: Billable + 'a,
    I: IntoIterator<Item = &'a B>,
{
    let mut subtotal = Decimal::ZERO;
    let mut by_category = [Decimal::ZERO; LineItemCategory::ALL.len()];

    for item in items {
        let line_total = item.line_total();
        let slot = &mut by_category[category_slot(item.category())];
        if let (Some(new_subtotal), Some(new_slot)) =
            (subtotal.checked_add(line_total), slot.checked_add(line_total))
        {
            subtotal = new_subtotal;
            *slot = new_slot;
        }
    }

    let (tax_amount, total) = add_tax(subtotal, tax_rate);

    let category_breakdown = LineItemCategory::ALL
        .iter()
        .zip(by_category)
        .filter(|(_, total)| !total.is_zero())
        .map(|(category, total)| CategoryTotal {
            category: *category,
            total,
        })
        .collect();

    Totals {
        subtotal,
        tax_amount,
        total,
        category_breakdown,
    }
}

/// Tax on `subtotal` and the resulting total. Tax drops to zero if either overflows.
fn add_tax(subtotal: Decimal, tax_rate: Decimal) -> (Decimal, Decimal) {
    subtotal
        .checked_mul(tax_rate)
        .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
        .and_then(|tax| Some((tax, subtotal.checked_add(tax)?)))
        .unwrap_or((Decimal::ZERO, subtotal))
}

fn category_slot(category: LineItemCategory) -> usize {
    match category {
        LineItemCategory::Parts => 0,
        LineItemCategory::Labor => 1,
    }
}

/// Round half away from zero to the minor unit.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MINOR_UNIT_DP, RoundingStrategy::MidpointAwayFromZero)
}

impl Totals {
    /// Totals at minor-unit precision.
    ///
    /// Subtotal and tax are rounded on their own and the total is re-derived from them,
    /// so `total == subtotal + tax_amount` still holds exactly.
    pub fn rounded(&self) -> Totals {
        let subtotal = round_money(self.subtotal);
        let tax_amount = round_money(self.tax_amount);
        let (tax_amount, total) = subtotal
            .checked_add(tax_amount)
            .map_or((Decimal::ZERO, subtotal), |total| (tax_amount, total));

        Totals {
            subtotal,
            tax_amount,
            total,
            category_breakdown: self
                .category_breakdown
                .iter()
                .map(|entry| CategoryTotal {
                    category: entry.category,
                    total: round_money(entry.total),
                })
                .collect(),
        }
    }

    pub fn category_total(&self, category: LineItemCategory) -> Decimal {
        self.category_breakdown
            .iter()
            .find(|entry| entry.category == category)
            .map(|entry| entry.total)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Format an amount for display, e.g. `$1,234.50` or `-$3.10`.
pub fn format_money(amount: Decimal) -> String {
    let rounded = round_money(amount);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };

    let plain = format!("{:.2}", rounded.abs());
    let (whole, cents) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{sign}${grouped}.{cents}")
}
