//! Database module for the invoice server

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::calculator::{self, compute_totals};
use crate::lifecycle;
use crate::models::{
    Invoice, InvoicePayload, InvoiceStatus, InvoiceSummary, LineItem, LineItemPayload, Totals,
};

/// Thread-safe database wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

const INVOICE_COLUMNS: &str = "id, client_name, client_email, job_address, trade_type, tax_rate, \
                               status, pdf_url, created_at, updated_at";

impl Database {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(path).context("Failed to open database")?;
        Self::with_connection(conn)
    }

    /// Throwaway database, for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Money and rates are stored as decimal text
            CREATE TABLE IF NOT EXISTS invoices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_name TEXT NOT NULL,
                client_email TEXT NOT NULL,
                job_address TEXT NOT NULL,
                trade_type TEXT NOT NULL,
                tax_rate TEXT NOT NULL DEFAULT '0',
                status TEXT NOT NULL DEFAULT 'draft',
                pdf_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT
            );

            CREATE TABLE IF NOT EXISTS line_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                invoice_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                description TEXT NOT NULL,
                quantity TEXT NOT NULL,
                unit_price TEXT NOT NULL,
                category TEXT NOT NULL,
                FOREIGN KEY (invoice_id) REFERENCES invoices(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_invoices_created ON invoices(created_at);
            CREATE INDEX IF NOT EXISTS idx_line_items_invoice ON line_items(invoice_id, position);
            "#,
        )?;

        Ok(())
    }

    /// All invoices as list rows, newest first
    pub fn list_summaries(&self) -> Result<Vec<InvoiceSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY created_at DESC, id DESC"
        ))?;
        let headers = stmt
            .query_map([], invoice_header)?
            .collect::<Result<Vec<_>, _>>()?;

        headers
            .into_iter()
            .map(|header| -> Result<InvoiceSummary> {
                let invoice = attach_line_items(&conn, header)?;
                Ok(InvoiceSummary::from(&invoice))
            })
            .collect()
    }

    /// Fetch one invoice with its line items and totals
    pub fn get_invoice(&self, id: i64) -> Result<Option<Invoice>> {
        let conn = self.conn()?;
        load_invoice(&conn, id)
    }

    /// Insert a new draft invoice
    pub fn create_invoice(&self, payload: &InvoicePayload) -> Result<Invoice> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO invoices (client_name, client_email, job_address, trade_type,
               tax_rate, status, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                &payload.client_name,
                &payload.client_email,
                &payload.job_address,
                payload.trade_type.as_str(),
                payload.tax_rate.to_string(),
                InvoiceStatus::Draft.as_str(),
                Utc::now(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        insert_line_items(&tx, id, &payload.line_items)?;
        tx.commit()?;

        tracing::debug!(invoice_id = id, items = payload.line_items.len(), "Invoice stored");

        load_invoice(&conn, id)?.context("Invoice missing after insert")
    }

    /// Replace client fields and line items of a draft.
    ///
    /// The status is checked in the same transaction as the write, so an invoice sent or
    /// paid in the meantime is refused with a [`TransitionError`].
    pub fn update_draft(&self, id: i64, payload: &InvoicePayload) -> Result<Option<Invoice>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let Some(status) = stored_status(&tx, id)? else {
            return Ok(None);
        };
        lifecycle::authorize_edit(status)?;

        tx.execute(
            r#"UPDATE invoices SET client_name = ?2, client_email = ?3, job_address = ?4,
               trade_type = ?5, tax_rate = ?6, updated_at = ?7
               WHERE id = ?1"#,
            params![
                id,
                &payload.client_name,
                &payload.client_email,
                &payload.job_address,
                payload.trade_type.as_str(),
                payload.tax_rate.to_string(),
                Utc::now(),
            ],
        )?;
        tx.execute("DELETE FROM line_items WHERE invoice_id = ?1", params![id])?;
        insert_line_items(&tx, id, &payload.line_items)?;
        tx.commit()?;

        load_invoice(&conn, id)
    }

    /// Move an invoice to `status` if the stored status allows it.
    pub fn change_status(&self, id: i64, status: InvoiceStatus) -> Result<Option<Invoice>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let Some(from) = stored_status(&tx, id)? else {
            return Ok(None);
        };
        lifecycle::authorize_status_change(from, status)?;
        write_status(&tx, id, status, None)?;
        tx.commit()?;

        load_invoice(&conn, id)
    }

    /// Send or re-send an invoice and record where its PDF lives.
    pub fn send_invoice(&self, id: i64, pdf_url: &str) -> Result<Option<Invoice>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let Some(invoice) = load_invoice(&tx, id)? else {
            return Ok(None);
        };
        let action = lifecycle::authorize_send(&invoice)?;
        let status = invoice.status.apply(action)?;
        write_status(&tx, id, status, Some(pdf_url))?;
        tx.commit()?;

        load_invoice(&conn, id)
    }
}

fn stored_status(conn: &Connection, id: i64) -> Result<Option<InvoiceStatus>> {
    let status = conn
        .query_row(
            "SELECT status FROM invoices WHERE id = ?1",
            params![id],
            |row| parsed_column(row, 0),
        )
        .optional()?;
    Ok(status)
}

/// Set the status, and the PDF location when one is given
fn write_status(
    conn: &Connection,
    id: i64,
    status: InvoiceStatus,
    pdf_url: Option<&str>,
) -> Result<()> {
    conn.execute(
        r#"UPDATE invoices SET status = ?2, pdf_url = COALESCE(?3, pdf_url), updated_at = ?4
           WHERE id = ?1"#,
        params![id, status.as_str(), pdf_url, Utc::now()],
    )?;
    Ok(())
}

fn insert_line_items(conn: &Connection, invoice_id: i64, items: &[LineItemPayload]) -> Result<()> {
    let mut stmt = conn.prepare(
        r#"INSERT INTO line_items (invoice_id, position, description, quantity, unit_price, category)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
    )?;
    for (position, item) in items.iter().enumerate() {
        stmt.execute(params![
            invoice_id,
            position as i64,
            &item.description,
            item.quantity.to_string(),
            item.unit_price.to_string(),
            item.category.as_str(),
        ])?;
    }
    Ok(())
}

fn load_invoice(conn: &Connection, id: i64) -> Result<Option<Invoice>> {
    let header = conn
        .query_row(
            &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1"),
            params![id],
            invoice_header,
        )
        .optional()?;

    header.map(|header| attach_line_items(conn, header)).transpose()
}

/// Load line items and compute the stored totals.
///
/// Line totals keep full precision; only the invoice totals are rounded, once.
fn attach_line_items(conn: &Connection, mut invoice: Invoice) -> Result<Invoice> {
    let mut stmt = conn.prepare(
        "SELECT id, description, quantity, unit_price, category FROM line_items
         WHERE invoice_id = ?1 ORDER BY position",
    )?;
    invoice.line_items = stmt
        .query_map(params![invoice.id], |row| {
            let quantity = parsed_column::<Decimal>(row, 2)?;
            let unit_price = parsed_column::<Decimal>(row, 3)?;
            Ok(LineItem {
                id: row.get(0)?,
                description: row.get(1)?,
                quantity,
                unit_price,
                category: parsed_column(row, 4)?,
                line_total: calculator::line_total(quantity, unit_price),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    invoice.totals = compute_totals(&invoice.line_items, invoice.tax_rate).rounded();
    Ok(invoice)
}

fn invoice_header(row: &Row) -> rusqlite::Result<Invoice> {
    Ok(Invoice {
        id: row.get(0)?,
        client_name: row.get(1)?,
        client_email: row.get(2)?,
        job_address: row.get(3)?,
        trade_type: parsed_column(row, 4)?,
        tax_rate: parsed_column::<Decimal>(row, 5)?,
        status: parsed_column(row, 6)?,
        pdf_url: row.get(7)?,
        created_at: row.get::<_, DateTime<Utc>>(8)?,
        updated_at: row.get::<_, Option<DateTime<Utc>>>(9)?,
        line_items: Vec::new(), // Filled by attach_line_items
        totals: Totals::default(),
    })
}

fn parsed_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::TransitionError;
    use crate::models::{LineItemCategory, TradeType};

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn payload(client: &str) -> InvoicePayload {
        InvoicePayload {
            client_name: client.to_string(),
            client_email: "client@example.com".to_string(),
            job_address: "77 Harbor Way".to_string(),
            trade_type: TradeType::Hvac,
            tax_rate: d("8.25"),
            line_items: vec![
                LineItemPayload {
                    description: "Capacitor".to_string(),
                    quantity: d("2"),
                    unit_price: d("50"),
                    category: LineItemCategory::Parts,
                },
                LineItemPayload {
                    description: "Service call".to_string(),
                    quantity: d("1.5"),
                    unit_price: d("80"),
                    category: LineItemCategory::Labor,
                },
            ],
        }
    }

    #[test]
    fn create_and_load_round_trip_totals() {
        let db = Database::open_in_memory().unwrap();
        let invoice = db.create_invoice(&payload("Rosa")).unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert_eq!(invoice.line_items.len(), 2);
        assert_eq!(invoice.line_items[0].description, "Capacitor");
        assert_eq!(invoice.line_items[1].line_total, d("120"));
        assert_eq!(invoice.totals.subtotal, d("220"));
        assert_eq!(invoice.totals.tax_amount, d("18.15"));
        assert_eq!(invoice.totals.total, d("238.15"));

        let loaded = db.get_invoice(invoice.id).unwrap().unwrap();
        assert_eq!(loaded, invoice);
    }

    #[test]
    fn list_is_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let first = db.create_invoice(&payload("First")).unwrap();
        let second = db.create_invoice(&payload("Second")).unwrap();

        let list = db.list_summaries().unwrap();
        let ids: Vec<_> = list.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(list[0].total, d("238.15"));
    }

    #[test]
    fn update_draft_swaps_line_items() {
        let db = Database::open_in_memory().unwrap();
        let invoice = db.create_invoice(&payload("Rosa")).unwrap();

        let mut changed = payload("Rosa Diaz");
        changed.line_items.truncate(1);
        changed.tax_rate = Decimal::ZERO;

        let updated = db.update_draft(invoice.id, &changed).unwrap().unwrap();
        assert_eq!(updated.client_name, "Rosa Diaz");
        assert_eq!(updated.line_items.len(), 1);
        assert_eq!(updated.totals.total, d("100"));
        assert!(updated.updated_at.is_some());

        assert!(db.update_draft(999, &changed).unwrap().is_none());
    }

    #[test]
    fn update_after_send_is_refused_without_writing() {
        let db = Database::open_in_memory().unwrap();
        let invoice = db.create_invoice(&payload("Rosa")).unwrap();
        db.send_invoice(invoice.id, "https://pdf/1.pdf").unwrap().unwrap();

        let mut changed = payload("Rosa");
        changed.line_items.truncate(1);
        let err = db.update_draft(invoice.id, &changed).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TransitionError>(),
            Some(TransitionError::NotPermitted { .. })
        ));
        let stored = db.get_invoice(invoice.id).unwrap().unwrap();
        assert_eq!(stored.line_items.len(), 2);
        assert_eq!(stored.status, InvoiceStatus::Sent);
    }

    #[test]
    fn send_records_pdf_url_and_paid_keeps_it() {
        let db = Database::open_in_memory().unwrap();
        let invoice = db.create_invoice(&payload("Rosa")).unwrap();

        let sent = db.send_invoice(invoice.id, "https://pdf/1.pdf").unwrap().unwrap();
        assert_eq!(sent.status, InvoiceStatus::Sent);
        assert_eq!(sent.pdf_url.as_deref(), Some("https://pdf/1.pdf"));

        let paid = db
            .change_status(invoice.id, InvoiceStatus::Paid)
            .unwrap()
            .unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.pdf_url.as_deref(), Some("https://pdf/1.pdf"));

        assert!(db.change_status(999, InvoiceStatus::Paid).unwrap().is_none());
        assert!(db.send_invoice(999, "https://pdf/999.pdf").unwrap().is_none());
    }

    #[test]
    fn paid_invoice_is_not_sent_again() {
        let db = Database::open_in_memory().unwrap();
        let invoice = db.create_invoice(&payload("Rosa")).unwrap();
        db.change_status(invoice.id, InvoiceStatus::Paid).unwrap().unwrap();

        let err = db.send_invoice(invoice.id, "https://pdf/1.pdf").unwrap_err();

        assert!(err.downcast_ref::<TransitionError>().is_some());
        let stored = db.get_invoice(invoice.id).unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::Paid);
        assert_eq!(stored.pdf_url, None);
    }

    #[test]
    fn status_change_cannot_skip_sending() {
        let db = Database::open_in_memory().unwrap();
        let invoice = db.create_invoice(&payload("Rosa")).unwrap();

        let err = db
            .change_status(invoice.id, InvoiceStatus::Sent)
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<TransitionError>(),
            Some(&TransitionError::SendRequired)
        );
    }

    #[test]
    fn totals_round_once_like_the_client() {
        let db = Database::open_in_memory().unwrap();
        let mut p = payload("Rosa");
        p.tax_rate = Decimal::ZERO;
        p.line_items = (0..3)
            .map(|i| LineItemPayload {
                description: format!("Washer {i}"),
                quantity: d("0.5"),
                unit_price: d("0.01"),
                category: LineItemCategory::Parts,
            })
            .collect();

        let invoice = db.create_invoice(&p).unwrap();

        assert_eq!(invoice.line_items[0].line_total, d("0.005"));
        assert_eq!(invoice.totals.subtotal, d("0.02"));
        assert_eq!(invoice.totals, compute_totals(&p.line_items, p.tax_rate).rounded());
    }

    #[test]
    fn oversized_stored_amounts_do_not_break_the_database() {
        let db = Database::open_in_memory().unwrap();
        let mut p = payload("Rosa");
        p.line_items[0].quantity = d("79228162514264337593543950335");

        let invoice = db.create_invoice(&p).unwrap();
        assert_eq!(invoice.line_items[0].line_total, Decimal::ZERO);
        assert_eq!(invoice.totals.subtotal, d("120"));

        assert_eq!(db.list_summaries().unwrap().len(), 1);
        db.create_invoice(&payload("Next")).unwrap();
        assert_eq!(db.list_summaries().unwrap().len(), 2);
    }
}
