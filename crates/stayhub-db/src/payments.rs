use crate::Database;
use crate::bookings::set_booking_status;
use crate::models::PaymentRow;
use crate::queries::OptionalExt;
use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row};
use stayhub_types::models::{BookingStatus, PaymentStatus};
use tracing::info;

const PAYMENT_COLUMNS: &str = "id, booking_id, provider, provider_intent_id, client_secret, amount, currency,
     status, refund_id, created_at, updated_at";

pub struct NewPayment {
    pub id: String,
    pub booking_id: String,
    pub provider: String,
    pub provider_intent_id: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
}

/// Payment change applied together with a booking transition.
#[derive(Debug, Clone, Copy)]
pub struct PaymentUpdate<'a> {
    pub payment_id: &'a str,
    pub status: PaymentStatus,
    pub refund_id: Option<&'a str>,
}

impl Database {
    pub fn insert_payment(&self, p: &NewPayment) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO payments (id, booking_id, provider, provider_intent_id, client_secret,
                     amount, currency, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    p.id,
                    p.booking_id,
                    p.provider,
                    p.provider_intent_id,
                    p.client_secret,
                    p.amount,
                    p.currency,
                    p.status.as_str()
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_payment(&self, id: &str) -> Result<Option<PaymentRow>> {
        self.with_conn(|conn| query_payment(conn, "id", id))
    }

    pub fn get_payment_by_booking(&self, booking_id: &str) -> Result<Option<PaymentRow>> {
        self.with_conn(|conn| query_payment(conn, "booking_id", booking_id))
    }

    pub fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<PaymentRow>> {
        self.with_conn(|conn| query_payment(conn, "provider_intent_id", intent_id))
    }

    /// Point an existing payment at a fresh provider intent.
    pub fn attach_intent(
        &self,
        id: &str,
        intent_id: &str,
        client_secret: &str,
        status: PaymentStatus,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE payments
                 SET provider_intent_id = ?2, client_secret = ?3, status = ?4, updated_at = datetime('now')
                 WHERE id = ?1",
                (id, intent_id, client_secret, status.as_str()),
            )?;
            Ok(())
        })
    }

    pub fn update_payment_status(&self, id: &str, status: PaymentStatus) -> Result<()> {
        self.with_conn_mut(|conn| set_payment(conn, id, status, None))
    }

    /// Move a booking and (optionally) its payment in one transaction. Nothing
    /// is written when the booking is no longer in `from`.
    pub fn transition_booking(
        &self,
        booking_id: &str,
        from: BookingStatus,
        to: BookingStatus,
        payment: Option<PaymentUpdate<'_>>,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(anyhow!("illegal booking transition {} -> {}", from, to));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            if !set_booking_status(&tx, booking_id, from, to)? {
                return Ok(false);
            }
            if let Some(update) = payment {
                set_payment(&tx, update.payment_id, update.status, update.refund_id)?;
            }
            tx.commit()?;
            Ok(true)
        })
    }
}

fn set_payment(conn: &Connection, id: &str, status: PaymentStatus, refund_id: Option<&str>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE payments
         SET status = ?2, refund_id = COALESCE(?3, refund_id), updated_at = datetime('now')
         WHERE id = ?1",
        (id, status.as_str(), refund_id),
    )?;
    if changed == 0 {
        return Err(anyhow!("payment not found: {}", id));
    }
    info!("Payment {} -> {}", id, status);
    Ok(())
}

fn query_payment(conn: &Connection, column: &str, value: &str) -> Result<Option<PaymentRow>> {
    let sql = format!("SELECT {} FROM payments WHERE {} = ?1", PAYMENT_COLUMNS, column);
    conn.query_row(&sql, [value], payment_from_row).optional()
}

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<PaymentRow> {
    Ok(PaymentRow {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        provider: row.get(2)?,
        provider_intent_id: row.get(3)?,
        client_secret: row.get(4)?,
        amount: row.get(5)?,
        currency: row.get(6)?,
        status: row.get(7)?,
        refund_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
