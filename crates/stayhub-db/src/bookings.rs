use crate::Database;
use crate::models::{BookingRow, ListingRef};
use crate::queries::OptionalExt;
use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row};
use stayhub_types::models::BookingStatus;
use tracing::info;

pub(crate) const BOOKING_SELECT: &str = "
    SELECT b.id, b.guest_id, b.property_id, b.experience_id,
           COALESCE(p.title, e.title), COALESCE(p.host_id, e.host_id),
           COALESCE(p.organization_id, e.organization_id),
           b.check_in, b.check_out, b.guests, b.total_price, b.currency, b.status,
           b.created_at, b.updated_at
    FROM bookings b
    LEFT JOIN properties p ON p.id = b.property_id
    LEFT JOIN experiences e ON e.id = b.experience_id";

/// Statuses that hold dates (see `BookingStatus::is_active`).
const ACTIVE_STATUSES: &str = "('PENDING', 'CONFIRMED')";

pub struct NewBooking {
    pub id: String,
    pub guest_id: String,
    pub listing: ListingRef,
    /// ISO dates, `check_in < check_out`.
    pub check_in: String,
    pub check_out: String,
    pub guests: i64,
    pub total_price: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingInsert {
    Created,
    /// Dates overlap an active booking, or the experience is full that day.
    Unavailable,
}

impl Database {
    /// Availability check and insert in one transaction on the writer, so two
    /// guests racing for the same dates cannot both get `Created`.
    pub fn create_booking(&self, b: &NewBooking) -> Result<BookingInsert> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let available = match &b.listing {
                ListingRef::Property(id) => property_available(&tx, id, &b.check_in, &b.check_out)?,
                ListingRef::Experience(id) => experience_has_room(&tx, id, &b.check_in, b.guests)?,
            };
            if !available {
                return Ok(BookingInsert::Unavailable);
            }

            tx.execute(
                "INSERT INTO bookings (id, guest_id, property_id, experience_id, check_in, check_out,
                     guests, total_price, currency, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'PENDING')",
                rusqlite::params![
                    b.id,
                    b.guest_id,
                    b.listing.property_id(),
                    b.listing.experience_id(),
                    b.check_in,
                    b.check_out,
                    b.guests,
                    b.total_price,
                    b.currency
                ],
            )?;
            tx.commit()?;

            info!("Booking {} created for guest {}", b.id, b.guest_id);
            Ok(BookingInsert::Created)
        })
    }

    pub fn get_booking(&self, id: &str) -> Result<Option<BookingRow>> {
        self.with_conn(|conn| query_booking(conn, id))
    }

    pub fn list_bookings_for_guest(&self, guest_id: &str) -> Result<Vec<BookingRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE b.guest_id = ?1 ORDER BY b.created_at DESC, b.rowid DESC", BOOKING_SELECT);
            query_bookings(conn, &sql, guest_id)
        })
    }

    pub fn list_bookings_for_host(&self, host_id: &str) -> Result<Vec<BookingRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE COALESCE(p.host_id, e.host_id) = ?1 ORDER BY b.check_in ASC, b.rowid ASC",
                BOOKING_SELECT
            );
            query_bookings(conn, &sql, host_id)
        })
    }

    /// Compare-and-set status update. Returns false when the booking is no
    /// longer in `from` (someone else moved it first).
    pub fn update_booking_status(&self, id: &str, from: BookingStatus, to: BookingStatus) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(anyhow!("illegal booking transition {} -> {}", from, to));
        }
        self.with_conn_mut(|conn| set_booking_status(conn, id, from, to))
    }

    /// Active date ranges on a property that end after `today`.
    pub fn booked_ranges(&self, property_id: &str, today: &str) -> Result<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT check_in, check_out FROM bookings
                 WHERE property_id = ?1 AND status IN {} AND check_out > ?2
                 ORDER BY check_in",
                ACTIVE_STATUSES
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([property_id, today], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn set_booking_status(
    conn: &Connection,
    id: &str,
    from: BookingStatus,
    to: BookingStatus,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE bookings SET status = ?3, updated_at = datetime('now') WHERE id = ?1 AND status = ?2",
        (id, from.as_str(), to.as_str()),
    )?;
    if changed > 0 {
        info!("Booking {} {} -> {}", id, from, to);
    }
    Ok(changed > 0)
}

pub(crate) fn query_booking(conn: &Connection, id: &str) -> Result<Option<BookingRow>> {
    let sql = format!("{} WHERE b.id = ?1", BOOKING_SELECT);
    conn.query_row(&sql, [id], booking_from_row).optional()
}

fn query_bookings(conn: &Connection, sql: &str, param: &str) -> Result<Vec<BookingRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([param], booking_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn property_available(conn: &Connection, property_id: &str, check_in: &str, check_out: &str) -> Result<bool> {
    // Half-open ranges: a stay ending on the 5th does not clash with one starting on the 5th.
    let sql = format!(
        "SELECT EXISTS(
             SELECT 1 FROM bookings
             WHERE property_id = ?1 AND status IN {} AND check_in < ?3 AND check_out > ?2
         )",
        ACTIVE_STATUSES
    );
    let clash: bool = conn.query_row(&sql, [property_id, check_in, check_out], |r| r.get(0))?;
    Ok(!clash)
}

fn experience_has_room(conn: &Connection, experience_id: &str, date: &str, guests: i64) -> Result<bool> {
    let capacity: Option<i64> = conn
        .query_row(
            "SELECT max_participants FROM experiences WHERE id = ?1",
            [experience_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(capacity) = capacity else {
        return Ok(false);
    };

    let sql = format!(
        "SELECT COALESCE(SUM(guests), 0) FROM bookings
         WHERE experience_id = ?1 AND status IN {} AND check_in = ?2",
        ACTIVE_STATUSES
    );
    let taken: i64 = conn.query_row(&sql, [experience_id, date], |r| r.get(0))?;
    Ok(taken.saturating_add(guests) <= capacity)
}

pub(crate) fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<BookingRow> {
    Ok(BookingRow {
        id: row.get(0)?,
        guest_id: row.get(1)?,
        property_id: row.get(2)?,
        experience_id: row.get(3)?,
        listing_title: row.get(4)?,
        listing_host_id: row.get(5)?,
        listing_organization_id: row.get(6)?,
        check_in: row.get(7)?,
        check_out: row.get(8)?,
        guests: row.get(9)?,
        total_price: row.get(10)?,
        currency: row.get(11)?,
        status: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}
