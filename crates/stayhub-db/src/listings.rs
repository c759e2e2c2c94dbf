use crate::Database;
use crate::models::{ExperienceRow, ListingRef, PropertyRow};
use crate::queries::OptionalExt;
use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params_from_iter};

const PROPERTY_SELECT: &str = "
    SELECT p.id, p.organization_id, p.host_id, p.title, p.description, p.location,
           p.price_per_night, p.cleaning_fee, p.currency, p.max_guests, p.bedrooms, p.bathrooms,
           r.avg_rating, COALESCE(r.cnt, 0), p.created_at, p.updated_at
    FROM properties p
    JOIN organizations o ON o.id = p.organization_id
    LEFT JOIN (
        SELECT property_id, AVG(rating) AS avg_rating, COUNT(*) AS cnt
        FROM reviews WHERE property_id IS NOT NULL GROUP BY property_id
    ) r ON r.property_id = p.id";

const EXPERIENCE_SELECT: &str = "
    SELECT p.id, p.organization_id, p.host_id, p.title, p.description, p.location,
           p.price_per_person, p.currency, p.duration_minutes, p.max_participants,
           r.avg_rating, COALESCE(r.cnt, 0), p.created_at, p.updated_at
    FROM experiences p
    JOIN organizations o ON o.id = p.organization_id
    LEFT JOIN (
        SELECT experience_id, AVG(rating) AS avg_rating, COUNT(*) AS cnt
        FROM reviews WHERE experience_id IS NOT NULL GROUP BY experience_id
    ) r ON r.experience_id = p.id";

/// Public search filters shared by properties and experiences.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub org_slug: Option<String>,
    pub location: Option<String>,
    /// Listing capacity must be at least this.
    pub min_capacity: Option<i64>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

pub struct NewProperty {
    pub id: String,
    pub organization_id: String,
    pub host_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price_per_night: i64,
    pub cleaning_fee: i64,
    pub currency: String,
    pub max_guests: i64,
    pub bedrooms: i64,
    pub bathrooms: i64,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct PropertyChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub price_per_night: Option<i64>,
    pub cleaning_fee: Option<i64>,
    pub currency: Option<String>,
    pub max_guests: Option<i64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
}

pub struct NewExperience {
    pub id: String,
    pub organization_id: String,
    pub host_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price_per_person: i64,
    pub currency: String,
    pub duration_minutes: i64,
    pub max_participants: i64,
}

#[derive(Debug, Default)]
pub struct ExperienceChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub price_per_person: Option<i64>,
    pub currency: Option<String>,
    pub duration_minutes: Option<i64>,
    pub max_participants: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    HasBookings,
    NotFound,
}

impl Database {
    // -- Properties --

    pub fn insert_property(&self, p: &NewProperty) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO properties (id, organization_id, host_id, title, description, location,
                     price_per_night, cleaning_fee, currency, max_guests, bedrooms, bathrooms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    p.id,
                    p.organization_id,
                    p.host_id,
                    p.title,
                    p.description,
                    p.location,
                    p.price_per_night,
                    p.cleaning_fee,
                    p.currency,
                    p.max_guests,
                    p.bedrooms,
                    p.bathrooms
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_property(&self, id: &str) -> Result<Option<PropertyRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE p.id = ?1", PROPERTY_SELECT);
            conn.query_row(&sql, [id], property_from_row).optional()
        })
    }

    pub fn list_properties(&self, filter: &ListingFilter) -> Result<Vec<PropertyRow>> {
        self.with_conn(|conn| {
            let (clause, params) = filter_clause(filter, "price_per_night", "max_guests");
            let sql = format!(
                "{} WHERE 1 = 1{} ORDER BY p.created_at DESC, p.rowid DESC LIMIT ? OFFSET ?",
                PROPERTY_SELECT, clause
            );
            collect(conn, &sql, params, property_from_row)
        })
    }

    pub fn list_properties_by_host(&self, host_id: &str) -> Result<Vec<PropertyRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE p.host_id = ? ORDER BY p.created_at DESC, p.rowid DESC", PROPERTY_SELECT);
            collect(conn, &sql, vec![Value::Text(host_id.to_string())], property_from_row)
        })
    }

    pub fn update_property(&self, id: &str, c: &PropertyChanges) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE properties SET
                     title = COALESCE(?2, title),
                     description = COALESCE(?3, description),
                     location = COALESCE(?4, location),
                     price_per_night = COALESCE(?5, price_per_night),
                     cleaning_fee = COALESCE(?6, cleaning_fee),
                     currency = COALESCE(?7, currency),
                     max_guests = COALESCE(?8, max_guests),
                     bedrooms = COALESCE(?9, bedrooms),
                     bathrooms = COALESCE(?10, bathrooms),
                     updated_at = datetime('now')
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    c.title,
                    c.description,
                    c.location,
                    c.price_per_night,
                    c.cleaning_fee,
                    c.currency,
                    c.max_guests,
                    c.bedrooms,
                    c.bathrooms
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_property(&self, id: &str) -> Result<DeleteOutcome> {
        self.with_conn_mut(|conn| delete_listing(conn, "properties", "property_id", id))
    }

    // -- Experiences --

    pub fn insert_experience(&self, e: &NewExperience) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO experiences (id, organization_id, host_id, title, description, location,
                     price_per_person, currency, duration_minutes, max_participants)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    e.id,
                    e.organization_id,
                    e.host_id,
                    e.title,
                    e.description,
                    e.location,
                    e.price_per_person,
                    e.currency,
                    e.duration_minutes,
                    e.max_participants
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_experience(&self, id: &str) -> Result<Option<ExperienceRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE p.id = ?1", EXPERIENCE_SELECT);
            conn.query_row(&sql, [id], experience_from_row).optional()
        })
    }

    pub fn list_experiences(&self, filter: &ListingFilter) -> Result<Vec<ExperienceRow>> {
        self.with_conn(|conn| {
            let (clause, params) = filter_clause(filter, "price_per_person", "max_participants");
            let sql = format!(
                "{} WHERE 1 = 1{} ORDER BY p.created_at DESC, p.rowid DESC LIMIT ? OFFSET ?",
                EXPERIENCE_SELECT, clause
            );
            collect(conn, &sql, params, experience_from_row)
        })
    }

    pub fn list_experiences_by_host(&self, host_id: &str) -> Result<Vec<ExperienceRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE p.host_id = ? ORDER BY p.created_at DESC, p.rowid DESC", EXPERIENCE_SELECT);
            collect(conn, &sql, vec![Value::Text(host_id.to_string())], experience_from_row)
        })
    }

    pub fn update_experience(&self, id: &str, c: &ExperienceChanges) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE experiences SET
                     title = COALESCE(?2, title),
                     description = COALESCE(?3, description),
                     location = COALESCE(?4, location),
                     price_per_person = COALESCE(?5, price_per_person),
                     currency = COALESCE(?6, currency),
                     duration_minutes = COALESCE(?7, duration_minutes),
                     max_participants = COALESCE(?8, max_participants),
                     updated_at = datetime('now')
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    c.title,
                    c.description,
                    c.location,
                    c.price_per_person,
                    c.currency,
                    c.duration_minutes,
                    c.max_participants
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_experience(&self, id: &str) -> Result<DeleteOutcome> {
        self.with_conn_mut(|conn| delete_listing(conn, "experiences", "experience_id", id))
    }

    pub fn listing_exists(&self, listing: &ListingRef) -> Result<bool> {
        self.with_conn(|conn| {
            let (table, id) = match listing {
                ListingRef::Property(id) => ("properties", id),
                ListingRef::Experience(id) => ("experiences", id),
            };
            let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table);
            let exists: bool = conn.query_row(&sql, [id], |r| r.get(0))?;
            Ok(exists)
        })
    }
}

fn filter_clause(filter: &ListingFilter, price_col: &str, capacity_col: &str) -> (String, Vec<Value>) {
    let mut clause = String::new();
    let mut params = Vec::new();

    if let Some(slug) = &filter.org_slug {
        clause.push_str(" AND o.slug = ?");
        params.push(Value::Text(slug.clone()));
    }
    if let Some(location) = &filter.location {
        clause.push_str(" AND instr(lower(p.location), lower(?)) > 0");
        params.push(Value::Text(location.clone()));
    }
    if let Some(capacity) = filter.min_capacity {
        clause.push_str(&format!(" AND p.{} >= ?", capacity_col));
        params.push(Value::Integer(capacity));
    }
    if let Some(min) = filter.min_price {
        clause.push_str(&format!(" AND p.{} >= ?", price_col));
        params.push(Value::Integer(min));
    }
    if let Some(max) = filter.max_price {
        clause.push_str(&format!(" AND p.{} <= ?", price_col));
        params.push(Value::Integer(max));
    }

    params.push(Value::Integer(filter.limit));
    params.push(Value::Integer(filter.offset));
    (clause, params)
}

fn collect<T>(
    conn: &Connection,
    sql: &str,
    params: Vec<Value>,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), map)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn delete_listing(conn: &Connection, table: &str, booking_col: &str, id: &str) -> Result<DeleteOutcome> {
    let exists_sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table);
    let exists: bool = conn.query_row(&exists_sql, [id], |r| r.get(0))?;
    if !exists {
        return Ok(DeleteOutcome::NotFound);
    }

    let bookings_sql = format!("SELECT COUNT(*) FROM bookings WHERE {} = ?1", booking_col);
    let bookings: i64 = conn.query_row(&bookings_sql, [id], |r| r.get(0))?;
    if bookings > 0 {
        return Ok(DeleteOutcome::HasBookings);
    }

    conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table), [id])?;
    Ok(DeleteOutcome::Deleted)
}

fn property_from_row(row: &Row<'_>) -> rusqlite::Result<PropertyRow> {
    Ok(PropertyRow {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        host_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        location: row.get(5)?,
        price_per_night: row.get(6)?,
        cleaning_fee: row.get(7)?,
        currency: row.get(8)?,
        max_guests: row.get(9)?,
        bedrooms: row.get(10)?,
        bathrooms: row.get(11)?,
        average_rating: row.get(12)?,
        review_count: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn experience_from_row(row: &Row<'_>) -> rusqlite::Result<ExperienceRow> {
    Ok(ExperienceRow {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        host_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        location: row.get(5)?,
        price_per_person: row.get(6)?,
        currency: row.get(7)?,
        duration_minutes: row.get(8)?,
        max_participants: row.get(9)?,
        average_rating: row.get(10)?,
        review_count: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::DEFAULT_ORGANIZATION_ID;
    use stayhub_types::models::UserRole;

    pub(crate) fn seed_host(db: &Database, id: &str) {
        db.create_user(id, DEFAULT_ORGANIZATION_ID, &format!("{}@test.dev", id), id, "hash", UserRole::Host)
            .unwrap();
    }

    pub(crate) fn property(id: &str, host_id: &str, location: &str, price: i64, max_guests: i64) -> NewProperty {
        NewProperty {
            id: id.to_string(),
            organization_id: DEFAULT_ORGANIZATION_ID.to_string(),
            host_id: host_id.to_string(),
            title: format!("Place {}", id),
            description: String::new(),
            location: location.to_string(),
            price_per_night: price,
            cleaning_fee: 0,
            currency: "usd".to_string(),
            max_guests,
            bedrooms: 1,
            bathrooms: 1,
        }
    }

    fn filter() -> ListingFilter {
        ListingFilter { limit: 20, ..Default::default() }
    }

    #[test]
    fn filters_by_location_capacity_and_price() {
        let db = Database::open_in_memory().unwrap();
        seed_host(&db, "h1");
        db.insert_property(&property("p1", "h1", "Lisbon, Portugal", 10_000, 2)).unwrap();
        db.insert_property(&property("p2", "h1", "Porto, Portugal", 20_000, 6)).unwrap();
        db.insert_property(&property("p3", "h1", "Madrid, Spain", 15_000, 4)).unwrap();

        let portugal = db
            .list_properties(&ListingFilter { location: Some("portugal".into()), ..filter() })
            .unwrap();
        assert_eq!(portugal.len(), 2);

        let big = db.list_properties(&ListingFilter { min_capacity: Some(4), ..filter() }).unwrap();
        let mut ids: Vec<_> = big.iter().map(|p| p.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["p2", "p3"]);

        let cheap = db.list_properties(&ListingFilter { max_price: Some(12_000), ..filter() }).unwrap();
        assert_eq!(cheap.len(), 1);
        assert_eq!(cheap[0].id, "p1");

        let other_org = db
            .list_properties(&ListingFilter { org_slug: Some("elsewhere".into()), ..filter() })
            .unwrap();
        assert!(other_org.is_empty());
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let db = Database::open_in_memory().unwrap();
        seed_host(&db, "h1");
        db.insert_property(&property("p1", "h1", "Lisbon", 10_000, 2)).unwrap();

        let changes = PropertyChanges { price_per_night: Some(12_500), ..Default::default() };
        assert!(db.update_property("p1", &changes).unwrap());
        assert!(!db.update_property("missing", &changes).unwrap());

        let row = db.get_property("p1").unwrap().unwrap();
        assert_eq!(row.price_per_night, 12_500);
        assert_eq!(row.location, "Lisbon");
        assert_eq!(row.review_count, 0);
        assert!(row.average_rating.is_none());
    }

    #[test]
    fn delete_missing_listing_reports_not_found() {
        let db = Database::open_in_memory().unwrap();
        seed_host(&db, "h1");
        db.insert_property(&property("p1", "h1", "Lisbon", 10_000, 2)).unwrap();

        assert_eq!(db.delete_property("nope").unwrap(), DeleteOutcome::NotFound);
        assert_eq!(db.delete_property("p1").unwrap(), DeleteOutcome::Deleted);
        assert!(!db.listing_exists(&ListingRef::Property("p1".into())).unwrap());
    }
}
