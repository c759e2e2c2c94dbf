use crate::Database;
use crate::models::{FavoriteRow, ListingRef, ReviewRow};
use crate::queries::OptionalExt;
use anyhow::Result;
use rusqlite::{Connection, Row};

const REVIEW_SELECT: &str = "
    SELECT r.id, r.booking_id, r.author_id, COALESCE(u.name, 'unknown'), r.property_id, r.experience_id,
           COALESCE(p.organization_id, e.organization_id), r.rating, r.comment, r.created_at
    FROM reviews r
    LEFT JOIN users u ON u.id = r.author_id
    LEFT JOIN properties p ON p.id = r.property_id
    LEFT JOIN experiences e ON e.id = r.experience_id";

pub struct NewReview {
    pub id: String,
    pub booking_id: String,
    pub author_id: String,
    pub listing: ListingRef,
    pub rating: i64,
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewInsert {
    Created,
    AlreadyReviewed,
}

impl Database {
    // -- Reviews --

    pub fn insert_review(&self, r: &NewReview) -> Result<ReviewInsert> {
        self.with_conn_mut(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM reviews WHERE booking_id = ?1)",
                [&r.booking_id],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(ReviewInsert::AlreadyReviewed);
            }

            conn.execute(
                "INSERT INTO reviews (id, booking_id, author_id, property_id, experience_id, rating, comment)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    r.id,
                    r.booking_id,
                    r.author_id,
                    r.listing.property_id(),
                    r.listing.experience_id(),
                    r.rating,
                    r.comment
                ],
            )?;
            Ok(ReviewInsert::Created)
        })
    }

    pub fn get_review(&self, id: &str) -> Result<Option<ReviewRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE r.id = ?1", REVIEW_SELECT);
            conn.query_row(&sql, [id], review_from_row).optional()
        })
    }

    pub fn list_reviews_for_listing(&self, listing: &ListingRef) -> Result<Vec<ReviewRow>> {
        self.with_conn(|conn| {
            let (column, id) = match listing {
                ListingRef::Property(id) => ("property_id", id),
                ListingRef::Experience(id) => ("experience_id", id),
            };
            let sql = format!("{} WHERE r.{} = ?1 ORDER BY r.created_at DESC, r.rowid DESC", REVIEW_SELECT, column);
            query_reviews(conn, &sql, id)
        })
    }

    pub fn list_reviews_by_author(&self, author_id: &str) -> Result<Vec<ReviewRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE r.author_id = ?1 ORDER BY r.created_at DESC, r.rowid DESC", REVIEW_SELECT);
            query_reviews(conn, &sql, author_id)
        })
    }

    pub fn delete_review(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM reviews WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    // -- Favorites --

    /// Toggle a favorite: removes if it exists, inserts if not.
    /// Returns true when the favorite was added.
    pub fn toggle_favorite(&self, id: &str, user_id: &str, listing: &ListingRef) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM favorites
                     WHERE user_id = ?1 AND property_id IS ?2 AND experience_id IS ?3",
                    rusqlite::params![user_id, listing.property_id(), listing.experience_id()],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                conn.execute("DELETE FROM favorites WHERE id = ?1", [&existing_id])?;
                Ok(false)
            } else {
                conn.execute(
                    "INSERT INTO favorites (id, user_id, property_id, experience_id) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![id, user_id, listing.property_id(), listing.experience_id()],
                )?;
                Ok(true)
            }
        })
    }

    pub fn list_favorites(&self, user_id: &str) -> Result<Vec<FavoriteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT f.id, f.user_id, f.property_id, f.experience_id, COALESCE(p.title, e.title, ''), f.created_at
                 FROM favorites f
                 LEFT JOIN properties p ON p.id = f.property_id
                 LEFT JOIN experiences e ON e.id = f.experience_id
                 WHERE f.user_id = ?1
                 ORDER BY f.created_at DESC, f.rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(FavoriteRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        property_id: row.get(2)?,
                        experience_id: row.get(3)?,
                        listing_title: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_reviews(conn: &Connection, sql: &str, param: &str) -> Result<Vec<ReviewRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([param], review_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewRow> {
    Ok(ReviewRow {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        author_id: row.get(2)?,
        author_name: row.get(3)?,
        property_id: row.get(4)?,
        experience_id: row.get(5)?,
        listing_organization_id: row.get(6)?,
        rating: row.get(7)?,
        comment: row.get(8)?,
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookings::tests::{setup, stay};

    fn review(id: &str, booking_id: &str) -> NewReview {
        NewReview {
            id: id.to_string(),
            booking_id: booking_id.to_string(),
            author_id: "g1".to_string(),
            listing: ListingRef::Property("p1".to_string()),
            rating: 4,
            comment: "Lovely".to_string(),
        }
    }

    #[test]
    fn one_review_per_booking() {
        let db = setup();
        db.create_booking(&stay("b1", "p1", "2030-06-01", "2030-06-05")).unwrap();

        assert_eq!(db.insert_review(&review("r1", "b1")).unwrap(), ReviewInsert::Created);
        assert_eq!(db.insert_review(&review("r2", "b1")).unwrap(), ReviewInsert::AlreadyReviewed);

        let listed = db.list_reviews_for_listing(&ListingRef::Property("p1".into())).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].author_name, "Guest");

        let property = db.get_property("p1").unwrap().unwrap();
        assert_eq!(property.review_count, 1);
        assert_eq!(property.average_rating, Some(4.0));
    }

    #[test]
    fn favorites_toggle_on_and_off() {
        let db = setup();
        let listing = ListingRef::Property("p1".into());

        assert!(db.toggle_favorite("f1", "g1", &listing).unwrap());
        let favs = db.list_favorites("g1").unwrap();
        assert_eq!(favs.len(), 1);
        assert_eq!(favs[0].listing_title, "Place p1");

        assert!(!db.toggle_favorite("f2", "g1", &listing).unwrap());
        assert!(db.list_favorites("g1").unwrap().is_empty());
    }
}
