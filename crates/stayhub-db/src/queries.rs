use crate::Database;
use crate::models::{OrganizationRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row, ffi};
use stayhub_types::models::UserRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInsert {
    Created,
    EmailTaken,
}

const USER_COLUMNS: &str = "id, organization_id, email, name, password, role, created_at";

impl Database {
    // -- Organizations --

    pub fn create_organization(&self, id: &str, name: &str, slug: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO organizations (id, name, slug) VALUES (?1, ?2, ?3)",
                (id, name, slug),
            )?;
            Ok(())
        })
    }

    pub fn get_organization_by_slug(&self, slug: &str) -> Result<Option<OrganizationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, slug, created_at FROM organizations WHERE slug = ?1",
                [slug],
                organization_from_row,
            )
            .optional()
        })
    }

    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        organization_id: &str,
        email: &str,
        name: &str,
        password_hash: &str,
        role: UserRole,
    ) -> Result<UserInsert> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, organization_id, email, name, password, role)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (id, organization_id, email, name, password_hash, role.as_str()),
            );
            match inserted {
                Ok(_) => Ok(UserInsert::Created),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    Ok(UserInsert::EmailTaken)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                organization_id: row.get(1)?,
                email: row.get(2)?,
                name: row.get(3)?,
                password: row.get(4)?,
                role: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn organization_from_row(row: &Row<'_>) -> rusqlite::Result<OrganizationRow> {
    Ok(OrganizationRow {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_ORGANIZATION_ID;

    #[test]
    fn email_lookup_ignores_case() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", DEFAULT_ORGANIZATION_ID, "Ana@Example.com", "Ana", "hash", UserRole::Guest)
            .unwrap();

        let user = db.get_user_by_email("ana@example.com").unwrap().unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.role, "GUEST");
    }

    #[test]
    fn duplicate_email_is_reported_not_raised() {
        let db = Database::open_in_memory().unwrap();
        let first = db
            .create_user("u1", DEFAULT_ORGANIZATION_ID, "ana@example.com", "Ana", "hash", UserRole::Guest)
            .unwrap();
        assert_eq!(first, UserInsert::Created);

        let second = db
            .create_user("u2", DEFAULT_ORGANIZATION_ID, "ANA@example.com", "Ana", "hash", UserRole::Guest)
            .unwrap();
        assert_eq!(second, UserInsert::EmailTaken);
        assert!(db.get_user_by_id("u2").unwrap().is_none());
    }

    #[test]
    fn default_organization_exists() {
        let db = Database::open_in_memory().unwrap();
        let org = db.get_organization_by_slug("default").unwrap().unwrap();
        assert_eq!(org.id, DEFAULT_ORGANIZATION_ID);
        assert!(db.get_organization_by_slug("nope").unwrap().is_none());
    }
}
