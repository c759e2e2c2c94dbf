use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE organizations (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                slug        TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE users (
                id               TEXT PRIMARY KEY,
                organization_id  TEXT NOT NULL REFERENCES organizations(id),
                email            TEXT NOT NULL UNIQUE COLLATE NOCASE,
                name             TEXT NOT NULL,
                password         TEXT NOT NULL,
                role             TEXT NOT NULL CHECK (role IN ('GUEST', 'HOST', 'ADMIN')),
                created_at       TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE properties (
                id               TEXT PRIMARY KEY,
                organization_id  TEXT NOT NULL REFERENCES organizations(id),
                host_id          TEXT NOT NULL REFERENCES users(id),
                title            TEXT NOT NULL,
                description      TEXT NOT NULL DEFAULT '',
                location         TEXT NOT NULL,
                price_per_night  INTEGER NOT NULL CHECK (price_per_night >= 0),
                cleaning_fee     INTEGER NOT NULL DEFAULT 0 CHECK (cleaning_fee >= 0),
                currency         TEXT NOT NULL DEFAULT 'usd',
                max_guests       INTEGER NOT NULL CHECK (max_guests >= 1),
                bedrooms         INTEGER NOT NULL DEFAULT 1,
                bathrooms        INTEGER NOT NULL DEFAULT 1,
                created_at       TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at       TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_properties_org ON properties(organization_id);
            CREATE INDEX idx_properties_host ON properties(host_id);

            CREATE TABLE experiences (
                id                TEXT PRIMARY KEY,
                organization_id   TEXT NOT NULL REFERENCES organizations(id),
                host_id           TEXT NOT NULL REFERENCES users(id),
                title             TEXT NOT NULL,
                description       TEXT NOT NULL DEFAULT '',
                location          TEXT NOT NULL,
                price_per_person  INTEGER NOT NULL CHECK (price_per_person >= 0),
                currency          TEXT NOT NULL DEFAULT 'usd',
                duration_minutes  INTEGER NOT NULL,
                max_participants  INTEGER NOT NULL CHECK (max_participants >= 1),
                created_at        TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at        TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_experiences_org ON experiences(organization_id);
            CREATE INDEX idx_experiences_host ON experiences(host_id);

            CREATE TABLE bookings (
                id             TEXT PRIMARY KEY,
                guest_id       TEXT NOT NULL REFERENCES users(id),
                property_id    TEXT REFERENCES properties(id),
                experience_id  TEXT REFERENCES experiences(id),
                check_in       TEXT NOT NULL,
                check_out      TEXT NOT NULL,
                guests         INTEGER NOT NULL CHECK (guests >= 1),
                total_price    INTEGER NOT NULL,
                currency       TEXT NOT NULL,
                status         TEXT NOT NULL DEFAULT 'PENDING',
                created_at     TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at     TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK ((property_id IS NULL) <> (experience_id IS NULL)),
                CHECK (check_out > check_in)
            );

            CREATE INDEX idx_bookings_property ON bookings(property_id, check_in);
            CREATE INDEX idx_bookings_experience ON bookings(experience_id, check_in);
            CREATE INDEX idx_bookings_guest ON bookings(guest_id, created_at);

            CREATE TABLE payments (
                id                  TEXT PRIMARY KEY,
                booking_id          TEXT NOT NULL UNIQUE REFERENCES bookings(id),
                provider            TEXT NOT NULL,
                provider_intent_id  TEXT,
                client_secret       TEXT,
                amount              INTEGER NOT NULL,
                currency            TEXT NOT NULL,
                status              TEXT NOT NULL,
                refund_id           TEXT,
                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_payments_intent ON payments(provider_intent_id);

            CREATE TABLE reviews (
                id             TEXT PRIMARY KEY,
                booking_id     TEXT NOT NULL UNIQUE REFERENCES bookings(id),
                author_id      TEXT NOT NULL REFERENCES users(id),
                property_id    TEXT REFERENCES properties(id),
                experience_id  TEXT REFERENCES experiences(id),
                rating         INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                comment        TEXT NOT NULL DEFAULT '',
                created_at     TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_reviews_property ON reviews(property_id);
            CREATE INDEX idx_reviews_experience ON reviews(experience_id);

            CREATE TABLE favorites (
                id             TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL REFERENCES users(id),
                property_id    TEXT REFERENCES properties(id) ON DELETE CASCADE,
                experience_id  TEXT REFERENCES experiences(id) ON DELETE CASCADE,
                created_at     TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK ((property_id IS NULL) <> (experience_id IS NULL)),
                UNIQUE (user_id, property_id),
                UNIQUE (user_id, experience_id)
            );

            -- Seed the default tenant
            INSERT INTO organizations (id, name, slug)
                VALUES ('00000000-0000-0000-0000-000000000001', 'Default', 'default');

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
