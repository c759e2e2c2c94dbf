//! Demo data for local development. Safe to run on every start: it does
//! nothing once the demo organization exists.

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use crate::Database;

pub const DEMO_ORGANIZATION_SLUG: &str = "demo";
pub const DEMO_HOST_EMAIL: &str = "host@stayhub.dev";
pub const DEMO_GUEST_EMAIL: &str = "guest@stayhub.dev";

struct DemoProperty {
    title: &'static str,
    location: &'static str,
    price_per_night: i64,
    cleaning_fee: i64,
    max_guests: i64,
    bedrooms: i64,
}

const PROPERTIES: &[DemoProperty] = &[
    DemoProperty {
        title: "Sunny loft in Alfama",
        location: "Lisbon, Portugal",
        price_per_night: 11_500,
        cleaning_fee: 3_000,
        max_guests: 2,
        bedrooms: 1,
    },
    DemoProperty {
        title: "Cliffside villa with pool",
        location: "Lagos, Portugal",
        price_per_night: 42_000,
        cleaning_fee: 9_000,
        max_guests: 8,
        bedrooms: 4,
    },
    DemoProperty {
        title: "Cabin by the river",
        location: "Gerês, Portugal",
        price_per_night: 8_000,
        cleaning_fee: 2_500,
        max_guests: 4,
        bedrooms: 2,
    },
];

const EXPERIENCES: &[(&str, &str, i64, i64, i64)] = &[
    ("Sunrise surf lesson", "Ericeira, Portugal", 4_500, 120, 6),
    ("Port wine cellar tour", "Porto, Portugal", 3_500, 90, 12),
];

/// Seed the demo tenant. `password_hash` is applied to both demo accounts.
/// Returns false when the data was already there.
pub fn seed_demo(db: &Database, password_hash: &str) -> Result<bool> {
    db.with_conn_mut(|conn| {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM organizations WHERE slug = ?1)",
            [DEMO_ORGANIZATION_SLUG],
            |r| r.get(0),
        )?;
        if exists {
            info!("Demo data already present, skipping seed");
            return Ok(false);
        }

        let tx = conn.unchecked_transaction()?;
        insert_demo(&tx, password_hash)?;
        tx.commit()?;

        info!(
            "Seeded demo organization '{}' ({} properties, {} experiences)",
            DEMO_ORGANIZATION_SLUG,
            PROPERTIES.len(),
            EXPERIENCES.len()
        );
        Ok(true)
    })
}

fn insert_demo(conn: &Connection, password_hash: &str) -> Result<()> {
    let org_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO organizations (id, name, slug) VALUES (?1, 'StayHub Demo', ?2)",
        (&org_id, DEMO_ORGANIZATION_SLUG),
    )?;

    let host_id = Uuid::new_v4().to_string();
    let guest_id = Uuid::new_v4().to_string();
    for (id, email, name, role) in [
        (&host_id, DEMO_HOST_EMAIL, "Helena Host", "HOST"),
        (&guest_id, DEMO_GUEST_EMAIL, "Gil Guest", "GUEST"),
    ] {
        conn.execute(
            "INSERT INTO users (id, organization_id, email, name, password, role) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (id, &org_id, email, name, password_hash, role),
        )?;
    }

    let mut first_property = None;
    for p in PROPERTIES {
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO properties (id, organization_id, host_id, title, description, location,
                 price_per_night, cleaning_fee, currency, max_guests, bedrooms, bathrooms)
             VALUES (?1, ?2, ?3, ?4, '', ?5, ?6, ?7, 'usd', ?8, ?9, 1)",
            rusqlite::params![
                id,
                org_id,
                host_id,
                p.title,
                p.location,
                p.price_per_night,
                p.cleaning_fee,
                p.max_guests,
                p.bedrooms
            ],
        )?;
        first_property.get_or_insert(id);
    }

    for (title, location, price, duration, capacity) in EXPERIENCES {
        conn.execute(
            "INSERT INTO experiences (id, organization_id, host_id, title, description, location,
                 price_per_person, currency, duration_minutes, max_participants)
             VALUES (?1, ?2, ?3, ?4, '', ?5, ?6, 'usd', ?7, ?8)",
            rusqlite::params![Uuid::new_v4().to_string(), org_id, host_id, title, location, price, duration, capacity],
        )?;
    }

    // A finished stay with a review, so listing pages show ratings.
    if let Some(property_id) = first_property {
        let booking_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO bookings (id, guest_id, property_id, check_in, check_out, guests, total_price,
                 currency, status)
             VALUES (?1, ?2, ?3, '2024-05-10', '2024-05-13', 2, 37500, 'usd', 'COMPLETED')",
            (&booking_id, &guest_id, &property_id),
        )?;
        conn.execute(
            "INSERT INTO reviews (id, booking_id, author_id, property_id, rating, comment)
             VALUES (?1, ?2, ?3, ?4, 5, 'Beautiful light and a very kind host.')",
            (Uuid::new_v4().to_string(), &booking_id, &guest_id, &property_id),
        )?;
    }

    Ok(())
}
