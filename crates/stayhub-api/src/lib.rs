pub mod auth;
pub mod bookings;
pub mod error;
pub mod experiences;
pub mod favorites;
pub mod middleware;
pub mod organizations;
pub mod payments;
pub mod pricing;
pub mod properties;
pub mod provider;
pub mod reviews;
pub mod routes;
pub mod state;
pub mod stripe;
pub mod validation;
pub mod webhook;

pub use routes::router;
