//! Payment processor abstraction for hosted-element checkout.
//!
//! The server creates an intent and hands its `client_secret` to the browser,
//! which collects card details directly with the processor. The server only
//! ever looks intents up again to learn how that went.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::info;
use uuid::Uuid;

use stayhub_types::models::PaymentStatus;

pub type ProviderResult<T> = Result<T, ProviderError>;
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = ProviderResult<T>> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The processor answered and said no (declined, invalid amount, ...).
    #[error("{0}")]
    Rejected(String),
    #[error("payment provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unknown payment intent {0}")]
    UnknownIntent(String),
    #[error("unexpected payment status '{0}'")]
    UnexpectedStatus(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: PaymentStatus,
}

pub trait PaymentProvider: Send + Sync {
    /// Stored on payment rows.
    fn name(&self) -> &'static str;

    fn create_intent<'a>(
        &'a self,
        amount: i64,
        currency: &'a str,
        booking_id: Uuid,
    ) -> ProviderFuture<'a, ProviderIntent>;

    fn retrieve_intent<'a>(&'a self, intent_id: &'a str) -> ProviderFuture<'a, ProviderIntent>;

    fn cancel_intent<'a>(&'a self, intent_id: &'a str) -> ProviderFuture<'a, ProviderIntent>;

    /// Refund `amount` of a succeeded intent. Returns the refund id.
    fn refund<'a>(&'a self, intent_id: &'a str, amount: i64) -> ProviderFuture<'a, String>;
}

struct MockIntent {
    client_secret: String,
    amount: i64,
    status: PaymentStatus,
    /// Set by `set_status`; stops the simulated checkout from succeeding.
    pinned: bool,
}

/// In-process provider for development and tests.
///
/// Intents start in `RequiresPaymentMethod`. The first `retrieve_intent`
/// behaves as if the guest completed checkout and reports `Succeeded`,
/// unless a status was pinned with `set_status`.
#[derive(Default)]
pub struct MockPaymentProvider {
    intents: Mutex<HashMap<String, MockIntent>>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, intent_id: &str, status: PaymentStatus) -> ProviderResult<()> {
        self.with_intent(intent_id, |intent| {
            intent.status = status;
            intent.pinned = true;
            Ok(())
        })
    }

    pub fn intent_count(&self) -> usize {
        self.intents.lock().map(|intents| intents.len()).unwrap_or(0)
    }

    fn insert(&self, id: String, intent: MockIntent) -> ProviderResult<()> {
        self.intents
            .lock()
            .map_err(|_| ProviderError::Rejected("mock provider state poisoned".into()))?
            .insert(id, intent);
        Ok(())
    }

    fn with_intent<T>(
        &self,
        intent_id: &str,
        f: impl FnOnce(&mut MockIntent) -> ProviderResult<T>,
    ) -> ProviderResult<T> {
        let mut intents = self
            .intents
            .lock()
            .map_err(|_| ProviderError::Rejected("mock provider state poisoned".into()))?;
        let intent = intents
            .get_mut(intent_id)
            .ok_or_else(|| ProviderError::UnknownIntent(intent_id.to_string()))?;
        f(intent)
    }

    fn snapshot(intent_id: &str, intent: &MockIntent) -> ProviderIntent {
        ProviderIntent {
            id: intent_id.to_string(),
            client_secret: Some(intent.client_secret.clone()),
            status: intent.status,
        }
    }
}

impl PaymentProvider for MockPaymentProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn create_intent<'a>(
        &'a self,
        amount: i64,
        currency: &'a str,
        booking_id: Uuid,
    ) -> ProviderFuture<'a, ProviderIntent> {
        Box::pin(async move {
            if amount <= 0 {
                return Err(ProviderError::Rejected("Amount must be positive".into()));
            }

            let id = format!("pi_mock_{}", Uuid::new_v4().simple());
            let secret: String = rand::rng()
                .sample_iter(&Alphanumeric)
                .take(24)
                .map(char::from)
                .collect();
            let intent = MockIntent {
                client_secret: format!("{}_secret_{}", id, secret),
                amount,
                status: PaymentStatus::RequiresPaymentMethod,
                pinned: false,
            };
            let created = Self::snapshot(&id, &intent);
            self.insert(id, intent)?;

            info!("Mock intent {} for booking {} ({} {})", created.id, booking_id, amount, currency);
            Ok(created)
        })
    }

    fn retrieve_intent<'a>(&'a self, intent_id: &'a str) -> ProviderFuture<'a, ProviderIntent> {
        Box::pin(async move {
            self.with_intent(intent_id, |intent| {
                if !intent.pinned && intent.status == PaymentStatus::RequiresPaymentMethod {
                    intent.status = PaymentStatus::Succeeded;
                }
                Ok(Self::snapshot(intent_id, intent))
            })
        })
    }

    fn cancel_intent<'a>(&'a self, intent_id: &'a str) -> ProviderFuture<'a, ProviderIntent> {
        Box::pin(async move {
            self.with_intent(intent_id, |intent| {
                if intent.status == PaymentStatus::Succeeded {
                    return Err(ProviderError::Rejected("A succeeded payment cannot be canceled".into()));
                }
                intent.status = PaymentStatus::Canceled;
                intent.pinned = true;
                Ok(Self::snapshot(intent_id, intent))
            })
        })
    }

    fn refund<'a>(&'a self, intent_id: &'a str, amount: i64) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            self.with_intent(intent_id, |intent| {
                if intent.status != PaymentStatus::Succeeded {
                    return Err(ProviderError::Rejected("Only succeeded payments can be refunded".into()));
                }
                if amount > intent.amount {
                    return Err(ProviderError::Rejected("Refund exceeds the charged amount".into()));
                }
                Ok(format!("re_mock_{}", Uuid::new_v4().simple()))
            })
        })
    }
}
