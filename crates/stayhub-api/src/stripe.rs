use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use stayhub_types::models::PaymentStatus;

use crate::provider::{PaymentProvider, ProviderError, ProviderFuture, ProviderIntent, ProviderResult};

const API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe PaymentIntents over the REST API (form-encoded requests, bearer
/// secret key).
pub struct StripeProvider {
    client: Client,
    secret_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: Option<String>,
    status: String,
}

#[derive(Deserialize)]
struct StripeRefund {
    id: String,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeProvider {
    pub fn new(secret_key: String) -> Self {
        Self::with_base_url(secret_key, API_BASE.to_string())
    }

    pub fn with_base_url(secret_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ProviderResult<T> {
        let response = request.bearer_auth(&self.secret_key).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| format!("Stripe returned HTTP {}", status));
            return Err(ProviderError::Rejected(message));
        }

        Ok(response.json::<T>().await?)
    }
}

impl TryFrom<StripeIntent> for ProviderIntent {
    type Error = ProviderError;

    fn try_from(intent: StripeIntent) -> ProviderResult<Self> {
        let status = PaymentStatus::from_provider(&intent.status)
            .ok_or_else(|| ProviderError::UnexpectedStatus(intent.status.clone()))?;
        Ok(Self {
            id: intent.id,
            client_secret: intent.client_secret,
            status,
        })
    }
}

impl StripeProvider {
    async fn create(&self, amount: i64, currency: &str, booking_id: Uuid) -> ProviderResult<ProviderIntent> {
        let form = [
            ("amount", amount.to_string()),
            ("currency", currency.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[booking_id]", booking_id.to_string()),
        ];
        let intent: StripeIntent = self
            .send(self.client.post(self.url("payment_intents")).form(&form))
            .await?;

        info!("Stripe intent {} created for booking {}", intent.id, booking_id);
        ProviderIntent::try_from(intent)
    }

    async fn retrieve(&self, intent_id: &str) -> ProviderResult<ProviderIntent> {
        let intent: StripeIntent = self
            .send(self.client.get(self.url(&format!("payment_intents/{}", intent_id))))
            .await?;
        debug!("Stripe intent {} is {}", intent.id, intent.status);
        ProviderIntent::try_from(intent)
    }

    async fn cancel(&self, intent_id: &str) -> ProviderResult<ProviderIntent> {
        let intent: StripeIntent = self
            .send(self.client.post(self.url(&format!("payment_intents/{}/cancel", intent_id))))
            .await?;
        ProviderIntent::try_from(intent)
    }

    async fn refund_intent(&self, intent_id: &str, amount: i64) -> ProviderResult<String> {
        let form = [("payment_intent", intent_id.to_string()), ("amount", amount.to_string())];
        let refund: StripeRefund = self
            .send(self.client.post(self.url("refunds")).form(&form))
            .await?;

        info!("Stripe refund {} issued for intent {}", refund.id, intent_id);
        Ok(refund.id)
    }
}

impl PaymentProvider for StripeProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    fn create_intent<'a>(
        &'a self,
        amount: i64,
        currency: &'a str,
        booking_id: Uuid,
    ) -> ProviderFuture<'a, ProviderIntent> {
        Box::pin(self.create(amount, currency, booking_id))
    }

    fn retrieve_intent<'a>(&'a self, intent_id: &'a str) -> ProviderFuture<'a, ProviderIntent> {
        Box::pin(self.retrieve(intent_id))
    }

    fn cancel_intent<'a>(&'a self, intent_id: &'a str) -> ProviderFuture<'a, ProviderIntent> {
        Box::pin(self.cancel(intent_id))
    }

    fn refund<'a>(&'a self, intent_id: &'a str, amount: i64) -> ProviderFuture<'a, String> {
        Box::pin(self.refund_intent(intent_id, amount))
    }
}
