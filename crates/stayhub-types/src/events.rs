use serde::{Deserialize, Serialize};

/// Event envelope posted by the payment processor to the webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEventData {
    pub object: WebhookObject,
}

/// The subset of the event object we act on. For `payment_intent.*` events
/// `id` is the intent; for `charge.*` events the intent is in `payment_intent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    pub status: Option<String>,
    pub payment_intent: Option<String>,
}

/// What a webhook event means for our payment records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded { intent_id: String },
    Failed { intent_id: String, status: Option<String> },
    Canceled { intent_id: String },
    Refunded { intent_id: String },
    Ignored { kind: String },
}

impl WebhookEvent {
    pub fn classify(self) -> PaymentEvent {
        let object = self.data.object;
        match self.kind.as_str() {
            "payment_intent.succeeded" => PaymentEvent::Succeeded { intent_id: object.id },
            "payment_intent.payment_failed" => PaymentEvent::Failed {
                intent_id: object.id,
                status: object.status,
            },
            "payment_intent.canceled" => PaymentEvent::Canceled { intent_id: object.id },
            "charge.refunded" => match object.payment_intent {
                Some(intent_id) => PaymentEvent::Refunded { intent_id },
                None => PaymentEvent::Ignored { kind: self.kind },
            },
            _ => PaymentEvent::Ignored { kind: self.kind },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> WebhookEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn succeeded_uses_object_id() {
        let ev = parse(
            r#"{"id":"evt_1","type":"payment_intent.succeeded",
                "data":{"object":{"id":"pi_123","status":"succeeded","amount":100}}}"#,
        );
        assert_eq!(ev.classify(), PaymentEvent::Succeeded { intent_id: "pi_123".into() });
    }

    #[test]
    fn refund_uses_charge_intent() {
        let ev = parse(
            r#"{"id":"evt_2","type":"charge.refunded",
                "data":{"object":{"id":"ch_9","payment_intent":"pi_123"}}}"#,
        );
        assert_eq!(ev.classify(), PaymentEvent::Refunded { intent_id: "pi_123".into() });
    }

    #[test]
    fn unknown_types_are_ignored() {
        let ev = parse(r#"{"id":"evt_3","type":"customer.created","data":{"object":{"id":"cus_1"}}}"#);
        assert_eq!(ev.classify(), PaymentEvent::Ignored { kind: "customer.created".into() });
    }
}
