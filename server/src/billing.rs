//! Stripe subscription billing: Checkout Sessions out, signed webhooks in.
//!
//! Checkout goes through the [`PaymentGateway`] trait so tests can swap in a
//! fake. Webhook payloads are verified with the endpoint secret and applied to
//! the account under the caller's account lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use storescore_core::{credits, CreditEntry, CreditReason, Db, User, WebhookEvent};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

const STRIPE_API: &str = "https://api.stripe.com/v1";

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("stripe request failed: {0}")]
    Http(String),

    #[error("stripe returned {status}: {message}")]
    Stripe { status: u16, message: String },

    #[error("invalid webhook signature: {0}")]
    Signature(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(
        &self,
        user: &User,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, BillingError>;
}

pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    price_id: String,
}

impl StripeClient {
    pub fn new(secret_key: String, price_id: String) -> Result<Self, BillingError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .map_err(|e| BillingError::Http(e.to_string()))?;
        Ok(Self {
            http,
            secret_key,
            price_id,
        })
    }

    /// A client when both the secret key and the price are configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, BillingError> {
        match (&config.stripe_secret_key, &config.stripe_price_id) {
            (Some(key), Some(price)) => Ok(Some(Self::new(key.clone(), price.clone())?)),
            _ => Ok(None),
        }
    }
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_checkout(
        &self,
        user: &User,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, BillingError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("line_items[0][price]", &self.price_id),
            ("line_items[0][quantity]", "1"),
            ("client_reference_id", &user.id),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
        ];
        match &user.plan.stripe_customer_id {
            Some(customer) => form.push(("customer", customer)),
            None => form.push(("customer_email", &user.email)),
        }

        let response = self
            .http
            .post(format!("{STRIPE_API}/checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| BillingError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BillingError::Http(e.to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(BillingError::Stripe {
                status: status.as_u16(),
                message,
            });
        }
        let session: CheckoutSession =
            serde_json::from_str(&body).map_err(|e| BillingError::Http(e.to_string()))?;
        info!("created checkout session {} for user {}", session.id, user.id);
        Ok(session)
    }
}

// --- Webhook signatures ---

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`, the value Stripe sends as `v1`.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, BillingError> {
    let mac = signed_mac(secret, timestamp, payload)?;
    Ok(mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

fn signed_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<Hmac<Sha256>, BillingError> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| BillingError::Signature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Check a `Stripe-Signature` header (`t=...,v1=...[,v1=...]`) against the payload.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), BillingError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
            Some(("v1", sig)) => candidates.push(sig),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or_else(|| BillingError::Signature("missing timestamp".into()))?;
    if candidates.is_empty() {
        return Err(BillingError::Signature("missing v1 signature".into()));
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(BillingError::Signature("timestamp outside tolerance".into()));
    }

    let mac = signed_mac(secret, timestamp, payload)?;
    let matched = candidates
        .iter()
        .filter_map(|c| decode_hex(c))
        .any(|sig| mac.clone().verify_slice(&sig).is_ok());
    if matched {
        Ok(())
    } else {
        Err(BillingError::Signature("no matching signature".into()))
    }
}

// --- Webhook events ---

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Duplicate,
    Activated { user_id: String },
    Renewed { user_id: String },
    StatusChanged { user_id: String },
    Canceled { user_id: String },
    Ignored(String),
}

fn str_field<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn timestamp_field(object: &Value, pointer: &str) -> Option<DateTime<Utc>> {
    object
        .pointer(pointer)
        .and_then(Value::as_i64)
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
}

/// Subscription period end. Newer API versions moved it onto the items.
fn subscription_period_end(object: &Value) -> Option<DateTime<Utc>> {
    timestamp_field(object, "/current_period_end")
        .or_else(|| timestamp_field(object, "/items/data/0/current_period_end"))
}

fn user_by_customer(db: &Db, customer: Option<&str>) -> storescore_core::Result<Option<User>> {
    let Some(customer) = customer else {
        return Ok(None);
    };
    db.find_one::<User, _>(|u| u.plan.stripe_customer_id.as_deref() == Some(customer))
}

fn grant_period(user: &mut User, amount: i64, event_id: &str) -> storescore_core::Result<Option<CreditEntry>> {
    if amount <= 0 {
        return Ok(None);
    }
    let entry = credits::grant(
        user,
        amount,
        CreditReason::SubscriptionGrant,
        Some(event_id.to_string()),
    )?;
    info!("granting {} credits to {} ({})", amount, user.id, event_id);
    Ok(Some(entry))
}

/// Apply one verified event. Callers hold the account lock so redeliveries
/// racing each other still grant once.
///
/// The event id is recorded before any account change is written. When
/// applying fails the record is removed again, so Stripe's retry gets another
/// chance instead of being acknowledged as a duplicate.
pub fn apply_event(
    db: &Db,
    config: &Config,
    event: &StripeEvent,
) -> storescore_core::Result<EventOutcome> {
    if db.get::<WebhookEvent>(&event.id)?.is_some() {
        info!("webhook {} already processed", event.id);
        return Ok(EventOutcome::Duplicate);
    }
    db.put(&WebhookEvent {
        id: event.id.clone(),
        kind: event.kind.clone(),
        received_at: Utc::now(),
    })?;

    let outcome = match apply_changes(db, config, event) {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Err(undo) = db.delete::<WebhookEvent>(&event.id) {
                warn!("could not release webhook {}: {}", event.id, undo);
            }
            return Err(e);
        }
    };
    if let EventOutcome::Ignored(reason) = &outcome {
        warn!("webhook {} ({}): {}", event.id, event.kind, reason);
    } else {
        info!("webhook {} ({}): {:?}", event.id, event.kind, outcome);
    }
    Ok(outcome)
}

fn apply_changes(
    db: &Db,
    config: &Config,
    event: &StripeEvent,
) -> storescore_core::Result<EventOutcome> {
    let object = &event.data.object;
    let outcome = match event.kind.as_str() {
        "checkout.session.completed" => {
            // A malformed reference cannot name one of our users.
            match str_field(object, "client_reference_id")
                .and_then(|id| db.get::<User>(id).ok().flatten())
            {
                Some(mut user) => {
                    user.plan.activate(
                        str_field(object, "customer").map(str::to_string),
                        str_field(object, "subscription").map(str::to_string),
                        None,
                    );
                    let entry = grant_period(&mut user, config.monthly_credits, &event.id)?;
                    credits::commit(db, &user, entry.as_ref())?;
                    EventOutcome::Activated { user_id: user.id }
                }
                None => EventOutcome::Ignored("checkout for unknown user".into()),
            }
        }
        "invoice.paid" => {
            if str_field(object, "billing_reason") != Some("subscription_cycle") {
                EventOutcome::Ignored("not a renewal invoice".into())
            } else {
                match user_by_customer(db, str_field(object, "customer"))? {
                    Some(mut user) => {
                        let period_end = timestamp_field(object, "/lines/data/0/period/end")
                            .or_else(|| timestamp_field(object, "/period_end"));
                        user.plan.activate(None, None, period_end);
                        let entry = grant_period(&mut user, config.monthly_credits, &event.id)?;
                        credits::commit(db, &user, entry.as_ref())?;
                        EventOutcome::Renewed { user_id: user.id }
                    }
                    None => EventOutcome::Ignored("invoice for unknown customer".into()),
                }
            }
        }
        "customer.subscription.updated" => {
            match user_by_customer(db, str_field(object, "customer"))? {
                Some(mut user) => {
                    if let Some(status) = str_field(object, "status") {
                        user.plan.set_status_from_stripe(status);
                    }
                    if let Some(end) = subscription_period_end(object) {
                        user.plan.current_period_end = Some(end);
                    }
                    credits::commit(db, &user, None)?;
                    EventOutcome::StatusChanged { user_id: user.id }
                }
                None => EventOutcome::Ignored("subscription for unknown customer".into()),
            }
        }
        "customer.subscription.deleted" => {
            match user_by_customer(db, str_field(object, "customer"))? {
                Some(mut user) => {
                    user.plan.cancel();
                    credits::commit(db, &user, None)?;
                    EventOutcome::Canceled { user_id: user.id }
                }
                None => EventOutcome::Ignored("subscription for unknown customer".into()),
            }
        }
        other => EventOutcome::Ignored(format!("unhandled event type {other}")),
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storescore_core::PlanStatus;

    const SECRET: &str = "whsec_test";

    #[test]
    fn signature_round_trip() {
        let payload = br#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let header = format!("t={},v1=deadbeef,v1={}", now, sign_payload(SECRET, now, payload).unwrap());
        assert!(verify_signature(payload, &header, SECRET, now + 10).is_ok());
    }

    #[test]
    fn signature_failures() {
        let payload = br#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let good = sign_payload(SECRET, now, payload).unwrap();

        let stale = format!("t={},v1={}", now, good);
        assert!(verify_signature(payload, &stale, SECRET, now + SIGNATURE_TOLERANCE_SECS + 1).is_err());

        let tampered = br#"{"id":"evt_2"}"#;
        assert!(verify_signature(tampered, &stale, SECRET, now).is_err());
        assert!(verify_signature(payload, &stale, "whsec_other", now).is_err());
        assert!(verify_signature(payload, &format!("v1={}", good), SECRET, now).is_err());
        assert!(verify_signature(payload, &format!("t={}", now), SECRET, now).is_err());
    }

    #[test]
    fn extreme_timestamps_are_rejected() {
        let payload = br#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        for t in [i64::MIN, i64::MAX, -1] {
            let header = format!("t={},v1=deadbeef", t);
            assert!(verify_signature(payload, &header, SECRET, now).is_err());
        }
        let header = format!("t={},v1=deadbeef", now);
        assert!(verify_signature(payload, &header, SECRET, i64::MIN).is_err());
    }

    #[test]
    fn empty_secret_fails_cleanly() {
        let payload = br#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let signature = sign_payload("", now, payload).unwrap();
        let header = format!("t={},v1={}", now, signature);
        assert!(verify_signature(payload, &header, "", now).is_ok());
        assert!(verify_signature(payload, &header, SECRET, now).is_err());
    }

    fn config() -> Config {
        Config::from_source(&|key: &str| match key {
            "STORESCORE_JWT_SECRET" => Some("jwt".to_string()),
            "STORESCORE_MONTHLY_CREDITS" => Some("40".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn event(id: &str, kind: &str, object: Value) -> StripeEvent {
        StripeEvent {
            id: id.into(),
            kind: kind.into(),
            data: EventData { object },
        }
    }

    #[test]
    fn subscription_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path()).unwrap();
        let config = config();
        let user = User::new("shop@example.com", "Shop", "hash".into());
        db.put(&user).unwrap();

        let checkout = event(
            "evt_checkout",
            "checkout.session.completed",
            serde_json::json!({"client_reference_id": user.id, "customer": "cus_1", "subscription": "sub_1"}),
        );
        assert_eq!(
            apply_event(&db, &config, &checkout).unwrap(),
            EventOutcome::Activated { user_id: user.id.clone() }
        );
        assert_eq!(apply_event(&db, &config, &checkout).unwrap(), EventOutcome::Duplicate);

        let stored = db.require::<User>(&user.id).unwrap();
        assert_eq!(stored.credits, 40);
        assert_eq!(stored.plan.status, PlanStatus::Active);
        assert_eq!(stored.plan.stripe_customer_id.as_deref(), Some("cus_1"));

        let renewal = event(
            "evt_invoice",
            "invoice.paid",
            serde_json::json!({"customer": "cus_1", "billing_reason": "subscription_cycle",
                "lines": {"data": [{"period": {"end": 1_900_000_000}}]}}),
        );
        apply_event(&db, &config, &renewal).unwrap();
        let first_invoice = event(
            "evt_invoice_create",
            "invoice.paid",
            serde_json::json!({"customer": "cus_1", "billing_reason": "subscription_create"}),
        );
        assert!(matches!(
            apply_event(&db, &config, &first_invoice).unwrap(),
            EventOutcome::Ignored(_)
        ));
        let stored = db.require::<User>(&user.id).unwrap();
        assert_eq!(stored.credits, 80);
        assert_eq!(
            stored.plan.current_period_end.map(|d| d.timestamp()),
            Some(1_900_000_000)
        );

        let past_due = event(
            "evt_sub_updated",
            "customer.subscription.updated",
            serde_json::json!({"id": "sub_1", "customer": "cus_1", "status": "past_due"}),
        );
        apply_event(&db, &config, &past_due).unwrap();
        assert_eq!(db.require::<User>(&user.id).unwrap().plan.status, PlanStatus::PastDue);

        let deleted = event(
            "evt_sub_deleted",
            "customer.subscription.deleted",
            serde_json::json!({"id": "sub_1", "customer": "cus_1"}),
        );
        apply_event(&db, &config, &deleted).unwrap();
        let stored = db.require::<User>(&user.id).unwrap();
        assert_eq!(stored.plan.status, PlanStatus::Canceled);
        assert_eq!(stored.credits, 80);
    }

    #[test]
    fn unknown_events_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path()).unwrap();
        let ping = event("evt_ping", "charge.refunded", serde_json::json!({}));
        assert!(matches!(
            apply_event(&db, &config(), &ping).unwrap(),
            EventOutcome::Ignored(_)
        ));
        assert!(db.get::<WebhookEvent>("evt_ping").unwrap().is_some());
    }

    #[test]
    fn failed_grant_leaves_event_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path()).unwrap();
        let user = User::new("shop@example.com", "Shop", "hash".into());
        db.put(&user).unwrap();
        let checkout = event(
            "evt_checkout",
            "checkout.session.completed",
            serde_json::json!({"client_reference_id": user.id, "customer": "cus_1"}),
        );

        // A plain file in place of the ledger collection makes the grant write fail.
        let blocker = dir.path().join("credits");
        std::fs::write(&blocker, "").unwrap();
        assert!(apply_event(&db, &config(), &checkout).is_err());
        assert!(db.get::<WebhookEvent>("evt_checkout").unwrap().is_none());
        let stored = db.require::<User>(&user.id).unwrap();
        assert_eq!(stored.credits, 0);
        assert_eq!(stored.plan.status, PlanStatus::Free);

        std::fs::remove_file(&blocker).unwrap();
        assert_eq!(
            apply_event(&db, &config(), &checkout).unwrap(),
            EventOutcome::Activated { user_id: user.id.clone() }
        );
        assert_eq!(apply_event(&db, &config(), &checkout).unwrap(), EventOutcome::Duplicate);
        assert_eq!(db.require::<User>(&user.id).unwrap().credits, 40);
        assert_eq!(db.list::<CreditEntry>().unwrap().len(), 1);
    }
}
