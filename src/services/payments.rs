use crate::{
    entities::payment_intent::{self, Entity as PaymentIntentEntity, PaymentIntentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::checkout::Address,
};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Intent handle returned by the external gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayIntent {
    pub external_ref: String,
    /// Gateway-specific payload forwarded to the client untouched
    pub client_payload: serde_json::Value,
}

/// External payment gateway contract. The production implementation is
/// HTTP-backed with a bounded timeout; tests substitute their own.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        customer_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> Result<GatewayIntent, ServiceError>;
}

/// reqwest-backed gateway client. Any transport or decode failure maps
/// to `GatewayUnavailable`; nothing is persisted on that path, so the
/// caller can safely retry.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct CreateIntentBody<'a> {
    customer_id: Uuid,
    amount: Decimal,
    currency: &'a str,
}

#[derive(Deserialize)]
struct CreateIntentResponse {
    id: String,
    #[serde(default)]
    client_payload: serde_json::Value,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("gateway client: {}", e)))?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_intent(
        &self,
        customer_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> Result<GatewayIntent, ServiceError> {
        let url = format!("{}/v1/payment_intents", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CreateIntentBody {
                customer_id,
                amount,
                currency,
            })
            .send()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| ServiceError::GatewayUnavailable(e.to_string()))?;

        let body: CreateIntentResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(e.to_string()))?;

        Ok(GatewayIntent {
            external_ref: body.id,
            client_payload: body.client_payload,
        })
    }
}

/// Completion callback payload relayed from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCallback {
    pub external_ref: String,
    pub status: String,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
}

/// A payment whose completion callback passed signature verification
/// and whose intent was still awaiting verification at resolve time.
/// The `created -> verified` flip itself happens inside the checkout
/// commit transaction.
#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub intent: payment_intent::Model,
    pub callback: GatewayCallback,
}

/// Payment intent gateway adapter: intent creation and callback
/// verification.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_secret: String,
    tolerance_secs: u64,
    event_sender: EventSender,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_secret: String,
        tolerance_secs: u64,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            gateway,
            webhook_secret,
            tolerance_secs,
            event_sender,
        }
    }

    /// Creates an intent with the gateway, then persists the local
    /// record in `created` status. Gateway failure persists nothing.
    #[instrument(skip(self), fields(customer_id = %customer_id, amount = %amount))]
    pub async fn create_intent(
        &self,
        customer_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> Result<(payment_intent::Model, serde_json::Value), ServiceError> {
        let gateway_intent = self.gateway.create_intent(customer_id, amount, currency).await?;

        let model = payment_intent::ActiveModel {
            id: Set(Uuid::new_v4()),
            external_ref: Set(gateway_intent.external_ref.clone()),
            customer_id: Set(customer_id),
            amount: Set(amount),
            currency: Set(currency.to_string()),
            status: Set(PaymentIntentStatus::Created),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        info!(
            intent_id = %model.id,
            external_ref = %model.external_ref,
            "Payment intent created"
        );
        self.event_sender
            .send_logged(Event::PaymentIntentCreated {
                intent_id: model.id,
                external_ref: model.external_ref.clone(),
            })
            .await;

        Ok((model, gateway_intent.client_payload))
    }

    /// Verifies a gateway completion callback: recomputes the HMAC over
    /// the raw payload, then resolves the intent by external reference.
    /// Re-delivered callbacks for an already-verified intent fail with
    /// `AlreadyVerified` and must not re-trigger order creation.
    #[instrument(skip(self, payload, signature, timestamp))]
    pub async fn verify_callback(
        &self,
        payload: &[u8],
        signature: &str,
        timestamp: Option<&str>,
    ) -> Result<VerifiedPayment, ServiceError> {
        if !verify_signature(
            &self.webhook_secret,
            payload,
            signature,
            timestamp,
            self.tolerance_secs,
        ) {
            warn!("Gateway callback signature verification failed");
            return Err(ServiceError::InvalidSignature);
        }

        let callback: GatewayCallback = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::ValidationError(format!("invalid callback payload: {}", e)))?;

        let intent = PaymentIntentEntity::find()
            .filter(payment_intent::Column::ExternalRef.eq(callback.external_ref.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::UnknownPaymentIntent(callback.external_ref.clone()))?;

        if intent.status != PaymentIntentStatus::Created {
            return Err(ServiceError::AlreadyVerified(intent.external_ref));
        }

        Ok(VerifiedPayment { intent, callback })
    }

    /// Conditional `created -> verified` transition, executed on the
    /// checkout commit transaction. Zero affected rows means another
    /// delivery of the same callback won the race.
    pub async fn mark_verified<C: ConnectionTrait>(
        &self,
        conn: &C,
        intent: &payment_intent::Model,
    ) -> Result<(), ServiceError> {
        let result = PaymentIntentEntity::update_many()
            .col_expr(
                payment_intent::Column::Status,
                sea_orm::sea_query::Expr::value(PaymentIntentStatus::Verified),
            )
            .filter(payment_intent::Column::Id.eq(intent.id))
            .filter(payment_intent::Column::Status.eq(PaymentIntentStatus::Created))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::AlreadyVerified(intent.external_ref.clone()));
        }
        Ok(())
    }

    /// Records a `created -> failed` transition when the gateway
    /// reports an unsuccessful completion. Failed intents are terminal;
    /// a later callback for one resolves as already settled. The update
    /// is conditional so a concurrent verification keeps its win.
    pub async fn mark_failed<C: ConnectionTrait>(
        &self,
        conn: &C,
        intent: &payment_intent::Model,
    ) -> Result<(), ServiceError> {
        let result = PaymentIntentEntity::update_many()
            .col_expr(
                payment_intent::Column::Status,
                sea_orm::sea_query::Expr::value(PaymentIntentStatus::Failed),
            )
            .filter(payment_intent::Column::Id.eq(intent.id))
            .filter(payment_intent::Column::Status.eq(PaymentIntentStatus::Created))
            .exec(conn)
            .await?;

        if result.rows_affected == 1 {
            info!(
                intent_id = %intent.id,
                external_ref = %intent.external_ref,
                "Payment intent marked failed"
            );
        }
        Ok(())
    }
}

/// Signs a payload the way the gateway does. Exposed for tests and for
/// tools that replay callbacks against staging environments.
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: Option<&str>) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    if let Some(ts) = timestamp {
        mac.update(ts.as_bytes());
        mac.update(b".");
    }
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Recomputes the expected signature and compares in constant time.
/// When a timestamp is supplied it is bound into the signature and
/// checked against the configured tolerance window.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature: &str,
    timestamp: Option<&str>,
    tolerance_secs: u64,
) -> bool {
    if let Some(ts) = timestamp {
        match ts.parse::<i64>() {
            Ok(ts_i) => {
                let now = Utc::now().timestamp();
                if (now - ts_i).unsigned_abs() > tolerance_secs {
                    return false;
                }
            }
            Err(_) => return false,
        }
    }
    let expected = sign_payload(secret, payload, timestamp);
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_webhook_secret_for_unit_tests_only";

    #[test]
    fn signature_round_trips() {
        let payload = br#"{"external_ref":"pi_123","status":"succeeded"}"#;
        let sig = sign_payload(SECRET, payload, None);
        assert!(verify_signature(SECRET, payload, &sig, None, 300));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let payload = br#"{"external_ref":"pi_123","status":"succeeded"}"#;
        let sig = sign_payload(SECRET, payload, None);
        let tampered = br#"{"external_ref":"pi_999","status":"succeeded"}"#;
        assert!(!verify_signature(SECRET, tampered, &sig, None, 300));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = b"{}";
        let sig = sign_payload("other_secret", payload, None);
        assert!(!verify_signature(SECRET, payload, &sig, None, 300));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = b"{}";
        let stale = (Utc::now().timestamp() - 3600).to_string();
        let sig = sign_payload(SECRET, payload, Some(&stale));
        assert!(!verify_signature(SECRET, payload, &sig, Some(&stale), 300));
    }

    #[test]
    fn fresh_timestamp_is_accepted() {
        let payload = b"{}";
        let ts = Utc::now().timestamp().to_string();
        let sig = sign_payload(SECRET, payload, Some(&ts));
        assert!(verify_signature(SECRET, payload, &sig, Some(&ts), 300));
    }

    #[tokio::test]
    async fn invalid_signature_short_circuits_before_any_lookup() {
        struct NoGateway;
        #[async_trait]
        impl PaymentGateway for NoGateway {
            async fn create_intent(
                &self,
                _customer_id: Uuid,
                _amount: Decimal,
                _currency: &str,
            ) -> Result<GatewayIntent, ServiceError> {
                Err(ServiceError::GatewayUnavailable("unreachable".into()))
            }
        }

        let (sender, _rx) = crate::events::channel();
        let service = PaymentService::new(
            Arc::new(DatabaseConnection::Disconnected),
            Arc::new(NoGateway),
            SECRET.to_string(),
            300,
            sender,
        );

        let err = service
            .verify_callback(b"{}", "deadbeef", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidSignature));
    }
}
