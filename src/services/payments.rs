use crate::{entities::order::PaymentMethod, errors::ServiceError};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

/// Test card numbers that are always approved
pub const APPROVED_TEST_CARDS: [&str; 2] = ["4242424242424242", "5555555555554444"];
/// Test card numbers that are always declined
pub const DECLINED_TEST_CARDS: [&str; 1] = ["4000000000000002"];

/// Payment instrument supplied when paying an order; each method carries only what it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "payment_method", rename_all = "lowercase")]
pub enum PaymentDetails {
    Card {
        card_number: Option<String>,
        #[serde(default)]
        cvv: Option<String>,
        #[serde(default)]
        expiry_date: Option<String>,
    },
    Cash,
    Transfer,
}

impl PaymentDetails {
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentDetails::Card { .. } => PaymentMethod::Card,
            PaymentDetails::Cash => PaymentMethod::Cash,
            PaymentDetails::Transfer => PaymentMethod::Transfer,
        }
    }

    /// Shape check done before any order state is read.
    pub fn validate(&self) -> Result<(), ServiceError> {
        match self {
            PaymentDetails::Card { card_number, .. } => match card_number.as_deref() {
                Some(number) if !number.trim().is_empty() => Ok(()),
                _ => Err(ServiceError::ValidationError(
                    "Card number is required for card payments".to_string(),
                )),
            },
            PaymentDetails::Cash | PaymentDetails::Transfer => Ok(()),
        }
    }
}

/// Gateway verdict. A decline is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentResult {
    pub success: bool,
    pub transaction_id: String,
    pub message: String,
}

impl PaymentResult {
    fn approved(message: String) -> Self {
        Self {
            success: true,
            transaction_id: generate_transaction_id(),
            message,
        }
    }

    fn declined(message: &str) -> Self {
        Self {
            success: false,
            transaction_id: String::new(),
            message: message.to_string(),
        }
    }
}

/// Charges an amount against a payment instrument.
///
/// `Err` is reserved for malformed instruments (`InvalidCard`, `ValidationError`);
/// declines come back as `Ok` with `success == false`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn process(
        &self,
        amount: i64,
        details: &PaymentDetails,
    ) -> Result<PaymentResult, ServiceError>;
}

/// In-process gateway with test card lists and a random network delay
#[derive(Debug, Clone)]
pub struct SimulatedPaymentGateway {
    min_latency: Duration,
    max_latency: Duration,
}

impl SimulatedPaymentGateway {
    pub fn new(min_latency: Duration, max_latency: Duration) -> Self {
        let (min_latency, max_latency) = if min_latency <= max_latency {
            (min_latency, max_latency)
        } else {
            (max_latency, min_latency)
        };
        Self {
            min_latency,
            max_latency,
        }
    }

    /// Gateway that answers immediately
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    async fn simulate_network_delay(&self) {
        if self.max_latency.is_zero() {
            return;
        }
        let delay = {
            let min = self.min_latency.as_millis() as u64;
            let max = self.max_latency.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(min..=max))
        };
        debug!(delay_ms = delay.as_millis() as u64, "Simulating gateway latency");
        tokio::time::sleep(delay).await;
    }

    fn process_card(&self, amount: i64, card_number: Option<&str>) -> Result<PaymentResult, ServiceError> {
        let number: String = card_number
            .ok_or_else(|| {
                ServiceError::ValidationError("Card number is required for card payments".to_string())
            })?
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        if DECLINED_TEST_CARDS.contains(&number.as_str()) {
            warn!("Card declined by issuer");
            return Ok(PaymentResult::declined("Card declined by bank"));
        }

        if !APPROVED_TEST_CARDS.contains(&number.as_str()) && !luhn_valid(&number) {
            return Err(ServiceError::InvalidCard(
                "Card number failed validation".to_string(),
            ));
        }

        Ok(PaymentResult::approved(format!(
            "Payment of ${} approved",
            amount
        )))
    }
}

impl Default for SimulatedPaymentGateway {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_millis(500))
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    #[instrument(skip(self, details), fields(method = %details.method()))]
    async fn process(
        &self,
        amount: i64,
        details: &PaymentDetails,
    ) -> Result<PaymentResult, ServiceError> {
        self.simulate_network_delay().await;

        let result = match details {
            PaymentDetails::Card { card_number, .. } => {
                self.process_card(amount, card_number.as_deref())?
            }
            PaymentDetails::Cash => {
                PaymentResult::approved("Cash payment on delivery registered".to_string())
            }
            PaymentDetails::Transfer => {
                PaymentResult::approved("Transfer pending verification".to_string())
            }
        };

        info!(success = result.success, amount, "Payment processed");
        Ok(result)
    }
}

/// `TXN-{unix millis}-{0..999999}`
pub fn generate_transaction_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("TXN-{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Luhn checksum over a 13-19 digit card number.
pub fn luhn_valid(number: &str) -> bool {
    if !(13..=19).contains(&number.len()) || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let sum: u32 = number
        .bytes()
        .rev()
        .enumerate()
        .map(|(idx, b)| {
            let digit = u32::from(b - b'0');
            if idx % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                digit
            }
        })
        .sum();

    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(number: &str) -> PaymentDetails {
        PaymentDetails::Card {
            card_number: Some(number.to_string()),
            cvv: None,
            expiry_date: None,
        }
    }

    #[test]
    fn luhn_accepts_known_valid_numbers() {
        assert!(luhn_valid("4242424242424242"));
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("378282246310005"));
    }

    #[test]
    fn luhn_rejects_bad_checksums_and_shapes() {
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid("411111111111"));
        assert!(!luhn_valid("4111-1111-1111-1111"));
        assert!(!luhn_valid(""));
    }

    #[tokio::test]
    async fn approved_card_returns_transaction_id() {
        let gateway = SimulatedPaymentGateway::instant();
        let result = gateway.process(20000, &card("4242 4242 4242 4242")).await.unwrap();
        assert!(result.success);
        assert!(result.transaction_id.starts_with("TXN-"));
        assert_eq!(result.message, "Payment of $20000 approved");
    }

    #[tokio::test]
    async fn declined_card_is_not_an_error() {
        let gateway = SimulatedPaymentGateway::instant();
        let result = gateway.process(500, &card("4000000000000002")).await.unwrap();
        assert!(!result.success);
        assert!(result.transaction_id.is_empty());
        assert_eq!(result.message, "Card declined by bank");
    }

    #[tokio::test]
    async fn luhn_failure_is_invalid_card() {
        let gateway = SimulatedPaymentGateway::instant();
        let err = gateway.process(500, &card("1234567890123")).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCard(_)));
    }

    #[tokio::test]
    async fn cash_and_transfer_always_approve() {
        let gateway = SimulatedPaymentGateway::instant();

        let cash = gateway.process(100, &PaymentDetails::Cash).await.unwrap();
        assert!(cash.success);
        assert_eq!(cash.message, "Cash payment on delivery registered");

        let transfer = gateway.process(100, &PaymentDetails::Transfer).await.unwrap();
        assert!(transfer.success);
        assert_eq!(transfer.message, "Transfer pending verification");
    }

    #[test]
    fn card_without_number_fails_validation() {
        let details: PaymentDetails =
            serde_json::from_str(r#"{"payment_method":"card"}"#).unwrap();
        assert!(matches!(
            details.validate(),
            Err(ServiceError::ValidationError(_))
        ));
        assert_eq!(details.method(), PaymentMethod::Card);
    }

    #[test]
    fn tagged_union_parses_every_method() {
        let cash: PaymentDetails = serde_json::from_str(r#"{"payment_method":"cash"}"#).unwrap();
        assert_eq!(cash, PaymentDetails::Cash);
        let transfer: PaymentDetails =
            serde_json::from_str(r#"{"payment_method":"transfer"}"#).unwrap();
        assert_eq!(transfer.method(), PaymentMethod::Transfer);
    }

    #[test]
    fn transaction_id_has_expected_shape() {
        let id = generate_transaction_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TXN");
        assert!(parts[1].parse::<i64>().is_ok());
        assert!(parts[2].parse::<u32>().unwrap() < 1_000_000);
    }
}
