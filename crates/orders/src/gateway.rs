//! Payment gateway trait and simulated implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderNumber};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::Order;

/// Chance that a simulated charge is approved.
pub const APPROVAL_RATE: f64 = 0.75;

/// Chance that a simulated refund goes through.
pub const REFUND_RATE: f64 = 2.0 / 3.0;

const ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ID_LEN: usize = 16;
const REFERENCE_LEN: usize = 12;

/// Errors raised by the gateway itself, as opposed to a declined charge.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("A payment already exists for order {0}")]
    DuplicatePayment(OrderNumber),

    #[error("No payment found for order {0}")]
    PaymentNotFound(OrderNumber),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Bank reference payment.
    Reference,
    Mobile,
    Card,
}

impl PaymentMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reference" => Some(PaymentMethod::Reference),
            "mobile" => Some(PaymentMethod::Mobile),
            "card" => Some(PaymentMethod::Card),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Reference => "reference",
            PaymentMethod::Mobile => "mobile",
            PaymentMethod::Card => "card",
        }
    }
}

/// Status of a payment record at the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Processing => "processing",
            PaymentState::Completed => "completed",
            PaymentState::Failed => "failed",
            PaymentState::Refunded => "refunded",
        }
    }
}

/// The processor's record of a charge. At most one per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub order_number: OrderNumber,
    pub method: PaymentMethod,
    pub status: PaymentState,
    pub transaction_id: Option<String>,
    pub amount: Money,
    pub reference_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    fn new(order: &Order, method: PaymentMethod, reference_number: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            order_number: order.order_number.clone(),
            method,
            status: PaymentState::Pending,
            transaction_id: None,
            amount: order.total_amount,
            reference_number,
            created_at: now,
            updated_at: now,
        }
    }

    fn set_status(&mut self, status: PaymentState) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Approved {
        transaction_id: String,
        message: String,
    },
    Declined {
        message: String,
    },
}

impl PaymentOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, PaymentOutcome::Approved { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            PaymentOutcome::Approved { message, .. } | PaymentOutcome::Declined { message } => {
                message
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Refunded { refund_id: String, message: String },
    Rejected { message: String },
}

/// A payment processor.
///
/// Implementations only touch their own payment records. Order and stock
/// changes are up to the caller.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Records a payment for the order and attempts the charge.
    ///
    /// A declined charge is an `Ok` outcome; `Err` means the payment could not
    /// be attempted at all.
    async fn process_payment(
        &self,
        order: &Order,
        method: PaymentMethod,
        reference_number: Option<String>,
    ) -> Result<PaymentOutcome, PaymentError>;

    /// Refunds the order's payment.
    async fn refund_payment(&self, order: &Order) -> Result<RefundOutcome, PaymentError>;

    /// The payment recorded for an order, if any.
    async fn payment(&self, order_number: &OrderNumber) -> Option<Payment>;
}

/// How the simulated gateway decides outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayMode {
    /// Every charge and refund succeeds.
    AlwaysApprove,
    /// Every charge and refund fails.
    AlwaysDecline,
    /// Charges succeed with [`APPROVAL_RATE`], refunds with [`REFUND_RATE`].
    #[default]
    Probabilistic,
}

impl GatewayMode {
    /// `AlwaysApprove` in test mode, `Probabilistic` otherwise.
    pub fn from_test_mode(test_mode: bool) -> Self {
        if test_mode {
            GatewayMode::AlwaysApprove
        } else {
            GatewayMode::Probabilistic
        }
    }

    fn decide(&self, probability: f64) -> bool {
        match self {
            GatewayMode::AlwaysApprove => true,
            GatewayMode::AlwaysDecline => false,
            GatewayMode::Probabilistic => rand::thread_rng().gen_bool(probability),
        }
    }
}

#[derive(Debug, Default)]
struct SimulatedState {
    payments: HashMap<OrderNumber, Payment>,
    mode: GatewayMode,
}

/// In-process stand-in for a payment processor.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPaymentGateway {
    state: Arc<RwLock<SimulatedState>>,
}

impl SimulatedPaymentGateway {
    pub fn new(mode: GatewayMode) -> Self {
        Self {
            state: Arc::new(RwLock::new(SimulatedState {
                payments: HashMap::new(),
                mode,
            })),
        }
    }

    /// Switches the outcome mode for subsequent calls.
    pub async fn set_mode(&self, mode: GatewayMode) {
        self.state.write().await.mode = mode;
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    #[tracing::instrument(
        skip(self, order, reference_number),
        fields(order_number = %order.order_number, method = method.as_str())
    )]
    async fn process_payment(
        &self,
        order: &Order,
        method: PaymentMethod,
        reference_number: Option<String>,
    ) -> Result<PaymentOutcome, PaymentError> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&order.order_number) {
            return Err(PaymentError::DuplicatePayment(order.order_number.clone()));
        }

        let reference_number = match (method, reference_number) {
            (_, Some(reference)) => Some(reference),
            (PaymentMethod::Reference, None) => Some(generate_reference()),
            (_, None) => None,
        };
        let mut payment = Payment::new(order, method, reference_number);

        let outcome = if state.mode.decide(APPROVAL_RATE) {
            let transaction_id = generate_id("TXN");
            payment.transaction_id = Some(transaction_id.clone());
            payment.set_status(PaymentState::Completed);
            metrics::counter!("payments_processed_total", "outcome" => "approved").increment(1);
            PaymentOutcome::Approved {
                transaction_id,
                message: "Payment processed successfully".to_string(),
            }
        } else {
            payment.set_status(PaymentState::Failed);
            metrics::counter!("payments_processed_total", "outcome" => "declined").increment(1);
            PaymentOutcome::Declined {
                message: "Payment failed. Please try again or use another payment method."
                    .to_string(),
            }
        };

        tracing::debug!(
            approved = outcome.is_approved(),
            message = outcome.message(),
            "payment processed"
        );
        state.payments.insert(order.order_number.clone(), payment);
        Ok(outcome)
    }

    #[tracing::instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn refund_payment(&self, order: &Order) -> Result<RefundOutcome, PaymentError> {
        let mut state = self.state.write().await;
        let approved = state.mode.decide(REFUND_RATE);
        let payment = state
            .payments
            .get_mut(&order.order_number)
            .ok_or_else(|| PaymentError::PaymentNotFound(order.order_number.clone()))?;

        if !approved {
            return Ok(RefundOutcome::Rejected {
                message: "Refund failed. Please contact support.".to_string(),
            });
        }

        let refund_id = generate_id("REF");
        payment.set_status(PaymentState::Refunded);
        Ok(RefundOutcome::Refunded {
            message: format!("Refund completed successfully. Refund ID: {refund_id}"),
            refund_id,
        })
    }

    async fn payment(&self, order_number: &OrderNumber) -> Option<Payment> {
        self.state.read().await.payments.get(order_number).cloned()
    }
}

/// `PREFIX-` followed by 16 uppercase letters or digits.
fn generate_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_LEN)
        .map(|_| char::from(ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())]))
        .collect();
    format!("{prefix}-{suffix}")
}

/// A bank payment reference: `REF-` followed by 12 digits.
pub fn generate_reference() -> String {
    let mut rng = rand::thread_rng();
    let digits: String = (0..REFERENCE_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    format!("REF-{digits}")
}
