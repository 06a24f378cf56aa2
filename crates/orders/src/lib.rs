//! Checkout for the marketplace: converts a cart into a paid order.
//!
//! [`OrderWorkflow`] reserves stock through the inventory ledger, charges the
//! customer through a [`PaymentGateway`], and undoes the reservation when the
//! charge fails. It also serves refunds, seller status updates and order
//! queries. Orders and payments are held in process.

mod book;
pub mod caller;
pub mod error;
pub mod gateway;
pub mod model;
pub mod state;
pub mod workflow;

pub use caller::{Caller, Role};
pub use error::{OrderError, Result};
pub use gateway::{
    GatewayMode, Payment, PaymentError, PaymentGateway, PaymentMethod, PaymentOutcome,
    PaymentState, RefundOutcome, SimulatedPaymentGateway,
};
pub use model::{Order, OrderItem};
pub use state::{OrderStatus, PaymentStatus};
pub use workflow::{OrderConfirmation, OrderWorkflow, RefundConfirmation};
