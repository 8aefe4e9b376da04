//! Business logic: merchant onboarding, the order lifecycle and payment
//! orchestration.

pub mod merchant_registry;
pub mod order_lifecycle;
pub mod payment_service;

pub use merchant_registry::MerchantRegistry;
pub use order_lifecycle::{NewOrder, OrderLifecycle, QueryOutcome};
pub use payment_service::{
    CreatePayment, PaymentCreated, PaymentService, TrialOutcome, TrialPreorder,
};
