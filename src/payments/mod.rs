pub mod client;
pub mod error;
pub mod signature;
pub mod token_cache;
pub mod transport;
pub mod types;
pub mod webhook;

pub use client::ProcessorClient;
pub use error::{PaymentError, PaymentResult};
pub use token_cache::{TokenCache, TokenPolicy};
pub use transport::{HttpTransport, PaymentHttpClient, TransportResponse};
