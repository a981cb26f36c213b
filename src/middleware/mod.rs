// Request middleware: the x402 payment gate and CORS

pub mod cors;
pub mod delegate;
pub mod payment_gate;
pub mod policy;
pub mod scraper;

pub use cors::*;
pub use delegate::{
    GateError, HttpValidationDelegate, PaymentDecision, ValidationDelegate, ValidationRequest,
    ValidationResponse,
};
pub use payment_gate::{payment_gate, PaymentGate};
pub use policy::{RouteClassification, RoutePolicy};
pub use scraper::{override_flag, BotClassifier, CallerClass};
