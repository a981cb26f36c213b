// Payment protocol (x402 on Base/USDC) and the seller identity it pays into

pub mod facilitator;
pub mod identity;
pub mod paywall;
pub mod x402;

pub use facilitator::{FacilitatorClient, FacilitatorError};
pub use identity::{IdentityCache, IdentityError, IdentityState, PayerIdentity};
pub use paywall::{Paywall, PaywallConfigError, PaywallOutcome, RoutePrice};
pub use x402::*;
