//! paygate: self-hosted Bitcoin payment gateway core.
//!
//! Merchants create payment intents, each intent gets a freshly derived
//! watch-only deposit address, and the watcher (ZMQ push + scheduled
//! pull) drives every intent through `pending → processing → confirmed`
//! with expiry and reorg handling, firing each lifecycle event exactly
//! once per real transition.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod utils;

pub use application::events::{EventDispatcher, NoopEvents, PaymentEvent, PaymentEvents};
pub use application::payments::{
    AssignedDetails, CreateIntentRequest, IssuedToken, PaymentService, StatusView,
};
pub use config::AppConfig;
pub use domain::errors::{PayError, PayResult};
