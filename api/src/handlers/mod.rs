mod health;
mod intents;
mod pay;
mod scan;
mod status;

pub use health::health_check;
pub use intents::{create_intent, get_intent, issue_magic_link, IntentJson};
pub use pay::redeem_magic_link;
pub use scan::scan_intent;
pub use status::intent_status;

use std::sync::Arc;

use paygate::PaymentService;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PaymentService>,
}
