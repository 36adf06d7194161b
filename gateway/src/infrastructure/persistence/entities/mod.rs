pub mod customers;
pub mod deposit_addresses;
pub mod magic_link_tokens;
pub mod payment_intents;
pub mod system_metadata;
pub mod tx_observations;
