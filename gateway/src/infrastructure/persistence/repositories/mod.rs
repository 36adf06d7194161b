pub mod address_repository;
pub mod customer_repository;
pub mod intent_repository;
pub mod metadata_repository;
pub mod observation_repository;
pub mod token_repository;

pub use address_repository::AddressRepository;
pub use customer_repository::CustomerRepository;
pub use intent_repository::{IntentRepository, NewIntent};
pub use metadata_repository::MetadataRepository;
pub use observation_repository::{ObservationRepository, UpsertOutcome};
pub use token_repository::TokenRepository;
