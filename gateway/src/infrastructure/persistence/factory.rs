use crate::infrastructure::persistence::connection::DbPool;
use crate::infrastructure::persistence::repositories::{
    AddressRepository, CustomerRepository, IntentRepository, MetadataRepository,
    ObservationRepository, TokenRepository,
};

/// All repositories over one shared connection pool.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub intents: IntentRepository,
    pub addresses: AddressRepository,
    pub observations: ObservationRepository,
    pub tokens: TokenRepository,
    pub metadata: MetadataRepository,
    pub customers: CustomerRepository,
}

/// Factory for creating repository instances
pub struct RepositoryFactory;

impl RepositoryFactory {
    pub fn create_repositories(pool: &DbPool) -> Repositories {
        let conn = pool.get_connection().clone();
        Repositories {
            intents: IntentRepository::new(conn.clone()),
            addresses: AddressRepository::new(conn.clone()),
            observations: ObservationRepository::new(conn.clone()),
            tokens: TokenRepository::new(conn.clone()),
            metadata: MetadataRepository::new(conn.clone()),
            customers: CustomerRepository::new(conn),
        }
    }
}
