pub mod applications;
pub mod credentials;
pub mod interviews;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod pool;

pub use applications::{ApplicationRepository, PgApplicationRepository};
pub use credentials::{CredentialStore, PgCredentialStore};
pub use interviews::{InterviewTokenRepository, PgInterviewTokenRepository, StatusUpdate};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryStore;

use sqlx::PgPool;
use std::sync::Arc;

/// The storage collaborators the scheduling services depend on.
#[derive(Clone)]
pub struct Repositories {
    pub applications: Arc<dyn ApplicationRepository>,
    pub credentials: Arc<dyn CredentialStore>,
    pub interviews: Arc<dyn InterviewTokenRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            applications: Arc::new(PgApplicationRepository::new(pool.clone())),
            credentials: Arc::new(PgCredentialStore::new(pool.clone())),
            interviews: Arc::new(PgInterviewTokenRepository::new(pool)),
        }
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn in_memory(store: &InMemoryStore) -> Self {
        Self {
            applications: Arc::new(store.clone()),
            credentials: Arc::new(store.clone()),
            interviews: Arc::new(store.clone()),
        }
    }
}
