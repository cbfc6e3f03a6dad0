//! Business logic for the logistics auth core.

pub mod audit;
pub mod error;
pub mod guard;
mod jwt;
mod mongo;
pub mod organization;
pub mod policy;
pub mod session;
pub mod store;
pub mod user;

pub use audit::{AuditRecorder, AuditTrail, ClientInfo, InMemoryAuditLog};
pub use error::{ServiceError, StoreError};
pub use guard::{AuthContext, AuthorizationGuard};
pub use jwt::{AccessTokenClaims, RefreshTokenClaims, TokenCodec};
pub use mongo::{MongoAuditLog, MongoCredentialStore, MongoDb};
pub use organization::OrganizationService;
pub use policy::Policy;
pub use session::{LoginOutcome, NewUser, SessionManager, TokenPair};
pub use store::{CredentialStore, InMemoryCredentialStore};
pub use user::UserService;
