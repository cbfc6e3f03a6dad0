pub mod password;
pub mod validation;

pub use password::{generate_temporary_password, Password, PasswordHashString, PasswordHasher};
pub use validation::ValidatedJson;
