use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::{seq::SliceRandom, Rng};
use std::fmt;

use crate::config::PasswordHashConfig;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Argon2id hasher with a configurable work factor.
///
/// Hashing and verification are CPU-bound and run on the blocking pool.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(config: &PasswordHashConfig) -> Result<Self, anyhow::Error> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash with a fresh random salt. The salt is embedded in the PHC string.
    pub async fn hash(&self, password: &Password) -> Result<PasswordHashString, anyhow::Error> {
        let argon2 = self.argon2();
        let password = password.clone();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_str().as_bytes(), &salt)
                .map(|h| PasswordHashString::new(h.to_string()))
                .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
        })
        .await
        .map_err(|e| anyhow::anyhow!("Password hashing task failed: {}", e))?
    }

    /// `Ok(false)` on mismatch; `Err` when the stored digest is malformed.
    pub async fn verify(
        &self,
        password: &Password,
        password_hash: &PasswordHashString,
    ) -> Result<bool, anyhow::Error> {
        let argon2 = self.argon2();
        let password = password.clone();
        let password_hash = password_hash.clone();

        tokio::task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(password_hash.as_str())
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

            match argon2.verify_password(password.as_str().as_bytes(), &parsed_hash) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
            }
        })
        .await
        .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))?
    }
}

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%*?";

/// Generates a temporary password that always satisfies the password policy.
pub fn generate_temporary_password(len: usize) -> Password {
    let len = len.max(8);
    let mut rng = rand::thread_rng();
    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SYMBOLS].concat();

    let mut chars: Vec<u8> = vec![
        UPPER[rng.gen_range(0..UPPER.len())],
        LOWER[rng.gen_range(0..LOWER.len())],
        DIGITS[rng.gen_range(0..DIGITS.len())],
    ];
    while chars.len() < len {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    Password::new(String::from_utf8_lossy(&chars).into_owned())
}
