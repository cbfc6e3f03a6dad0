//! MongoDB-backed credential store and audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, Collection, Database, IndexModel,
};
use std::time::Duration;

use super::audit::AuditRecorder;
use super::error::StoreError;
use super::store::CredentialStore;
use crate::models::{normalize_email, AuditEntry, Organization, User, UserChanges, AUDIT_RETENTION_SECONDS};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, anyhow::Error> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            anyhow::Error::new(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), anyhow::Error> {
        tracing::info!("Creating MongoDB indexes for logistics-auth");

        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(
                IndexOptions::builder()
                    .name("email_unique".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        self.users().create_index(email_index, None).await?;
        tracing::info!("Created unique index on users.email");

        let org_index = IndexModel::builder()
            .keys(doc! { "orgId": 1, "createdAt": 1 })
            .options(
                IndexOptions::builder()
                    .name("tenant_lookup".to_string())
                    .build(),
            )
            .build();
        self.users().create_index(org_index, None).await?;
        tracing::info!("Created index on users.(orgId, createdAt)");

        let audit_ttl = IndexModel::builder()
            .keys(doc! { "timestamp": 1 })
            .options(
                IndexOptions::builder()
                    .name("audit_retention".to_string())
                    .expire_after(Duration::from_secs(AUDIT_RETENTION_SECONDS))
                    .build(),
            )
            .build();
        self.audit_logs().create_index(audit_ttl, None).await?;
        tracing::info!("Created TTL index on audit_logs.timestamp");

        let audit_org = IndexModel::builder()
            .keys(doc! { "orgId": 1, "timestamp": -1 })
            .options(
                IndexOptions::builder()
                    .name("audit_tenant_lookup".to_string())
                    .build(),
            )
            .build();
        self.audit_logs().create_index(audit_org, None).await?;
        tracing::info!("Created index on audit_logs.(orgId, timestamp)");

        Ok(())
    }

    pub async fn ping(&self) -> Result<(), mongodb::error::Error> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(())
    }

    pub fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    pub fn organizations(&self) -> Collection<Organization> {
        self.db.collection("organisations")
    }

    pub fn audit_logs(&self) -> Collection<AuditEntry> {
        self.db.collection("audit_logs")
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn map_write_error(err: mongodb::error::Error) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::DuplicateEmail
    } else {
        StoreError::from(err)
    }
}

fn now_bson() -> mongodb::bson::DateTime {
    mongodb::bson::DateTime::from_chrono(Utc::now())
}

/// [`CredentialStore`] over the `users` and `organisations` collections.
#[derive(Clone)]
pub struct MongoCredentialStore {
    db: MongoDb,
}

impl MongoCredentialStore {
    pub fn new(db: MongoDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for MongoCredentialStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.db.ping().await.map_err(|e| {
            tracing::error!("MongoDB health check failed: {}", e);
            StoreError::from(e)
        })
    }

    async fn insert_organization(&self, org: &Organization) -> Result<(), StoreError> {
        self.db.organizations().insert_one(org, None).await?;
        Ok(())
    }

    async fn find_organization(&self, org_id: &str) -> Result<Option<Organization>, StoreError> {
        Ok(self
            .db
            .organizations()
            .find_one(doc! { "_id": org_id }, None)
            .await?)
    }

    async fn update_organization(&self, org: &Organization) -> Result<bool, StoreError> {
        let settings = mongodb::bson::to_document(&org.settings)
            .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?;

        let result = self
            .db
            .organizations()
            .update_one(
                doc! { "_id": &org.id },
                doc! {
                    "$set": {
                        "timezone": &org.timezone,
                        "settings": settings,
                        "updatedAt": mongodb::bson::DateTime::from_chrono(org.updated_at),
                    }
                },
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.db
            .users()
            .insert_one(user, None)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.db.users().find_one(doc! { "_id": user_id }, None).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .db
            .users()
            .find_one(doc! { "email": normalize_email(email) }, None)
            .await?)
    }

    async fn list_users(
        &self,
        org_id: &str,
        limit: i64,
        skip: u64,
    ) -> Result<(Vec<User>, u64), StoreError> {
        let filter = doc! { "orgId": org_id };
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": 1, "_id": 1 })
            .skip(skip)
            .limit(limit)
            .build();

        let users: Vec<User> = self
            .db
            .users()
            .find(filter.clone(), options)
            .await?
            .try_collect()
            .await?;
        let total = self.db.users().count_documents(filter, None).await?;

        Ok((users, total))
    }

    async fn update_user(
        &self,
        user_id: &str,
        changes: &UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let mut set = Document::new();
        if let Some(name) = &changes.name {
            set.insert("name", name.trim());
        }
        if let Some(email) = &changes.email {
            set.insert("email", normalize_email(email));
        }
        if let Some(role) = changes.role {
            set.insert("role", role.as_str());
        }
        if let Some(active) = changes.is_active {
            set.insert("isActive", active);
        }
        set.insert("updatedAt", now_bson());

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.db
            .users()
            .find_one_and_update(doc! { "_id": user_id }, doc! { "$set": set }, options)
            .await
            .map_err(map_write_error)
    }

    async fn set_password_hash(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let result = self
            .db
            .users()
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "passwordHash": password_hash, "updatedAt": now_bson() } },
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn record_login(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<(), StoreError> {
        self.db
            .users()
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$set": {
                        "lastLoginAt": mongodb::bson::DateTime::from_chrono(at),
                        "lastLoginIp": ip,
                    }
                },
                None,
            )
            .await?;
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        user_id: &str,
        expected_version: i64,
        expected_fingerprint: Option<&str>,
        new_fingerprint: &str,
        new_version: i64,
    ) -> Result<bool, StoreError> {
        // null also matches a missing field, which is what a fresh user has
        let filter = doc! {
            "_id": user_id,
            "refreshTokenVersion": expected_version,
            "refreshTokenFingerprint": expected_fingerprint,
        };
        let update = doc! {
            "$set": {
                "refreshTokenFingerprint": new_fingerprint,
                "refreshTokenVersion": new_version,
            }
        };

        let result = self.db.users().update_one(filter, update, None).await?;
        Ok(result.matched_count == 1)
    }

    async fn invalidate_refresh_tokens(&self, user_id: &str) -> Result<(), StoreError> {
        self.db
            .users()
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$set": { "refreshTokenFingerprint": null },
                    "$inc": { "refreshTokenVersion": 1_i64 },
                },
                None,
            )
            .await?;
        Ok(())
    }
}

/// [`AuditRecorder`] over the `audit_logs` collection (TTL-expired after 90 days).
#[derive(Clone)]
pub struct MongoAuditLog {
    db: MongoDb,
}

impl MongoAuditLog {
    pub fn new(db: MongoDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditRecorder for MongoAuditLog {
    async fn record(&self, entry: &AuditEntry) -> Result<(), anyhow::Error> {
        self.db.audit_logs().insert_one(entry, None).await?;
        Ok(())
    }

    async fn find_for_user(
        &self,
        org_id: &str,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, anyhow::Error> {
        let filter = doc! {
            "orgId": org_id,
            "$or": [
                { "userId": user_id },
                { "entityType": "USER", "entityId": user_id },
            ],
        };
        let options = FindOptions::builder()
            .sort(doc! { "timestamp": -1 })
            .limit(limit)
            .build();

        let entries = self
            .db
            .audit_logs()
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(entries)
    }
}
