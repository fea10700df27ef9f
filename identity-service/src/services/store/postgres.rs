//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::{
    ContactKind, PermissionRow, RefreshTokenRecord, Role, SingleUseTokenRecord, TokenPurpose,
    User, UserContact,
};
use crate::services::store::{AuthStore, NewUser, PasswordReplacement};
use crate::services::ServiceError;

/// PostgreSQL-backed implementation of [`AuthStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// Contacts and single-use tokens keep their discriminators as TEXT in
// the schema; these rows bridge to the typed models.
#[derive(FromRow)]
struct ContactRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    value: String,
    is_primary: bool,
    created_at: DateTime<Utc>,
}

impl ContactRow {
    fn into_contact(self) -> Result<UserContact, ServiceError> {
        let kind: ContactKind = self
            .kind
            .parse()
            .map_err(|e: String| ServiceError::Database(anyhow::anyhow!(e)))?;
        Ok(UserContact {
            id: self.id,
            user_id: self.user_id,
            kind,
            value: self.value,
            is_primary: self.is_primary,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct SingleUseTokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    purpose: String,
    expires_at: DateTime<Utc>,
    is_used: bool,
    created_at: DateTime<Utc>,
}

impl SingleUseTokenRow {
    fn into_record(self) -> Result<SingleUseTokenRecord, ServiceError> {
        let purpose: TokenPurpose = self
            .purpose
            .parse()
            .map_err(|e: String| ServiceError::Database(anyhow::anyhow!(e)))?;
        Ok(SingleUseTokenRecord {
            id: self.id,
            user_id: self.user_id,
            token_hash: self.token_hash,
            purpose,
            expires_at: self.expires_at,
            is_used: self.is_used,
            created_at: self.created_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

#[async_trait]
impl AuthStore for PgStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(username) = LOWER($1) AND deleted_at IS NULL",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_primary_contact(
        &self,
        value: &str,
        kind: ContactKind,
    ) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM users u
            JOIN user_contacts c ON c.user_id = u.id
            WHERE c.value = $1
              AND c.kind = $2
              AND c.is_primary
              AND c.deleted_at IS NULL
              AND u.deleted_at IS NULL
            "#,
        )
        .bind(value)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let user = User::new(new_user.username.clone(), new_user.password_hash.clone())
            .with_name(new_user.first_name.clone(), new_user.last_name.clone());

        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, first_name, last_name,
                               is_active, is_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("Username is already taken".to_string())
            } else {
                e.into()
            }
        })?;

        for contact in &new_user.contacts {
            sqlx::query(
                r#"
                INSERT INTO user_contacts (id, user_id, kind, value, is_primary, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user.id)
            .bind(contact.kind.as_str())
            .bind(&contact.value)
            .bind(contact.is_primary)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ServiceError::Conflict(format!(
                        "Contact '{}' is already registered",
                        contact.value
                    ))
                } else {
                    e.into()
                }
            })?;
        }

        sqlx::query(
            "INSERT INTO user_passwords (id, user_id, password_hash, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(&user.password_hash)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if let Some(role_name) = &new_user.default_role {
            let role: Option<Role> = sqlx::query_as(
                "SELECT * FROM roles WHERE name = $1 AND is_active AND deleted_at IS NULL",
            )
            .bind(role_name)
            .fetch_optional(&mut *tx)
            .await?;

            match role {
                Some(role) => {
                    sqlx::query(
                        r#"
                        INSERT INTO user_roles (id, user_id, role_id, is_active, created_at)
                        VALUES ($1, $2, $3, TRUE, $4)
                        "#,
                    )
                    .bind(Uuid::new_v4())
                    .bind(user.id)
                    .bind(role.id)
                    .bind(Utc::now())
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    tracing::warn!(role = %role_name, "default role missing, user created without roles");
                }
            }
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn contacts_for_user(&self, user_id: Uuid) -> Result<Vec<UserContact>, ServiceError> {
        let rows = sqlx::query_as::<_, ContactRow>(
            "SELECT id, user_id, kind, value, is_primary, created_at
             FROM user_contacts WHERE user_id = $1 AND deleted_at IS NULL
             ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ContactRow::into_contact).collect()
    }

    async fn find_contact_for_user(
        &self,
        user_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Option<UserContact>, ServiceError> {
        let row = sqlx::query_as::<_, ContactRow>(
            "SELECT id, user_id, kind, value, is_primary, created_at
             FROM user_contacts WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(contact_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ContactRow::into_contact).transpose()
    }

    async fn latest_password_hash(&self, user_id: Uuid) -> Result<Option<String>, ServiceError> {
        let hash: Option<(String,)> = sqlx::query_as(
            "SELECT password_hash FROM user_passwords
             WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash.map(|(h,)| h))
    }

    async fn replace_password(
        &self,
        user_id: Uuid,
        replacement: PasswordReplacement,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        if replacement.mark_verified {
            sqlx::query(
                "UPDATE users SET password_hash = $1, is_verified = TRUE, updated_at = $2 WHERE id = $3",
            )
            .bind(&replacement.new_hash)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
                .bind(&replacement.new_hash)
                .bind(Utc::now())
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        // History is append-only; prior rows are never touched.
        sqlx::query(
            "INSERT INTO user_passwords (id, user_id, password_hash, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&replacement.new_hash)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if let Some(token_id) = replacement.consume_token {
            sqlx::query("UPDATE single_use_tokens SET is_used = TRUE WHERE id = $1")
                .bind(token_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE refresh_tokens SET is_active = FALSE WHERE user_id = $1 AND is_active")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn active_roles_for_user(&self, user_id: Uuid) -> Result<Vec<Role>, ServiceError> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.name, r.description, r.is_active, r.created_at
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
              AND ur.is_active AND ur.deleted_at IS NULL
              AND r.is_active AND r.deleted_at IS NULL
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn active_permissions_for_roles(
        &self,
        role_ids: &[Uuid],
    ) -> Result<Vec<PermissionRow>, ServiceError> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT p.id, p.resource, p.action
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = ANY($1)
              AND rp.is_active AND rp.deleted_at IS NULL
              AND p.is_active AND p.deleted_at IS NULL
            "#,
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_refresh_record(
        &self,
        record: RefreshTokenRecord,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .bind(record.is_active)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_active_refresh_record(
        &self,
        user_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, ServiceError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT id, user_id, token_hash, expires_at, is_active, created_at
             FROM refresh_tokens
             WHERE user_id = $1 AND token_hash = $2 AND is_active",
        )
        .bind(user_id)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn delete_refresh_record(&self, id: Uuid) -> Result<bool, ServiceError> {
        // RETURNING makes the delete strictly-once under concurrency:
        // only one of two racing callers sees the row.
        let deleted: Option<(Uuid,)> =
            sqlx::query_as("DELETE FROM refresh_tokens WHERE id = $1 RETURNING id")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(deleted.is_some())
    }

    async fn deactivate_refresh_records(&self, user_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("UPDATE refresh_tokens SET is_active = FALSE WHERE user_id = $1 AND is_active")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_single_use_token(
        &self,
        record: SingleUseTokenRecord,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO single_use_tokens (id, user_id, token_hash, purpose, expires_at, is_used, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.purpose.as_str())
        .bind(record.expires_at)
        .bind(record.is_used)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_single_use_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<SingleUseTokenRecord>, ServiceError> {
        let row = sqlx::query_as::<_, SingleUseTokenRow>(
            "SELECT id, user_id, token_hash, purpose, expires_at, is_used, created_at
             FROM single_use_tokens
             WHERE user_id = $1 AND token_hash = $2 AND purpose = $3",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(SingleUseTokenRow::into_record).transpose()
    }

    async fn invalidate_single_use_tokens(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE single_use_tokens SET is_used = TRUE
             WHERE user_id = $1 AND purpose = $2 AND NOT is_used",
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
