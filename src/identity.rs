/// Identity repository: CRUD, canonicalization and credential checks over
/// the `identities` table.
///
/// Emails are a logical key only; storage does not enforce uniqueness and
/// duplicate records are resolved by canonicalization (`resolve_canonical`
/// / `prune_duplicates`) rather than treated as errors.
use crate::config::QUICK_ADD_DEFAULT_SECRET;
use crate::credential::CredentialStore;
use crate::db::models::{Identity, NewIdentity, Role, IDENTITY_COLUMNS};
use crate::error::{GateError, GateResult};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Profile fields scraped from an external login, merged into the
/// canonical identity record.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
}

/// Repository over the `identities` table
#[derive(Clone)]
pub struct IdentityRepository {
    db: SqlitePool,
    credentials: CredentialStore,
    // Serializes merge/prune/reset flows per email within this process.
    // A duplicate created by another process while pruning is a known,
    // unguarded race window.
    email_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl IdentityRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            credentials: CredentialStore::new(),
            email_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn email_lock(&self, email: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.email_locks.lock().expect("email lock map poisoned");
        locks
            .entry(email.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn validate_email(email: &str) -> GateResult<()> {
        if email.is_empty() {
            return Err(GateError::Validation("Email is required".to_string()));
        }
        if !email.contains('@') {
            return Err(GateError::Validation(format!(
                "Not a plausible email: {}",
                email
            )));
        }
        Ok(())
    }

    /// Insert a new identity. `first_login`, `last_login` and `last_mod`
    /// are all set to the creation time; the id is store-assigned.
    pub async fn create_identity(&self, new: &NewIdentity) -> GateResult<i64> {
        Self::validate_email(&new.email)?;

        let now = Utc::now();
        let role = new.role.unwrap_or(Role::User);

        let result = sqlx::query(
            "INSERT INTO identities
                (email, name, nickname, title, phone, supervisor_name, supervisor_phone,
                 role, last_mod_by, last_mod, first_login, last_login, salt, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, ?10, ?11, ?12)",
        )
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.nickname)
        .bind(&new.title)
        .bind(&new.phone)
        .bind(&new.supervisor_name)
        .bind(&new.supervisor_phone)
        .bind(role.as_str())
        .bind(&new.last_mod_by)
        .bind(now)
        .bind(&new.salt)
        .bind(&new.hash)
        .execute(&self.db)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!(id, email = %new.email, "Created identity");
        Ok(id)
    }

    /// Load one identity by id
    pub async fn find_by_id(&self, id: i64) -> GateResult<Identity> {
        let row = sqlx::query(
            "SELECT id, email, name, nickname, title, phone, supervisor_name, supervisor_phone,
                    role, last_mod_by, last_mod, first_login, last_login, salt, hash,
                    login_attempts, locked_after
             FROM identities WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| GateError::NotFound(format!("Identity {}", id)))?;

        Ok(Self::row_to_identity(&row))
    }

    /// All ids registered under `email`, ordered by id. Zero, one or many
    /// results are all legitimate.
    pub async fn find_ids_by_email(&self, email: &str) -> GateResult<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT id FROM identities WHERE email = ?1 ORDER BY id")
            .bind(email)
            .fetch_all(&self.db)
            .await?;

        Ok(ids)
    }

    /// The canonical record for `email`: the id with the latest `last_mod`.
    /// Equal timestamps break toward the highest id.
    pub async fn resolve_canonical(&self, email: &str) -> GateResult<i64> {
        let rows = sqlx::query("SELECT id, last_mod FROM identities WHERE email = ?1")
            .bind(email)
            .fetch_all(&self.db)
            .await?;

        rows.iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let last_mod: DateTime<Utc> = row.get("last_mod");
                (last_mod, id)
            })
            .max()
            .map(|(_, id)| id)
            .ok_or_else(|| GateError::NotFound(format!("Identity for email {}", email)))
    }

    /// Delete every record for `email` except the canonical one. No-op when
    /// one or zero records exist. Returns the number of records removed.
    pub async fn prune_duplicates(&self, email: &str) -> GateResult<u64> {
        let lock = self.email_lock(email);
        let _guard = lock.lock().await;

        let ids = self.find_ids_by_email(email).await?;
        if ids.len() <= 1 {
            return Ok(0);
        }

        let keep = self.resolve_canonical(email).await?;
        let result = sqlx::query("DELETE FROM identities WHERE email = ?1 AND id != ?2")
            .bind(email)
            .bind(keep)
            .execute(&self.db)
            .await?;

        let removed = result.rows_affected();
        tracing::info!(email, keep, removed, "Pruned duplicate identities");
        Ok(removed)
    }

    /// One durable single-column write. The column must appear in the
    /// static identity column metadata.
    pub async fn update_field(&self, id: i64, column: &str, value: Option<&str>) -> GateResult<()> {
        if !IDENTITY_COLUMNS.iter().any(|c| c.name == column) {
            return Err(GateError::Validation(format!(
                "Unknown identity column: {}",
                column
            )));
        }

        // Column name is whitelisted above, the value is still bound.
        let sql = format!("UPDATE identities SET {} = ?1 WHERE id = ?2", column);
        let result = sqlx::query(&sql).bind(value).bind(id).execute(&self.db).await?;

        if result.rows_affected() == 0 {
            return Err(GateError::NotFound(format!("Identity {}", id)));
        }

        Ok(())
    }

    /// Rewrite every stored field of `identity` as a sequence of
    /// single-field writes. Not atomic: a failure partway leaves the
    /// earlier writes committed. Kept behind this one method so callers
    /// survive a future transactional upgrade unchanged.
    pub async fn update_all(&self, identity: &Identity) -> GateResult<()> {
        for (column, value) in Self::field_values(identity) {
            self.update_field(identity.id, column, value.as_deref()).await?;
        }
        Ok(())
    }

    /// Check `secret` against the canonical record for `email`.
    ///
    /// Returns `false` uniformly for unknown email and wrong secret. On
    /// success refreshes `last_login` and clears the attempt counter; on a
    /// wrong secret the counter is incremented.
    pub async fn authenticate(&self, email: &str, secret: &str) -> GateResult<bool> {
        let id = match self.resolve_canonical(email).await {
            Ok(id) => id,
            Err(GateError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        let row = sqlx::query("SELECT salt, hash FROM identities WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        let (salt, hash) = match row {
            Some(row) => (row.get::<String, _>("salt"), row.get::<String, _>("hash")),
            None => return Ok(false),
        };

        if self.credentials.verify(email, secret, &salt, &hash) {
            sqlx::query(
                "UPDATE identities SET last_login = ?1, login_attempts = 0 WHERE id = ?2",
            )
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;

            Ok(true)
        } else {
            sqlx::query("UPDATE identities SET login_attempts = login_attempts + 1 WHERE id = ?1")
                .bind(id)
                .execute(&self.db)
                .await?;

            Ok(false)
        }
    }

    /// Merge an externally scraped profile into the canonical record for
    /// `email`, refreshing the credential pair alongside it; creates a new
    /// identity when none exists. Returns the canonical id.
    pub async fn merge_sso_profile(
        &self,
        email: &str,
        profile: &ProfileUpdate,
        salt: &str,
        hash: &str,
    ) -> GateResult<i64> {
        Self::validate_email(email)?;

        let lock = self.email_lock(email);
        let _guard = lock.lock().await;

        let ids = self.find_ids_by_email(email).await?;
        if ids.is_empty() {
            return self
                .create_identity(&NewIdentity {
                    email: email.to_string(),
                    name: profile.name.clone(),
                    phone: profile.phone.clone(),
                    title: profile.title.clone(),
                    last_mod_by: Some("sso".to_string()),
                    salt: salt.to_string(),
                    hash: hash.to_string(),
                    ..Default::default()
                })
                .await;
        }

        let id = self.resolve_canonical(email).await?;
        let now = Utc::now().to_rfc3339();

        // Field-by-field, matching the update granularity of the store.
        let updates: [(&str, Option<&str>); 9] = [
            ("name", profile.name.as_deref()),
            ("phone", profile.phone.as_deref()),
            ("title", profile.title.as_deref()),
            ("email", Some(email)),
            ("last_mod_by", Some("sso")),
            ("last_mod", Some(&now)),
            ("last_login", Some(&now)),
            ("salt", Some(salt)),
            ("hash", Some(hash)),
        ];
        for (column, value) in updates {
            self.update_field(id, column, value).await?;
        }

        tracing::info!(id, email, "Merged SSO profile into identity");
        Ok(id)
    }

    /// Regenerate the salt/hash pair for the canonical record of `email`.
    /// The pair is always replaced together, never independently.
    pub async fn set_password(&self, email: &str, secret: &str) -> GateResult<()> {
        let lock = self.email_lock(email);
        let _guard = lock.lock().await;

        let id = self.resolve_canonical(email).await?;
        let cred = self.credentials.generate(email, secret);

        sqlx::query(
            "UPDATE identities SET salt = ?1, hash = ?2, last_mod = ?3 WHERE id = ?4",
        )
        .bind(&cred.salt)
        .bind(&cred.hash)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Admin helper: register an identity with the fixed default secret.
    pub async fn quick_add(&self, email: &str, name: Option<&str>, role: Role) -> GateResult<i64> {
        Self::validate_email(email)?;

        let lock = self.email_lock(email);
        let _guard = lock.lock().await;

        let cred = self.credentials.generate(email, QUICK_ADD_DEFAULT_SECRET);
        self.create_identity(&NewIdentity {
            email: email.to_string(),
            name: name.map(str::to_string),
            role: Some(role),
            last_mod_by: Some("admin".to_string()),
            salt: cred.salt,
            hash: cred.hash,
            ..Default::default()
        })
        .await
    }

    fn field_values(identity: &Identity) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("email", Some(identity.email.clone())),
            ("name", identity.name.clone()),
            ("nickname", identity.nickname.clone()),
            ("title", identity.title.clone()),
            ("phone", identity.phone.clone()),
            ("supervisor_name", identity.supervisor_name.clone()),
            ("supervisor_phone", identity.supervisor_phone.clone()),
            ("role", Some(identity.role.as_str().to_string())),
            ("last_mod_by", identity.last_mod_by.clone()),
            ("last_mod", Some(identity.last_mod.to_rfc3339())),
            ("first_login", Some(identity.first_login.to_rfc3339())),
            ("last_login", Some(identity.last_login.to_rfc3339())),
            ("salt", Some(identity.salt.clone())),
            ("hash", Some(identity.hash.clone())),
            ("login_attempts", Some(identity.login_attempts.to_string())),
            ("locked_after", identity.locked_after.map(|t| t.to_rfc3339())),
        ]
    }

    fn row_to_identity(row: &sqlx::sqlite::SqliteRow) -> Identity {
        Identity {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            nickname: row.get("nickname"),
            title: row.get("title"),
            phone: row.get("phone"),
            supervisor_name: row.get("supervisor_name"),
            supervisor_phone: row.get("supervisor_phone"),
            role: Role::parse(row.get::<String, _>("role").as_str()),
            last_mod_by: row.get("last_mod_by"),
            last_mod: row.get("last_mod"),
            first_login: row.get("first_login"),
            last_login: row.get("last_login"),
            salt: row.get("salt"),
            hash: row.get("hash"),
            login_attempts: row.get("login_attempts"),
            locked_after: row.get("locked_after"),
        }
    }
}
