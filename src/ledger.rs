/// Append-mostly ledger of login/logout session events.
///
/// An event is inserted exactly once at login and mutated at most once at
/// logout; once closed it is immutable. Events are never deleted.
use crate::db::models::{LoginType, LogoutType, NewSessionEvent, SessionEvent};
use crate::error::{GateError, GateResult};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// Ledger over the `events` table
#[derive(Clone)]
pub struct EventLedger {
    db: SqlitePool,
}

impl EventLedger {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Record a login event. When `login_time` is unset it defaults to
    /// now. The event opens with `logout_type = pending`.
    pub async fn record_login(&self, event: &NewSessionEvent) -> GateResult<i64> {
        let login_time = event.login_time.unwrap_or_else(Utc::now);

        let result = sqlx::query(
            "INSERT INTO events (email, device, login_time, login_type, logout_type)
             VALUES (?1, ?2, ?3, ?4, 'pending')",
        )
        .bind(&event.email)
        .bind(&event.device)
        .bind(login_time)
        .bind(event.login_type.as_str())
        .execute(&self.db)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!(id, email = %event.email, login_type = event.login_type.as_str(), "Recorded login event");
        Ok(id)
    }

    /// Close an open event. Only events still `pending` can be closed;
    /// closing an unknown or already-closed event fails with `NoSuchEvent`.
    pub async fn record_logout(&self, event_id: i64, logout_type: LogoutType) -> GateResult<()> {
        if logout_type == LogoutType::Pending {
            return Err(GateError::Validation(
                "Cannot close an event as pending".to_string(),
            ));
        }

        // The pending guard makes closed events immutable at the store,
        // not just by caller discipline.
        let result = sqlx::query(
            "UPDATE events SET logout_time = ?1, logout_type = ?2
             WHERE id = ?3 AND logout_type = 'pending'",
        )
        .bind(Utc::now())
        .bind(logout_type.as_str())
        .bind(event_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GateError::NoSuchEvent(event_id));
        }

        tracing::debug!(event_id, logout_type = logout_type.as_str(), "Recorded logout");
        Ok(())
    }

    /// Load one event by id
    pub async fn find_event(&self, event_id: i64) -> GateResult<SessionEvent> {
        let row = sqlx::query(
            "SELECT id, email, device, login_time, login_type, logout_time, logout_type
             FROM events WHERE id = ?1",
        )
        .bind(event_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| GateError::NotFound(format!("Event {}", event_id)))?;

        Ok(SessionEvent {
            id: row.get("id"),
            email: row.get("email"),
            device: row.get("device"),
            login_time: row.get("login_time"),
            login_type: LoginType::parse(row.get::<String, _>("login_type").as_str()),
            logout_time: row.get::<Option<DateTime<Utc>>, _>("logout_time"),
            logout_type: LogoutType::parse(row.get::<String, _>("logout_type").as_str()),
        })
    }

    /// Number of events recorded for `email`
    pub async fn count_for_email(&self, email: &str) -> GateResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE email = ?1")
            .bind(email)
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn test_ledger() -> EventLedger {
        let pool = db::memory_pool().await;
        db::init_schema(&pool).await.unwrap();
        EventLedger::new(pool)
    }

    fn login_event(email: &str) -> NewSessionEvent {
        NewSessionEvent {
            email: email.to_string(),
            device: "Aurora alpha".to_string(),
            login_time: None,
            login_type: LoginType::Local,
        }
    }

    #[tokio::test]
    async fn test_login_then_logout_lifecycle() {
        let ledger = test_ledger().await;
        let id = ledger.record_login(&login_event("a@b.edu")).await.unwrap();

        let open = ledger.find_event(id).await.unwrap();
        assert_eq!(open.logout_type, LogoutType::Pending);
        assert!(open.logout_time.is_none());

        ledger.record_logout(id, LogoutType::ByUser).await.unwrap();

        let closed = ledger.find_event(id).await.unwrap();
        // Login fields are untouched by logout
        assert_eq!(closed.email, open.email);
        assert_eq!(closed.device, open.device);
        assert_eq!(closed.login_time, open.login_time);
        assert_eq!(closed.login_type, open.login_type);
        assert_eq!(closed.logout_type, LogoutType::ByUser);
        assert!(closed.logout_time.is_some());
    }

    #[tokio::test]
    async fn test_second_logout_is_rejected() {
        let ledger = test_ledger().await;
        let id = ledger.record_login(&login_event("a@b.edu")).await.unwrap();

        ledger.record_logout(id, LogoutType::ByUser).await.unwrap();
        assert!(matches!(
            ledger.record_logout(id, LogoutType::ByInactivity).await,
            Err(GateError::NoSuchEvent(_))
        ));

        // The first close is preserved
        let event = ledger.find_event(id).await.unwrap();
        assert_eq!(event.logout_type, LogoutType::ByUser);
    }

    #[tokio::test]
    async fn test_logout_unknown_event_is_rejected() {
        let ledger = test_ledger().await;
        assert!(matches!(
            ledger.record_logout(41, LogoutType::ByUser).await,
            Err(GateError::NoSuchEvent(41))
        ));
    }

    #[tokio::test]
    async fn test_pending_is_not_a_logout_type() {
        let ledger = test_ledger().await;
        let id = ledger.record_login(&login_event("a@b.edu")).await.unwrap();

        assert!(matches!(
            ledger.record_logout(id, LogoutType::Pending).await,
            Err(GateError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_explicit_login_time_is_kept() {
        let ledger = test_ledger().await;
        let stamp = "2024-05-01T09:30:00Z".parse::<DateTime<Utc>>().unwrap();

        let mut event = login_event("a@b.edu");
        event.login_time = Some(stamp);
        event.login_type = LoginType::Sso;

        let id = ledger.record_login(&event).await.unwrap();
        let read = ledger.find_event(id).await.unwrap();
        assert_eq!(read.login_time, stamp);
        assert_eq!(read.login_type, LoginType::Sso);
    }

    #[tokio::test]
    async fn test_count_for_email() {
        let ledger = test_ledger().await;
        ledger.record_login(&login_event("a@b.edu")).await.unwrap();
        ledger.record_login(&login_event("a@b.edu")).await.unwrap();
        ledger.record_login(&login_event("c@d.edu")).await.unwrap();

        assert_eq!(ledger.count_for_email("a@b.edu").await.unwrap(), 2);
        assert_eq!(ledger.count_for_email("ghost@d.edu").await.unwrap(), 0);
    }
}
