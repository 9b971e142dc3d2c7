//! Sign-in sessions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-side sign-in session. The `id` doubles as the cookie value.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// New session with a random token, valid for `lifetime` from now
    pub fn issue(user_id: i64, lifetime: Duration) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4().simple().to_string(),
            user_id,
            expires_at: created_at + lifetime,
            created_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue() {
        let a = Session::issue(7, Duration::days(14));
        let b = Session::issue(7, Duration::days(14));
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 32);
        assert!(!a.is_expired());

        let stale = Session::issue(7, Duration::seconds(-1));
        assert!(stale.is_expired());
    }
}
