//! In-memory backends

use super::{SessionStore, UserRepository};
use crate::error::AuthError;
use crate::models::{NewSession, SessionRecord, User};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Users held in a map keyed by id
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn save(&self, user: &User) -> Result<(), AuthError> {
        let mut users = self.users.write().await;

        if users
            .values()
            .any(|existing| existing.email == user.email && existing.id != user.id)
        {
            return Err(AuthError::Conflict(
                "User with this email already exists".to_string(),
            ));
        }

        users.insert(user.id, user.clone());
        Ok(())
    }
}

/// Sessions held in a map keyed by id
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: NewSession) -> Result<SessionRecord, AuthError> {
        let record = SessionRecord::from_new(Uuid::new_v4(), session);
        self.sessions
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn record_tokens(
        &self,
        session_id: Uuid,
        access_token_hash: &str,
        refresh_token_hash: &str,
    ) -> Result<(), AuthError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| AuthError::NotFound("Session".to_string()))?;

        session.access_token_hash = Some(access_token_hash.to_string());
        session.refresh_token_hash = Some(refresh_token_hash.to_string());
        Ok(())
    }

    async fn rotate_access(
        &self,
        session_id: Uuid,
        access_token_hash: &str,
        access_token_expires_at: DateTime<Utc>,
        refresh_token_hash: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| AuthError::NotFound("Session".to_string()))?;

        session.access_token_hash = Some(access_token_hash.to_string());
        session.access_token_expires_at = access_token_expires_at;
        if let Some(hash) = refresh_token_hash {
            session.refresh_token_hash = Some(hash.to_string());
        }
        session.touch(at);
        Ok(())
    }

    async fn find(&self, session_id: Uuid) -> Result<Option<SessionRecord>, AuthError> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn find_active(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<SessionRecord>, AuthError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(&session_id)
            .filter(|s| s.user_id == user_id && s.is_active())
            .cloned())
    }

    async fn touch(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<(), AuthError> {
        if let Some(session) = self.sessions.write().await.get_mut(&session_id) {
            session.touch(at);
        }
        Ok(())
    }

    async fn revoke(&self, session_id: Uuid, user_id: Uuid) -> Result<bool, AuthError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(session) if session.user_id == user_id => Ok(session.revoke()),
            _ => Ok(false),
        }
    }

    async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let mut sessions = self.sessions.write().await;
        let revoked = sessions
            .values_mut()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.revoke())
            .filter(|was_active| *was_active)
            .count();
        Ok(revoked as u64)
    }

    async fn list_active(&self, user_id: Uuid) -> Result<Vec<SessionRecord>, AuthError> {
        let sessions = self.sessions.read().await;
        let mut active: Vec<SessionRecord> = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::models::DeviceInfo;
    use chrono::Duration;
    use tokio_test::block_on;

    fn new_session(user_id: Uuid, now: DateTime<Utc>) -> NewSession {
        NewSession::for_login(
            user_id,
            &DeviceInfo::default(),
            false,
            now,
            &AuthConfig::default(),
        )
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let repo = InMemoryUserRepository::new();
        let now = Utc::now();
        let first = User::new("a@example.com", "A", "One", None, "h", now);
        let second = User::new("a@example.com", "A", "Two", None, "h", now);

        block_on(repo.save(&first)).unwrap();
        let err = block_on(repo.save(&second)).unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));

        // saving the same user again is an update
        block_on(repo.save(&first)).unwrap();
        assert_eq!(block_on(repo.len()), 1);
    }

    #[test]
    fn revoke_is_scoped_and_terminal() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        let owner = Uuid::new_v4();
        let session = block_on(store.create(new_session(owner, now))).unwrap();

        assert!(!block_on(store.revoke(session.id, Uuid::new_v4())).unwrap());
        assert!(block_on(store.revoke(session.id, owner)).unwrap());
        assert!(!block_on(store.revoke(session.id, owner)).unwrap());

        block_on(store.touch(session.id, now + Duration::minutes(1))).unwrap();
        let stored = block_on(store.find(session.id)).unwrap().unwrap();
        assert!(!stored.is_active());
        assert_eq!(stored.last_used_at, now + Duration::minutes(1));
        assert!(block_on(store.find_active(session.id, owner))
            .unwrap()
            .is_none());
    }

    #[test]
    fn revoke_all_counts_only_active_sessions() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        let s1 = block_on(store.create(new_session(owner, now))).unwrap();
        block_on(store.create(new_session(owner, now))).unwrap();
        block_on(store.create(new_session(owner, now))).unwrap();
        block_on(store.create(new_session(other, now))).unwrap();
        block_on(store.revoke(s1.id, owner)).unwrap();

        assert_eq!(block_on(store.revoke_all(owner)).unwrap(), 2);
        assert_eq!(block_on(store.revoke_all(owner)).unwrap(), 0);
        assert_eq!(block_on(store.list_active(other)).unwrap().len(), 1);
    }

    #[test]
    fn list_active_orders_by_last_use() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        let owner = Uuid::new_v4();

        let older = block_on(store.create(new_session(owner, now))).unwrap();
        let newer = block_on(store.create(new_session(owner, now))).unwrap();
        block_on(store.touch(older.id, now + Duration::minutes(5))).unwrap();

        let listed = block_on(store.list_active(owner)).unwrap();
        assert_eq!(listed[0].id, older.id);
        assert_eq!(listed[1].id, newer.id);
    }

    #[test]
    fn rotate_access_keeps_refresh_hash_unless_given() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        let session = block_on(store.create(new_session(Uuid::new_v4(), now))).unwrap();
        block_on(store.record_tokens(session.id, "a1", "r1")).unwrap();

        let later = now + Duration::minutes(10);
        block_on(store.rotate_access(session.id, "a2", later, None, later)).unwrap();
        let stored = block_on(store.find(session.id)).unwrap().unwrap();
        assert_eq!(stored.access_token_hash.as_deref(), Some("a2"));
        assert_eq!(stored.refresh_token_hash.as_deref(), Some("r1"));
        assert_eq!(stored.access_token_expires_at, later);
        assert_eq!(stored.last_used_at, later);

        block_on(store.rotate_access(session.id, "a3", later, Some("r2"), later)).unwrap();
        let stored = block_on(store.find(session.id)).unwrap().unwrap();
        assert_eq!(stored.refresh_token_hash.as_deref(), Some("r2"));
    }

    #[test]
    fn missing_session_cannot_record_tokens() {
        let store = InMemorySessionStore::new();
        let err = block_on(store.record_tokens(Uuid::new_v4(), "a", "r")).unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }
}
