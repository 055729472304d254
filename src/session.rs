use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

/// An authenticated login. Created only by a successful `login_user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Holds at most one session, optionally mirrored to a JSON file so a later
/// process can pick it up.
pub struct SessionSlot {
    current: RwLock<Option<Session>>,
    file: Option<PathBuf>,
    ttl: Duration,
}

impl SessionSlot {
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            current: RwLock::new(None),
            file: None,
            ttl,
        }
    }

    /// Restores a previously persisted session if the file holds one.
    pub fn persistent(file: PathBuf, ttl: Duration) -> Self {
        let restored = fs::read_to_string(&file)
            .ok()
            .and_then(|content| serde_json::from_str::<Session>(&content).ok());
        if restored.is_some() {
            log::debug!("Restored session from {:?}", file);
        }
        Self {
            current: RwLock::new(restored),
            file: Some(file),
            ttl,
        }
    }

    pub fn begin(&self, user_id: &str) -> Session {
        self.begin_at(user_id, Utc::now())
    }

    pub fn begin_at(&self, user_id: &str, now: DateTime<Utc>) -> Session {
        let session = Session {
            user_id: user_id.to_string(),
            started_at: now,
            // Saturates instead of overflowing for very long TTLs
            expires_at: now
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        if let Ok(mut current) = self.current.write() {
            *current = Some(session.clone());
        }
        self.persist(Some(&session));
        session
    }

    pub fn current(&self) -> Option<Session> {
        self.current_at(Utc::now())
    }

    /// The live session, clearing it first if it has expired.
    pub fn current_at(&self, now: DateTime<Utc>) -> Option<Session> {
        let session = self.current.read().ok()?.clone()?;
        if session.is_expired_at(now) {
            log::info!("Session for {} expired", session.user_id);
            self.end();
            return None;
        }
        Some(session)
    }

    pub fn end(&self) {
        if let Ok(mut current) = self.current.write() {
            *current = None;
        }
        self.persist(None);
    }

    fn persist(&self, session: Option<&Session>) {
        let Some(file) = &self.file else {
            return;
        };
        let result = match session {
            Some(session) => file
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .map_err(|e| format!("creating parent directory: {}", e))
                .and_then(|_| serde_json::to_string_pretty(session).map_err(|e| e.to_string()))
                .and_then(|content| fs::write(file, content).map_err(|e| e.to_string())),
            None if file.exists() => fs::remove_file(file).map_err(|e| e.to_string()),
            None => Ok(()),
        };
        if let Err(e) = result {
            log::warn!("Could not persist session to {:?}: {}", file, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_and_end() {
        let slot = SessionSlot::in_memory(Duration::hours(1));
        assert!(slot.current().is_none());

        let s = slot.begin("u1");
        assert_eq!(slot.current(), Some(s));

        slot.end();
        assert!(slot.current().is_none());
    }

    #[test]
    fn test_expired_session_is_dropped() {
        let slot = SessionSlot::in_memory(Duration::minutes(30));
        let start = Utc::now();
        slot.begin_at("u1", start);
        assert!(slot.current_at(start + Duration::minutes(29)).is_some());
        assert!(slot.current_at(start + Duration::minutes(30)).is_none());
        // Stays cleared afterwards
        assert!(slot.current_at(start).is_none());
    }

    #[test]
    fn test_persists_under_user_id_key() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested").join("session.json");

        let slot = SessionSlot::persistent(file.clone(), Duration::hours(1));
        slot.begin("u42");
        let content = fs::read_to_string(&file).unwrap();
        assert!(content.contains("\"userId\": \"u42\""));

        let reloaded = SessionSlot::persistent(file.clone(), Duration::hours(1));
        assert_eq!(reloaded.current().map(|s| s.user_id), Some("u42".to_string()));

        reloaded.end();
        assert!(!file.exists());
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let slot = SessionSlot::in_memory(Duration::weeks(52 * 300_000));
        let s = slot.begin("u1");
        assert_eq!(s.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(slot.current().is_some());
    }

    #[test]
    fn test_persist_failure_keeps_session_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let file = blocker.join("session.json");

        let slot = SessionSlot::persistent(file.clone(), Duration::hours(1));
        slot.begin("u1");
        assert!(!file.exists());
        assert_eq!(slot.current().unwrap().user_id, "u1");
    }
}
