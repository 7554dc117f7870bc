//! Per-user photo sessions.
//!
//! A session collects the two photos of one swap. The first photo a user
//! sends is the recipient (the picture that is kept), the second is the
//! donor (the face that is transplanted). Completing a pair closes the
//! session; the next photo starts a new one.

use image::RgbImage;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Identifier the transport layer uses for a user or chat.
pub type UserId = u64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("too many open sessions (limit {limit})")]
    TooManySessions { limit: usize },
}

/// Two photos ready for the engine.
#[derive(Debug, Clone)]
pub struct PhotoPair {
    pub recipient: RgbImage,
    pub donor: RgbImage,
}

/// What a submitted photo did to its session.
#[derive(Debug)]
pub enum SessionProgress {
    /// Recipient stored; waiting for the donor photo.
    AwaitingDonor,
    /// Both photos present; the session has been closed.
    Complete(PhotoPair),
}

struct PendingSession {
    recipient: RgbImage,
    opened: Instant,
}

/// Open sessions keyed by user. Owned by the service, never global.
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, PendingSession>>,
    ttl: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            max_sessions,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, PendingSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a photo to `user`'s session.
    pub fn push(&self, user: UserId, photo: RgbImage) -> Result<SessionProgress, SessionError> {
        let mut sessions = self.lock();

        if let Some(pending) = sessions.remove(&user) {
            if pending.opened.elapsed() < self.ttl {
                tracing::debug!(user, "session complete");
                return Ok(SessionProgress::Complete(PhotoPair {
                    recipient: pending.recipient,
                    donor: photo,
                }));
            }
            tracing::debug!(user, "session expired; starting over");
        }

        if sessions.len() >= self.max_sessions {
            let ttl = self.ttl;
            sessions.retain(|_, s| s.opened.elapsed() < ttl);
            if sessions.len() >= self.max_sessions {
                tracing::warn!(user, limit = self.max_sessions, "session limit reached");
                return Err(SessionError::TooManySessions {
                    limit: self.max_sessions,
                });
            }
        }

        sessions.insert(
            user,
            PendingSession {
                recipient: photo,
                opened: Instant::now(),
            },
        );
        tracing::debug!(user, "recipient photo stored");
        Ok(SessionProgress::AwaitingDonor)
    }

    /// Drop `user`'s half-finished session. Returns whether one existed.
    pub fn reset(&self, user: UserId) -> bool {
        self.lock().remove(&user).is_some()
    }

    /// True when `user` has sent a recipient photo that has not expired.
    pub fn is_pending(&self, user: UserId) -> bool {
        self.lock()
            .get(&user)
            .is_some_and(|s| s.opened.elapsed() < self.ttl)
    }

    /// Discard expired sessions; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        let ttl = self.ttl;
        sessions.retain(|_, s| s.opened.elapsed() < ttl);
        let purged = before - sessions.len();
        if purged > 0 {
            tracing::info!(purged, remaining = sessions.len(), "expired sessions purged");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn photo(shade: u8) -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([shade, shade, shade]))
    }

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(600), 16)
    }

    #[test]
    fn test_first_photo_is_recipient() {
        let s = store();
        assert!(matches!(s.push(1, photo(10)).unwrap(), SessionProgress::AwaitingDonor));
        assert!(s.is_pending(1));
        match s.push(1, photo(20)).unwrap() {
            SessionProgress::Complete(pair) => {
                assert_eq!(pair.recipient.get_pixel(0, 0).0, [10, 10, 10]);
                assert_eq!(pair.donor.get_pixel(0, 0).0, [20, 20, 20]);
            }
            other => panic!("expected a complete pair, got {other:?}"),
        }
        assert!(!s.is_pending(1));
        assert!(s.is_empty());
    }

    #[test]
    fn test_third_photo_starts_new_session() {
        let s = store();
        s.push(1, photo(1)).unwrap();
        s.push(1, photo(2)).unwrap();
        assert!(matches!(s.push(1, photo(3)).unwrap(), SessionProgress::AwaitingDonor));
    }

    #[test]
    fn test_users_are_isolated() {
        let s = store();
        s.push(1, photo(1)).unwrap();
        assert!(matches!(s.push(2, photo(2)).unwrap(), SessionProgress::AwaitingDonor));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_reset() {
        let s = store();
        s.push(7, photo(1)).unwrap();
        assert!(s.reset(7));
        assert!(!s.reset(7));
        assert!(matches!(s.push(7, photo(2)).unwrap(), SessionProgress::AwaitingDonor));
    }

    #[test]
    fn test_expired_session_restarts() {
        let s = SessionStore::new(Duration::ZERO, 16);
        s.push(1, photo(1)).unwrap();
        assert!(!s.is_pending(1));
        assert!(matches!(s.push(1, photo(2)).unwrap(), SessionProgress::AwaitingDonor));
        assert_eq!(s.purge_expired(), 1);
        assert!(s.is_empty());
    }

    #[test]
    fn test_session_limit() {
        let s = SessionStore::new(Duration::from_secs(600), 2);
        s.push(1, photo(1)).unwrap();
        s.push(2, photo(1)).unwrap();
        assert_eq!(
            s.push(3, photo(1)).unwrap_err(),
            SessionError::TooManySessions { limit: 2 }
        );
        // Completing an existing pair is still allowed at the limit.
        assert!(matches!(s.push(1, photo(2)).unwrap(), SessionProgress::Complete(_)));
    }
}
