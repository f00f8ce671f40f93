use crate::{
    config::Config,
    error::{AppError, Result},
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// 浏览会话 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(format!("session-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 会话级“已浏览”标记
///
/// 只保存在内存中：服务重启即视为新的浏览会话。
/// 每次记录浏览都会把该会话的过期时间顺延一个令牌有效期，
/// 过期的会话由 [`SessionRegistry::prune_expired`] 清理。
#[derive(Clone)]
pub struct SessionRegistry {
    viewed: Arc<DashMap<SessionId, ViewedStories>>,
    ttl: Duration,
}

struct ViewedStories {
    stories: HashSet<String>,
    expires_at: DateTime<Utc>,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            viewed: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// 分配新的会话 ID；第一次浏览前不占用内存
    pub fn open(&self) -> SessionId {
        let session = SessionId::generate();
        debug!("Opened session {}", session);
        session
    }

    /// 首次标记返回 true
    pub fn mark_viewed(&self, session: &SessionId, story_id: &str) -> bool {
        let expires_at = Utc::now() + self.ttl;
        let mut entry = self
            .viewed
            .entry(session.clone())
            .or_insert_with(|| ViewedStories {
                stories: HashSet::new(),
                expires_at,
            });
        entry.expires_at = expires_at;
        entry.stories.insert(story_id.to_string())
    }

    #[cfg(test)]
    pub(crate) fn has_viewed(&self, session: &SessionId, story_id: &str) -> bool {
        self.viewed
            .get(session)
            .map(|entry| entry.stories.contains(story_id))
            .unwrap_or(false)
    }

    /// 删除在 `now` 之前过期的会话，返回删除数量
    pub fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.viewed.len();
        self.viewed.retain(|_, entry| entry.expires_at > now);
        before - self.viewed.len()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 会话ID
    pub exp: i64,    // 过期时间
    pub iat: i64,    // 签发时间
}

/// 会话令牌（HS256 JWT）
#[derive(Clone)]
pub struct SessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionTokens {
    pub fn new(config: &Config) -> Self {
        let secret = config.session_secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl: Duration::hours(config.session_ttl_hours),
        }
    }

    pub fn issue(&self, session: &SessionId) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: session.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    pub fn verify(&self, token: &str) -> Result<SessionId> {
        let validation = Validation::new(Algorithm::HS256);
        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => {
                debug!("Session token verified for {}", data.claims.sub);
                Ok(SessionId(data.claims.sub))
            }
            Err(e) => {
                warn!("Session token verification failed: {}", e);
                Err(AppError::unauthorized("Invalid session token"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_viewed_only_once_per_session() {
        let registry = SessionRegistry::new(Duration::hours(1));
        let first = registry.open();
        let second = registry.open();

        assert!(registry.mark_viewed(&first, "story-1"));
        assert!(!registry.mark_viewed(&first, "story-1"));
        assert!(registry.has_viewed(&first, "story-1"));

        assert!(!registry.has_viewed(&second, "story-1"));
        assert!(registry.mark_viewed(&second, "story-1"));
    }

    #[test]
    fn test_open_does_not_allocate() {
        let registry = SessionRegistry::new(Duration::hours(1));
        for _ in 0..100 {
            registry.open();
        }
        assert!(registry.viewed.is_empty());
    }

    #[test]
    fn test_prune_drops_only_expired_sessions() {
        let registry = SessionRegistry::new(Duration::hours(1));
        let session = registry.open();
        registry.mark_viewed(&session, "story-1");

        assert_eq!(registry.prune_expired(Utc::now()), 0);
        assert!(registry.has_viewed(&session, "story-1"));

        assert_eq!(registry.prune_expired(Utc::now() + Duration::hours(2)), 1);
        assert!(!registry.has_viewed(&session, "story-1"));
        assert!(registry.viewed.is_empty());
    }

    #[test]
    fn test_token_round_trip() {
        let tokens = SessionTokens::new(&Config::default());
        let session = SessionId::generate();

        let token = tokens.issue(&session).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), session);
    }

    #[test]
    fn test_token_rejects_other_secret() {
        let tokens = SessionTokens::new(&Config::default());
        let other = SessionTokens::new(&Config {
            session_secret: "another-secret".to_string(),
            ..Config::default()
        });

        let token = other.issue(&SessionId::generate()).unwrap();
        assert!(tokens.verify(&token).is_err());
        assert!(tokens.verify("not-a-token").is_err());
    }
}
