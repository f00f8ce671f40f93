//! 应用数据的唯一来源
//!
//! 用户、故事、通知、通知已读水位和会话身份都保存在一把写锁之后；
//! 每次修改都在持有锁期间把受影响的集合写回存储。

use crate::{
    config::Config,
    error::{AppError, Result},
    models::{
        comment::{Comment, NewComment},
        notification::{Notification, UserMeta},
        story::{NewStory, Story},
        user::User,
    },
    services::{
        session::{SessionId, SessionRegistry},
        storage::{Storage, StorageError},
    },
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

pub const USERS_KEY: &str = "hakayat_users";
pub const STORIES_KEY: &str = "hakayat_stories";
pub const NOTIFICATIONS_KEY: &str = "hakayat_notifications";
pub const USER_META_KEY: &str = "hakayat_user_meta";
pub const SESSIONS_KEY: &str = "hakayat_sessions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Users,
    Stories,
    Notifications,
    UserMeta,
    Sessions,
}

impl Collection {
    fn key(&self) -> &'static str {
        match self {
            Self::Users => USERS_KEY,
            Self::Stories => STORIES_KEY,
            Self::Notifications => NOTIFICATIONS_KEY,
            Self::UserMeta => USER_META_KEY,
            Self::Sessions => SESSIONS_KEY,
        }
    }
}

/// 可持久化的全部状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub users: Vec<User>,
    pub stories: Vec<Story>,
    pub notifications: Vec<Notification>,
    pub user_meta: BTreeMap<String, UserMeta>,
    pub sessions: BTreeMap<SessionId, SessionRecord>,
}

/// 会话登录身份，与令牌同时过期
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug)]
struct StoreState {
    data: StoreSnapshot,
    /// 最近一次分配的时间戳；保证时间戳严格递增
    last_stamp: DateTime<Utc>,
}

impl StoreState {
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = if now > self.last_stamp {
            now
        } else {
            self.last_stamp + Duration::microseconds(1)
        };
        self.last_stamp = stamp;
        stamp
    }

    fn story_mut(&mut self, id: &str) -> Option<&mut Story> {
        self.data.stories.iter_mut().find(|s| s.id == id)
    }
}

#[derive(Clone)]
pub struct Store {
    state: Arc<RwLock<StoreState>>,
    storage: Arc<dyn Storage>,
    sessions: SessionRegistry,
    session_ttl: Duration,
    notification_limit: usize,
}

impl Store {
    /// 从存储中恢复状态；没有用户数据时写入演示用户
    pub fn open(storage: Arc<dyn Storage>, config: &Config) -> Result<Self> {
        let users = load_or(&*storage, USERS_KEY, seed_users)?;
        let stories: Vec<Story> = load_or(&*storage, STORIES_KEY, Vec::new)?;
        let notifications: Vec<Notification> =
            load_or(&*storage, NOTIFICATIONS_KEY, Vec::new)?;
        let user_meta = load_or(&*storage, USER_META_KEY, BTreeMap::new)?;
        let sessions = load_or(&*storage, SESSIONS_KEY, BTreeMap::new)?;

        let data = StoreSnapshot {
            users,
            stories,
            notifications,
            user_meta,
            sessions,
        };
        let last_stamp = latest_stamp(&data);
        let session_ttl = Duration::hours(config.session_ttl_hours);

        info!(
            "Store ready: {} users, {} stories, {} notifications",
            data.users.len(),
            data.stories.len(),
            data.notifications.len()
        );

        Ok(Self {
            state: Arc::new(RwLock::new(StoreState { data, last_stamp })),
            storage,
            sessions: SessionRegistry::new(session_ttl),
            session_ttl,
            notification_limit: config.notification_limit,
        })
    }

    #[cfg(test)]
    pub(crate) fn session_registry(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn open_session(&self) -> SessionId {
        self.sessions.open()
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> StoreSnapshot {
        self.state.read().data.clone()
    }

    // ---- users & sessions ----

    pub fn login(&self, session: &SessionId, name: &str) -> Result<User> {
        let name = name.trim();
        crate::utils::validation::validate_display_name(name)?;

        let mut state = self.state.write();
        let wanted = name.to_lowercase();
        let existing = state
            .data
            .users
            .iter()
            .find(|u| u.name.to_lowercase() == wanted)
            .cloned();

        let (user, created) = match existing {
            Some(user) => (user, false),
            None => {
                let user = User {
                    id: format!("user-{}", Uuid::new_v4()),
                    name: name.to_string(),
                    avatar: User::placeholder_avatar(name),
                };
                state.data.users.push(user.clone());
                (user, true)
            }
        };

        let now = Utc::now();
        let pruned = prune_sessions(&mut state.data.sessions, now);
        if pruned > 0 {
            debug!("Pruned {} expired sessions", pruned);
        }
        state.data.sessions.insert(
            session.clone(),
            SessionRecord {
                user: user.clone(),
                expires_at: now + self.session_ttl,
            },
        );

        if created {
            info!("Created user {} ({})", user.id, user.name);
            self.persist(&state, &[Collection::Users, Collection::Sessions])?;
        } else {
            debug!("User {} logged in", user.id);
            self.persist(&state, &[Collection::Sessions])?;
        }
        Ok(user)
    }

    pub fn logout(&self, session: &SessionId) -> Result<()> {
        let mut state = self.state.write();
        if state.data.sessions.remove(session).is_some() {
            debug!("Session {} logged out", session);
            self.persist(&state, &[Collection::Sessions])?;
        }
        Ok(())
    }

    pub fn current_user(&self, session: &SessionId) -> Option<User> {
        let now = Utc::now();
        self.state
            .read()
            .data
            .sessions
            .get(session)
            .filter(|record| record.is_live(now))
            .map(|record| record.user.clone())
    }

    /// 清理过期会话（登录身份和浏览标记），返回清理的登录身份数量
    pub fn prune_expired_sessions(&self) -> Result<usize> {
        let now = Utc::now();
        let viewed = self.sessions.prune_expired(now);

        let mut state = self.state.write();
        let pruned = prune_sessions(&mut state.data.sessions, now);
        if pruned > 0 {
            self.persist(&state, &[Collection::Sessions])?;
        }

        info!("Pruned {} expired sessions ({} viewed sets)", pruned, viewed);
        Ok(pruned)
    }

    /// 更新头像，同时刷新所有以该用户登录的会话副本
    pub fn update_user_avatar(&self, user_id: &str, avatar: String) -> Result<Option<User>> {
        let mut state = self.state.write();
        let updated = match state.data.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.avatar = avatar;
                user.clone()
            }
            None => return Ok(None),
        };

        let mut touched = vec![Collection::Users];
        let mut session_changed = false;
        for record in state.data.sessions.values_mut() {
            if record.user.id == user_id {
                record.user = updated.clone();
                session_changed = true;
            }
        }
        if session_changed {
            touched.push(Collection::Sessions);
        }

        self.persist(&state, &touched)?;
        Ok(Some(updated))
    }

    pub fn get_user(&self, id: &str) -> Option<User> {
        self.state.read().data.users.iter().find(|u| u.id == id).cloned()
    }

    pub fn users(&self) -> Vec<User> {
        self.state.read().data.users.clone()
    }

    // ---- stories ----

    pub fn get_story(&self, id: &str) -> Option<Story> {
        self.state.read().data.stories.iter().find(|s| s.id == id).cloned()
    }

    pub fn stories(&self) -> Vec<Story> {
        self.state.read().data.stories.clone()
    }

    /// 每个会话对同一故事只计一次浏览；返回本次是否计数
    pub fn increment_story_view(&self, session: &SessionId, id: &str) -> Result<bool> {
        let mut state = self.state.write();
        if state.story_mut(id).is_none() || !self.sessions.mark_viewed(session, id) {
            return Ok(false);
        }

        if let Some(story) = state.story_mut(id) {
            story.views += 1;
        }
        self.persist(&state, &[Collection::Stories])?;
        Ok(true)
    }

    pub fn create_story(&self, new_story: NewStory) -> Result<Story> {
        let mut state = self.state.write();
        let created_at = state.stamp();

        let story = Story {
            id: format!("story-{}", Uuid::new_v4()),
            title: new_story.title,
            content: new_story.content,
            author_id: new_story.author_id,
            cover_image: new_story.cover_image,
            category: new_story.category,
            created_at,
            views: 0,
            likes: Vec::new(),
            comments: Vec::new(),
        };
        state.data.stories.insert(0, story.clone());

        let notification = Notification {
            id: format!("notif-{}", Uuid::new_v4()),
            story_id: story.id.clone(),
            story_title: story.title.clone(),
            author_id: story.author_id.clone(),
            timestamp: created_at,
        };
        state.data.notifications.insert(0, notification);
        state.data.notifications.truncate(self.notification_limit);

        info!("Created story {} by {}", story.id, story.author_id);
        self.persist(&state, &[Collection::Stories, Collection::Notifications])?;
        Ok(story)
    }

    /// 整体替换同 ID 的故事；不存在时返回 false
    pub fn update_story(&self, story: Story) -> Result<bool> {
        let mut state = self.state.write();
        let id = story.id.clone();
        match state.story_mut(&id) {
            Some(slot) => *slot = story,
            None => return Ok(false),
        }
        debug!("Updated story {}", id);
        self.persist(&state, &[Collection::Stories])?;
        Ok(true)
    }

    pub fn delete_story(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write();
        let before = state.data.stories.len();
        state.data.stories.retain(|s| s.id != id);
        if state.data.stories.len() == before {
            return Ok(false);
        }
        info!("Deleted story {}", id);
        self.persist(&state, &[Collection::Stories])?;
        Ok(true)
    }

    /// 返回切换后的点赞状态；故事不存在时返回 None
    pub fn toggle_like(&self, story_id: &str, user_id: &str) -> Result<Option<bool>> {
        let mut state = self.state.write();
        let liked = match state.story_mut(story_id) {
            Some(story) => {
                if story.is_liked_by(user_id) {
                    story.likes.retain(|id| id != user_id);
                    false
                } else {
                    story.likes.push(user_id.to_string());
                    true
                }
            }
            None => return Ok(None),
        };
        self.persist(&state, &[Collection::Stories])?;
        Ok(Some(liked))
    }

    pub fn add_comment(&self, story_id: &str, new_comment: NewComment) -> Result<Option<Comment>> {
        let mut state = self.state.write();
        if state.story_mut(story_id).is_none() {
            return Ok(None);
        }

        let comment = Comment {
            id: format!("comment-{}", Uuid::new_v4()),
            author_id: new_comment.author_id,
            content: new_comment.content,
            created_at: state.stamp(),
        };
        if let Some(story) = state.story_mut(story_id) {
            story.comments.insert(0, comment.clone());
        }

        debug!("Added comment {} to story {}", comment.id, story_id);
        self.persist(&state, &[Collection::Stories])?;
        Ok(Some(comment))
    }

    // ---- notifications ----

    pub fn notifications(&self) -> Vec<Notification> {
        self.state.read().data.notifications.clone()
    }

    pub fn unread_count(&self, session: &SessionId) -> usize {
        let state = self.state.read();
        let Some(user) = state
            .data
            .sessions
            .get(session)
            .filter(|record| record.is_live(Utc::now()))
            .map(|record| &record.user)
        else {
            return 0;
        };

        match state
            .data
            .user_meta
            .get(&user.id)
            .and_then(|meta| meta.last_notification_check)
        {
            Some(last_check) => state
                .data
                .notifications
                .iter()
                .filter(|n| n.timestamp > last_check)
                .count(),
            None => state.data.notifications.len(),
        }
    }

    pub fn mark_notifications_as_read(&self, session: &SessionId) -> Result<()> {
        let mut state = self.state.write();
        let Some(user_id) = state
            .data
            .sessions
            .get(session)
            .filter(|record| record.is_live(Utc::now()))
            .map(|record| record.user.id.clone())
        else {
            return Ok(());
        };

        let now = state.stamp();
        state
            .data
            .user_meta
            .entry(user_id)
            .or_default()
            .last_notification_check = Some(now);

        self.persist(&state, &[Collection::UserMeta])?;
        Ok(())
    }

    fn persist(&self, state: &StoreState, collections: &[Collection]) -> Result<()> {
        for collection in collections {
            let value = match collection {
                Collection::Users => serde_json::to_value(&state.data.users)?,
                Collection::Stories => serde_json::to_value(&state.data.stories)?,
                Collection::Notifications => serde_json::to_value(&state.data.notifications)?,
                Collection::UserMeta => serde_json::to_value(&state.data.user_meta)?,
                Collection::Sessions => serde_json::to_value(&state.data.sessions)?,
            };
            if let Err(e) = self.storage.save(collection.key(), &value) {
                error!("Failed to persist {}: {}", collection.key(), e);
                return Err(e.into());
            }
        }
        Ok(())
    }
}

fn prune_sessions(sessions: &mut BTreeMap<SessionId, SessionRecord>, now: DateTime<Utc>) -> usize {
    let before = sessions.len();
    sessions.retain(|_, record| record.is_live(now));
    before - sessions.len()
}

fn load_or<T, F>(storage: &dyn Storage, key: &str, default: F) -> Result<T>
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match storage.load(key)? {
        Some(value) => serde_json::from_value(value).map_err(|source| {
            AppError::from(StorageError::Corrupt {
                key: key.to_string(),
                source,
            })
        }),
        None => Ok(default()),
    }
}

fn latest_stamp(data: &StoreSnapshot) -> DateTime<Utc> {
    let stories = data.stories.iter().flat_map(|s| {
        std::iter::once(s.created_at).chain(s.comments.iter().map(|c| c.created_at))
    });
    let notifications = data.notifications.iter().map(|n| n.timestamp);
    let watermarks = data
        .user_meta
        .values()
        .filter_map(|meta| meta.last_notification_check);

    stories
        .chain(notifications)
        .chain(watermarks)
        .max()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn seed_users() -> Vec<User> {
    [
        ("user-1", "مؤلف تجريبي", "user1"),
        ("user-2", "عاشق الفضاء", "user2"),
        ("user-3", "أسطورة الخيال", "user3"),
    ]
    .into_iter()
    .map(|(id, name, seed)| User {
        id: id.to_string(),
        name: name.to_string(),
        avatar: format!("https://picsum.photos/seed/{}/100/100", seed),
    })
    .collect()
}
