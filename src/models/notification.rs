use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// 新故事发布通知，所有用户共享同一列表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub story_id: String,
    pub story_title: String,
    pub author_id: String,
    pub timestamp: DateTime<Utc>,
}

/// 用户级元数据：通知已读水位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notification_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationWithAuthor {
    #[serde(flatten)]
    pub notification: Notification,
    /// 作者已不存在时为 None，由客户端显示默认名称
    pub author_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFeed {
    pub notifications: Vec<NotificationWithAuthor>,
    pub unread_count: usize,
}
