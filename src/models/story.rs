use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::Validate;

use crate::models::comment::Comment;
use crate::models::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoryCategory {
    #[default]
    Adventure,
    SciFi,
    Fantasy,
    Romance,
    Mystery,
    Horror,
    Comedy,
    Drama,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown story category: {0}")]
pub struct UnknownCategory(pub String);

impl StoryCategory {
    pub const ALL: [StoryCategory; 8] = [
        StoryCategory::Adventure,
        StoryCategory::SciFi,
        StoryCategory::Fantasy,
        StoryCategory::Romance,
        StoryCategory::Mystery,
        StoryCategory::Horror,
        StoryCategory::Comedy,
        StoryCategory::Drama,
    ];

    /// 序列化使用的键
    pub fn key(&self) -> &'static str {
        match self {
            Self::Adventure => "adventure",
            Self::SciFi => "sci_fi",
            Self::Fantasy => "fantasy",
            Self::Romance => "romance",
            Self::Mystery => "mystery",
            Self::Horror => "horror",
            Self::Comedy => "comedy",
            Self::Drama => "drama",
        }
    }

    /// 界面显示的阿拉伯文名称
    pub fn label(&self) -> &'static str {
        match self {
            Self::Adventure => "مغامرات",
            Self::SciFi => "خيال علمي",
            Self::Fantasy => "خيال",
            Self::Romance => "رومانسي",
            Self::Mystery => "غموض",
            Self::Horror => "رعب",
            Self::Comedy => "كوميدي",
            Self::Drama => "دراما",
        }
    }
}

impl fmt::Display for StoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for StoryCategory {
    type Err = UnknownCategory;

    /// 接受键（不区分大小写）或阿拉伯文名称
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.key().eq_ignore_ascii_case(trimmed) || c.label() == trimmed)
            .ok_or_else(|| UnknownCategory(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub category: StoryCategory,
    pub created_at: DateTime<Utc>,
    pub views: u64,
    /// 点赞用户 ID，不含重复
    pub likes: Vec<String>,
    /// 最新评论在前
    pub comments: Vec<Comment>,
}

impl Story {
    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }

    pub fn has_comment_from(&self, user_id: &str) -> bool {
        self.comments.iter().any(|c| c.author_id == user_id)
    }

    /// 没有封面时使用按故事 ID 生成的占位图
    pub fn cover_image_or_placeholder(&self) -> String {
        self.cover_image.clone().unwrap_or_else(|| {
            format!(
                "https://picsum.photos/seed/{}/800/400",
                urlencoding::encode(&self.id)
            )
        })
    }
}

/// 新建故事所需字段（其余字段由存储层分配）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStory {
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub cover_image: Option<String>,
    pub category: StoryCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateStoryRequest {
    #[validate(custom = "crate::utils::validation::not_blank")]
    pub title: String,

    #[validate(custom = "crate::utils::validation::not_blank")]
    pub content: String,

    #[serde(default)]
    pub category: StoryCategory,

    #[validate(custom = "crate::utils::validation::image_source")]
    pub cover_image: Option<String>,
}

/// 编辑表单：整体替换可编辑字段
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateStoryRequest {
    #[validate(custom = "crate::utils::validation::not_blank")]
    pub title: String,

    #[validate(custom = "crate::utils::validation::not_blank")]
    pub content: String,

    pub category: StoryCategory,

    #[validate(custom = "crate::utils::validation::image_source")]
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryQuery {
    pub search: Option<String>,
    /// 分类键、阿拉伯文名称或 `all`
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryView {
    #[serde(flatten)]
    pub story: Story,
    /// 作者不存在时为 None
    pub author: Option<User>,
    pub cover_image_url: String,
    pub like_count: usize,
    pub comment_count: usize,
    pub reading_time_minutes: usize,
    pub viewer_has_liked: bool,
    pub is_author: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryHighlights {
    pub trending: Vec<Story>,
    pub recent: Vec<Story>,
    pub most_viewed_ids: Vec<String>,
    pub most_liked_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeResponse {
    pub liked: bool,
    pub like_count: usize,
}
