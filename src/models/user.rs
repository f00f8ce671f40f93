use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::story::Story;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// 头像：base64 data URL 或图片地址
    pub avatar: String,
}

impl User {
    /// 由名字生成的确定性占位头像
    pub fn placeholder_avatar(name: &str) -> String {
        format!(
            "https://picsum.photos/seed/{}/100/100",
            urlencoding::encode(name)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(custom = "crate::utils::validation::not_blank", length(max = 50))]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateAvatarRequest {
    #[validate(custom = "crate::utils::validation::image_source")]
    pub avatar: String,
}

/// 个人主页：作者的作品、点赞过的故事、评论过的故事
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user: User,
    pub is_own_profile: bool,
    pub written: Vec<Story>,
    pub liked: Vec<Story>,
    pub commented: Vec<Story>,
}
