use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::story::StoryCategory;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerateStoryRequest {
    #[validate(custom = "crate::utils::validation::not_blank", length(max = 2000))]
    pub prompt: String,
}

/// AI 生成的故事草稿，尚未保存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedStory {
    pub title: String,
    pub content: String,
    pub category: StoryCategory,
}
