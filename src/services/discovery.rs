use crate::models::{
    story::{Story, StoryCategory, StoryHighlights},
    user::{User, UserProfile},
};
use std::collections::HashMap;

pub const TRENDING_LIMIT: usize = 4;
pub const RECENT_LIMIT: usize = 4;
pub const BADGE_LIMIT: usize = 3;

const LIKE_WEIGHT: u64 = 5;
const WORDS_PER_MINUTE: usize = 200;

/// 按关键词和分类筛选，保持原有顺序
///
/// 关键词不区分大小写，匹配标题、正文或作者名。
pub fn filter_stories(
    stories: &[Story],
    users: &[User],
    search: Option<&str>,
    category: Option<StoryCategory>,
) -> Vec<Story> {
    let names: HashMap<&str, String> = users
        .iter()
        .map(|u| (u.id.as_str(), u.name.to_lowercase()))
        .collect();
    let needle = search.map(str::trim).unwrap_or("").to_lowercase();

    stories
        .iter()
        .filter(|story| category.map_or(true, |c| story.category == c))
        .filter(|story| {
            needle.is_empty()
                || story.title.to_lowercase().contains(&needle)
                || story.content.to_lowercase().contains(&needle)
                || names
                    .get(story.author_id.as_str())
                    .map_or(false, |name| name.contains(&needle))
        })
        .cloned()
        .collect()
}

pub fn trending_score(story: &Story) -> u64 {
    story.views + story.likes.len() as u64 * LIKE_WEIGHT
}

pub fn trending(stories: &[Story], limit: usize) -> Vec<Story> {
    let mut sorted = stories.to_vec();
    sorted.sort_by(|a, b| trending_score(b).cmp(&trending_score(a)));
    sorted.truncate(limit);
    sorted
}

pub fn recent(stories: &[Story], limit: usize) -> Vec<Story> {
    let mut sorted = stories.to_vec();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted.truncate(limit);
    sorted
}

pub fn most_viewed_ids(stories: &[Story], limit: usize) -> Vec<String> {
    let mut sorted: Vec<&Story> = stories.iter().collect();
    sorted.sort_by(|a, b| b.views.cmp(&a.views));
    sorted.into_iter().take(limit).map(|s| s.id.clone()).collect()
}

pub fn most_liked_ids(stories: &[Story], limit: usize) -> Vec<String> {
    let mut sorted: Vec<&Story> = stories.iter().collect();
    sorted.sort_by(|a, b| b.likes.len().cmp(&a.likes.len()));
    sorted.into_iter().take(limit).map(|s| s.id.clone()).collect()
}

pub fn highlights(stories: &[Story]) -> StoryHighlights {
    StoryHighlights {
        trending: trending(stories, TRENDING_LIMIT),
        recent: recent(stories, RECENT_LIMIT),
        most_viewed_ids: most_viewed_ids(stories, BADGE_LIMIT),
        most_liked_ids: most_liked_ids(stories, BADGE_LIMIT),
    }
}

pub fn profile(user: User, stories: &[Story], viewer_id: Option<&str>) -> UserProfile {
    let id = user.id.as_str();
    let written = stories.iter().filter(|s| s.author_id == id).cloned().collect();
    let liked = stories.iter().filter(|s| s.is_liked_by(id)).cloned().collect();
    let commented = stories
        .iter()
        .filter(|s| s.has_comment_from(id))
        .cloned()
        .collect();

    UserProfile {
        is_own_profile: viewer_id == Some(id),
        user,
        written,
        liked,
        commented,
    }
}

/// 阅读时长（分钟），按空格分词、每分钟 200 词向上取整
pub fn reading_time(content: &str) -> usize {
    let words = content.split(' ').count();
    (words + WORDS_PER_MINUTE - 1) / WORDS_PER_MINUTE
}
