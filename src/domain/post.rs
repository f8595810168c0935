use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::category::Category;
use crate::domain::comment::Comment;
use crate::domain::user::Author;
use crate::domain::vote::VoteValue;

pub const POST_TITLE_MAX_LEN: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    /// `None` once the category has been deleted.
    pub category: Option<Category>,
    pub author: Author,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Row of the post list. Score is computed per request.
#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: Post,
    pub score: i64,
    pub comment_count: i64,
}

/// Everything the post detail page shows.
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<Comment>,
    pub score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer_vote: Option<VoteValue>,
}
