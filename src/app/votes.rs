use anyhow::{anyhow, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::app::error::{violation, BlogError, BlogResult, Violation};
use crate::domain::vote::{VoteAction, VoteValue};
use crate::infra::db::Db;

/// A lost insert race is retried once against the row that won it.
const MAX_VOTE_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub action: VoteAction,
    /// The user's vote on the post after the toggle.
    pub vote: Option<VoteValue>,
}

#[derive(Clone)]
pub struct VoteService {
    db: Db,
}

impl VoteService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Toggles `user_id`'s vote on `post_id`: create, flip or retract.
    ///
    /// `requested` of `None` (the request held no +1/-1) changes nothing and
    /// returns `Ok(None)`. An unknown post is `NotFound` either way.
    pub async fn cast_vote(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        requested: Option<VoteValue>,
    ) -> BlogResult<Option<VoteOutcome>> {
        let mut tx = self.db.pool().begin().await?;

        // Holds off a concurrent post delete until the vote commits.
        let post: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM posts WHERE id = $1 FOR KEY SHARE")
                .bind(post_id)
                .fetch_optional(&mut *tx)
                .await?;
        if post.is_none() {
            return Err(BlogError::NotFound("post"));
        }

        let Some(requested) = requested else {
            tracing::debug!(post_id = %post_id, user_id = %user_id, "ignoring invalid vote value");
            return Ok(None);
        };

        for _ in 0..MAX_VOTE_ATTEMPTS {
            let existing: Option<i16> = sqlx::query_scalar(
                "SELECT value FROM votes WHERE post_id = $1 AND user_id = $2 FOR UPDATE",
            )
            .bind(post_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
            let existing = existing
                .map(|value| {
                    VoteValue::from_db(value)
                        .ok_or_else(|| anyhow!("unknown vote value in store: {}", value))
                })
                .transpose()?;

            let action = VoteAction::decide(existing, requested);
            let applied = match action {
                VoteAction::Create => {
                    let result = sqlx::query(
                        "INSERT INTO votes (post_id, user_id, value) VALUES ($1, $2, $3) \
                         ON CONFLICT (post_id, user_id) DO NOTHING",
                    )
                    .bind(post_id)
                    .bind(user_id)
                    .bind(requested.as_db())
                    .execute(&mut *tx)
                    .await
                    .map_err(|err| match violation(&err) {
                        Some(Violation::ForeignKey(constraint)) if constraint.contains("post") => {
                            BlogError::NotFound("post")
                        }
                        Some(Violation::ForeignKey(_)) => BlogError::NotFound("user"),
                        _ => err.into(),
                    })?;
                    result.rows_affected() == 1
                }
                VoteAction::Flip => {
                    sqlx::query("UPDATE votes SET value = $3 WHERE post_id = $1 AND user_id = $2")
                        .bind(post_id)
                        .bind(user_id)
                        .bind(requested.as_db())
                        .execute(&mut *tx)
                        .await?;
                    true
                }
                VoteAction::Retract => {
                    sqlx::query("DELETE FROM votes WHERE post_id = $1 AND user_id = $2")
                        .bind(post_id)
                        .bind(user_id)
                        .execute(&mut *tx)
                        .await?;
                    true
                }
            };

            if applied {
                tx.commit().await?;
                return Ok(Some(VoteOutcome {
                    action,
                    vote: action.resulting(requested),
                }));
            }
        }

        Err(anyhow!(
            "vote by {} on post {} kept losing insert races",
            user_id,
            post_id
        )
        .into())
    }

    /// Sum of vote values, 0 when the post has none.
    pub async fn score(&self, post_id: Uuid) -> Result<i64> {
        let score: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(value), 0)::BIGINT FROM votes WHERE post_id = $1",
        )
        .bind(post_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(score)
    }

    pub async fn user_vote(&self, post_id: Uuid, user_id: Uuid) -> Result<Option<VoteValue>> {
        let value: Option<i16> =
            sqlx::query_scalar("SELECT value FROM votes WHERE post_id = $1 AND user_id = $2")
                .bind(post_id)
                .bind(user_id)
                .fetch_optional(self.db.pool())
                .await?;

        value
            .map(|value| {
                VoteValue::from_db(value).ok_or_else(|| anyhow!("unknown vote value in store: {}", value))
            })
            .transpose()
    }
}
