use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::app::authz::{ensure_can_modify, Modification};
use crate::app::error::{violation, BlogError, BlogResult, Violation};
use crate::app::forms::CommentForm;
use crate::domain::comment::Comment;
use crate::domain::user::Author;
use crate::infra::db::Db;

#[derive(Clone)]
pub struct CommentService {
    db: Db,
}

impl CommentService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_comment(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        form: CommentForm,
    ) -> BlogResult<Comment> {
        let post_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
                .bind(post_id)
                .fetch_one(self.db.pool())
                .await?;
        if !post_exists {
            return Err(BlogError::NotFound("post"));
        }
        let form = form.clean()?;

        let row = sqlx::query(
            "WITH inserted_comment AS ( \
                INSERT INTO comments (post_id, author_id, content) \
                VALUES ($1, $2, $3) \
                RETURNING id, post_id, author_id, content, created_at \
             ) \
             SELECT cm.*, u.username AS author_username \
             FROM inserted_comment cm \
             JOIN users u ON u.id = cm.author_id",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(&form.content)
        .fetch_one(self.db.pool())
        .await
        .map_err(|err| match violation(&err) {
            Some(Violation::ForeignKey(constraint)) if constraint.contains("post") => {
                BlogError::NotFound("post")
            }
            Some(Violation::ForeignKey(_)) => BlogError::NotFound("user"),
            _ => err.into(),
        })?;

        Ok(comment_from_row(&row))
    }

    pub async fn get_comment(&self, comment_id: Uuid) -> Result<Option<Comment>> {
        let row = sqlx::query(
            "SELECT cm.id, cm.post_id, cm.author_id, u.username AS author_username, \
                    cm.content, cm.created_at \
             FROM comments cm \
             JOIN users u ON u.id = cm.author_id \
             WHERE cm.id = $1",
        )
        .bind(comment_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(comment_from_row))
    }

    /// Oldest first.
    pub async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            "SELECT cm.id, cm.post_id, cm.author_id, u.username AS author_username, \
                    cm.content, cm.created_at \
             FROM comments cm \
             JOIN users u ON u.id = cm.author_id \
             WHERE cm.post_id = $1 \
             ORDER BY cm.created_at ASC, cm.id ASC",
        )
        .bind(post_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(comment_from_row).collect())
    }

    pub async fn update_comment(
        &self,
        comment_id: Uuid,
        acting_user: Uuid,
        form: CommentForm,
    ) -> BlogResult<Comment> {
        let comment = self
            .get_comment(comment_id)
            .await?
            .ok_or(BlogError::NotFound("comment"))?;
        ensure_can_modify(&comment, acting_user, Modification::Edit)?;
        let form = form.clean()?;

        let updated = sqlx::query(
            "UPDATE comments SET content = $3 WHERE id = $1 AND author_id = $2",
        )
        .bind(comment_id)
        .bind(acting_user)
        .bind(&form.content)
        .execute(self.db.pool())
        .await?;

        if updated.rows_affected() == 0 {
            return Err(BlogError::NotFound("comment"));
        }

        Ok(Comment {
            content: form.content,
            ..comment
        })
    }

    /// Returns the removed comment so the caller knows which post to go back to.
    pub async fn delete_comment(&self, comment_id: Uuid, acting_user: Uuid) -> BlogResult<Comment> {
        let comment = self
            .get_comment(comment_id)
            .await?
            .ok_or(BlogError::NotFound("comment"))?;
        ensure_can_modify(&comment, acting_user, Modification::Delete)?;

        let result = sqlx::query("DELETE FROM comments WHERE id = $1 AND author_id = $2")
            .bind(comment_id)
            .bind(acting_user)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(BlogError::NotFound("comment"));
        }
        Ok(comment)
    }
}

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author: Author {
            id: row.get("author_id"),
            username: row.get("author_username"),
        },
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}
