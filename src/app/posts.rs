use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::authz::{ensure_can_modify, Modification};
use crate::app::comments::CommentService;
use crate::app::error::{violation, BlogError, BlogResult, FieldErrors, Violation};
use crate::app::forms::PostForm;
use crate::app::votes::VoteService;
use crate::domain::category::Category;
use crate::domain::post::{Post, PostDetail, PostSummary};
use crate::domain::user::Author;
use crate::infra::db::Db;

const INVALID_CATEGORY: &str =
    "Select a valid choice. That choice is not one of the available choices.";

#[derive(Clone)]
pub struct PostService {
    db: Db,
}

impl PostService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_post(&self, author_id: Uuid, form: PostForm) -> BlogResult<Post> {
        let form = form.clean()?;

        let row = sqlx::query(
            "WITH inserted_post AS ( \
                INSERT INTO posts (title, content, category_id, author_id) \
                VALUES ($1, $2, $3, $4) \
                RETURNING id, title, content, category_id, author_id, created_at, updated_at \
             ) \
             SELECT p.*, u.username AS author_username, c.name AS category_name \
             FROM inserted_post p \
             JOIN users u ON u.id = p.author_id \
             LEFT JOIN categories c ON c.id = p.category_id",
        )
        .bind(&form.title)
        .bind(&form.content)
        .bind(form.category)
        .bind(author_id)
        .fetch_one(self.db.pool())
        .await
        .map_err(map_write_error)?;

        Ok(post_from_row(&row))
    }

    pub async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query(
            "SELECT p.id, p.title, p.content, p.category_id, c.name AS category_name, \
                    p.author_id, u.username AS author_username, p.created_at, p.updated_at \
             FROM posts p \
             JOIN users u ON u.id = p.author_id \
             LEFT JOIN categories c ON c.id = p.category_id \
             WHERE p.id = $1",
        )
        .bind(post_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(post_from_row))
    }

    /// Post page data. `viewer_id` only adds the viewer's own vote.
    pub async fn get_detail(
        &self,
        post_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> Result<Option<PostDetail>> {
        let Some(post) = self.get_post(post_id).await? else {
            return Ok(None);
        };

        let comments = CommentService::new(self.db.clone())
            .list_for_post(post_id)
            .await?;
        let votes = VoteService::new(self.db.clone());
        let score = votes.score(post_id).await?;
        let viewer_vote = match viewer_id {
            Some(user_id) => votes.user_vote(post_id, user_id).await?,
            None => None,
        };

        Ok(Some(PostDetail {
            post,
            comments,
            score,
            viewer_vote,
        }))
    }

    pub async fn update_post(
        &self,
        post_id: Uuid,
        acting_user: Uuid,
        form: PostForm,
    ) -> BlogResult<Post> {
        let post = self
            .get_post(post_id)
            .await?
            .ok_or(BlogError::NotFound("post"))?;
        ensure_can_modify(&post, acting_user, Modification::Edit)?;
        let form = form.clean()?;

        let row = sqlx::query(
            "WITH updated_post AS ( \
                UPDATE posts \
                SET title = $3, content = $4, category_id = $5, updated_at = now() \
                WHERE id = $1 AND author_id = $2 \
                RETURNING id, title, content, category_id, author_id, created_at, updated_at \
             ) \
             SELECT p.*, u.username AS author_username, c.name AS category_name \
             FROM updated_post p \
             JOIN users u ON u.id = p.author_id \
             LEFT JOIN categories c ON c.id = p.category_id",
        )
        .bind(post_id)
        .bind(acting_user)
        .bind(&form.title)
        .bind(&form.content)
        .bind(form.category)
        .fetch_optional(self.db.pool())
        .await
        .map_err(map_write_error)?;

        // Gone between the ownership check and the write.
        let row = row.ok_or(BlogError::NotFound("post"))?;
        Ok(post_from_row(&row))
    }

    /// Comments and votes go with the post (`ON DELETE CASCADE`).
    pub async fn delete_post(&self, post_id: Uuid, acting_user: Uuid) -> BlogResult<()> {
        let post = self
            .get_post(post_id)
            .await?
            .ok_or(BlogError::NotFound("post"))?;
        ensure_can_modify(&post, acting_user, Modification::Delete)?;

        let result = sqlx::query("DELETE FROM posts WHERE id = $1 AND author_id = $2")
            .bind(post_id)
            .bind(acting_user)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(BlogError::NotFound("post"));
        }
        Ok(())
    }

    /// Newest first, optionally restricted to one category.
    pub async fn list_posts(
        &self,
        category_id: Option<Uuid>,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<PostSummary>> {
        let rows = match cursor {
            Some((created_at, post_id)) => {
                sqlx::query(
                    "SELECT p.id, p.title, p.content, p.category_id, c.name AS category_name, \
                            p.author_id, u.username AS author_username, p.created_at, p.updated_at, \
                            (SELECT COALESCE(SUM(v.value), 0) FROM votes v WHERE v.post_id = p.id)::BIGINT AS score, \
                            (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count \
                     FROM posts p \
                     JOIN users u ON u.id = p.author_id \
                     LEFT JOIN categories c ON c.id = p.category_id \
                     WHERE ($1::uuid IS NULL OR p.category_id = $1) \
                       AND (p.created_at < $2 OR (p.created_at = $2 AND p.id < $3)) \
                     ORDER BY p.created_at DESC, p.id DESC \
                     LIMIT $4",
                )
                .bind(category_id)
                .bind(created_at)
                .bind(post_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT p.id, p.title, p.content, p.category_id, c.name AS category_name, \
                            p.author_id, u.username AS author_username, p.created_at, p.updated_at, \
                            (SELECT COALESCE(SUM(v.value), 0) FROM votes v WHERE v.post_id = p.id)::BIGINT AS score, \
                            (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count \
                     FROM posts p \
                     JOIN users u ON u.id = p.author_id \
                     LEFT JOIN categories c ON c.id = p.category_id \
                     WHERE ($1::uuid IS NULL OR p.category_id = $1) \
                     ORDER BY p.created_at DESC, p.id DESC \
                     LIMIT $2",
                )
                .bind(category_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            posts.push(PostSummary {
                post: post_from_row(&row),
                score: row.get("score"),
                comment_count: row.get("comment_count"),
            });
        }

        Ok(posts)
    }
}

fn post_from_row(row: &PgRow) -> Post {
    let category_id: Option<Uuid> = row.get("category_id");
    let category_name: Option<String> = row.get("category_name");
    let category = category_id
        .zip(category_name)
        .map(|(id, name)| Category { id, name });

    Post {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        category,
        author: Author {
            id: row.get("author_id"),
            username: row.get("author_username"),
        },
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn map_write_error(err: sqlx::Error) -> BlogError {
    match violation(&err) {
        Some(Violation::ForeignKey(constraint)) if constraint.contains("category") => {
            BlogError::Validation(FieldErrors::single("category", INVALID_CATEGORY))
        }
        Some(Violation::ForeignKey(_)) => BlogError::NotFound("user"),
        _ => err.into(),
    }
}
