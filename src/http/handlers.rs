use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::auth::AuthService;
use crate::app::categories::CategoryService;
use crate::app::comments::CommentService;
use crate::app::error::BlogError;
use crate::app::forms::{CategoryForm, CommentForm, PostForm, RegisterForm, VoteForm};
use crate::app::posts::PostService;
use crate::app::votes::VoteService;
use crate::domain::category::Category;
use crate::domain::post::{PostDetail, PostSummary};
use crate::domain::user::User;
use crate::domain::vote::{VoteAction, VoteValue};
use crate::http::redirect::{post_path, RedirectBody, SeeOther, POST_LIST_PATH};
use crate::http::{AdminToken, AppError, AuthUser};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PostListQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    pub category: Option<Uuid>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, Uuid)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let mut parts = cursor.splitn(2, '/');
    let timestamp = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let id = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<(OffsetDateTime, Uuid)>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.db.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterForm>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = AuthService::from_state(&state)
        .signup(payload)
        .await
        .map_err(|err| {
            if let BlogError::Store(source) = &err {
                tracing::error!(error = ?source, "failed to create user");
            }
            AppError::from(err)
        })?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub access_expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub refresh_expires_at: OffsetDateTime,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthTokenResponse>, AppError> {
    const MAX_PASSWORD_LEN: usize = 128;

    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("username and password are required"));
    }
    if payload.password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }

    let tokens = AuthService::from_state(&state)
        .login(&payload.username, &payload.password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to login");
            AppError::internal("failed to login")
        })?;

    match tokens {
        Some(tokens) => Ok(Json(AuthTokenResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_expires_at: tokens.access_expires_at,
            refresh_expires_at: tokens.refresh_expires_at,
        })),
        None => Err(AppError::unauthorized("invalid credentials")),
    }
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthTokenResponse>, AppError> {
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::bad_request("refresh_token is required"));
    }

    let tokens = AuthService::from_state(&state)
        .refresh(&payload.refresh_token)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to refresh token");
            AppError::internal("failed to refresh token")
        })?;

    match tokens {
        Some(tokens) => Ok(Json(AuthTokenResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_expires_at: tokens.access_expires_at,
            refresh_expires_at: tokens.refresh_expires_at,
        })),
        None => Err(AppError::unauthorized("invalid refresh token")),
    }
}

pub async fn revoke_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::bad_request("refresh_token is required"));
    }

    let revoked = AuthService::from_state(&state)
        .revoke_refresh_token(&payload.refresh_token)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to revoke token");
            AppError::internal("failed to revoke token")
        })?;

    tracing::debug!(revoked, "refresh token revocation");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_current_user(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    let user = AuthService::from_state(&state)
        .get_current_user(auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to fetch current user");
            AppError::internal("failed to fetch current user")
        })?;

    match user {
        Some(user) => Ok(Json(user)),
        None => Err(AppError::not_found("user not found")),
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, AppError> {
    let categories = CategoryService::new(state.db.clone())
        .list_categories()
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list categories");
            AppError::internal("failed to list categories")
        })?;

    Ok(Json(categories))
}

pub async fn create_category(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<CategoryForm>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let category = CategoryService::new(state.db.clone())
        .create_category(payload)
        .await
        .map_err(|err| {
            if let BlogError::Store(source) = &err {
                tracing::error!(error = ?source, "failed to create category");
            }
            AppError::from(err)
        })?;

    tracing::info!(category_id = %category.id, name = %category.name, "category created");
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn delete_category(
    _admin: AdminToken,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let deleted = CategoryService::new(state.db.clone())
        .delete_category(id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, category_id = %id, "failed to delete category");
            AppError::internal("failed to delete category")
        })?;

    if deleted {
        tracing::info!(category_id = %id, "category deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("category not found"))
    }
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<Json<ListResponse<PostSummary>>, AppError> {
    let limit = query.limit.unwrap_or(20);
    if !(1..=100).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 100"));
    }
    let cursor = parse_cursor(query.cursor)?;

    let posts = PostService::new(state.db.clone())
        .list_posts(query.category, cursor, limit)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list posts");
            AppError::internal("failed to list posts")
        })?;

    let next_cursor = if posts.len() as i64 == limit {
        encode_cursor(posts.last().map(|item| (item.post.created_at, item.post.id)))
    } else {
        None
    };

    Ok(Json(ListResponse {
        items: posts,
        next_cursor,
    }))
}

pub async fn create_post(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PostForm>,
) -> Result<SeeOther<RedirectBody>, AppError> {
    let post = PostService::new(state.db.clone())
        .create_post(auth.user_id, payload)
        .await
        .map_err(|err| {
            if let BlogError::Store(source) = &err {
                tracing::error!(error = ?source, author_id = %auth.user_id, "failed to create post");
            }
            AppError::from(err)
        })?;

    tracing::info!(post_id = %post.id, author_id = %auth.user_id, "post created");
    Ok(SeeOther::to(post_path(post.id), Some("Post created successfully.")).with_id(post.id))
}

pub async fn get_post(
    Path(id): Path<Uuid>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<PostDetail>, AppError> {
    let viewer_id = auth.map(|user| user.user_id);
    let detail = PostService::new(state.db.clone())
        .get_detail(id, viewer_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %id, "failed to fetch post");
            AppError::internal("failed to fetch post")
        })?;

    match detail {
        Some(detail) => Ok(Json(detail)),
        None => Err(AppError::not_found("post not found")),
    }
}

pub async fn update_post(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<PostForm>,
) -> Result<SeeOther<RedirectBody>, AppError> {
    let post = PostService::new(state.db.clone())
        .update_post(id, auth.user_id, payload)
        .await
        .map_err(|err| {
            if let BlogError::Store(source) = &err {
                tracing::error!(error = ?source, post_id = %id, "failed to update post");
            }
            AppError::from(err)
        })?;

    tracing::info!(post_id = %post.id, "post updated");
    Ok(SeeOther::to(post_path(post.id), Some("Post updated.")).with_id(post.id))
}

pub async fn delete_post(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<SeeOther<RedirectBody>, AppError> {
    PostService::new(state.db.clone())
        .delete_post(id, auth.user_id)
        .await
        .map_err(|err| {
            if let BlogError::Store(source) = &err {
                tracing::error!(error = ?source, post_id = %id, "failed to delete post");
            }
            AppError::from(err)
        })?;

    tracing::info!(post_id = %id, "post deleted");
    Ok(SeeOther::to(POST_LIST_PATH, Some("Post deleted.")))
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

pub async fn create_comment(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<CommentForm>,
) -> Result<SeeOther<RedirectBody>, AppError> {
    let comment = CommentService::new(state.db.clone())
        .create_comment(id, auth.user_id, payload)
        .await
        .map_err(|err| {
            if let BlogError::Store(source) = &err {
                tracing::error!(error = ?source, post_id = %id, "failed to create comment");
            }
            AppError::from(err)
        })?;

    tracing::info!(comment_id = %comment.id, post_id = %id, "comment added");
    Ok(SeeOther::to(post_path(id), Some("Comment added.")).with_id(comment.id))
}

pub async fn update_comment(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<CommentForm>,
) -> Result<SeeOther<RedirectBody>, AppError> {
    let comment = CommentService::new(state.db.clone())
        .update_comment(id, auth.user_id, payload)
        .await
        .map_err(|err| {
            if let BlogError::Store(source) = &err {
                tracing::error!(error = ?source, comment_id = %id, "failed to update comment");
            }
            AppError::from(err)
        })?;

    tracing::info!(comment_id = %id, "comment updated");
    Ok(SeeOther::to(post_path(comment.post_id), Some("Comment updated.")).with_id(comment.id))
}

pub async fn delete_comment(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<SeeOther<RedirectBody>, AppError> {
    let comment = CommentService::new(state.db.clone())
        .delete_comment(id, auth.user_id)
        .await
        .map_err(|err| {
            if let BlogError::Store(source) = &err {
                tracing::error!(error = ?source, comment_id = %id, "failed to delete comment");
            }
            AppError::from(err)
        })?;

    tracing::info!(comment_id = %id, post_id = %comment.post_id, "comment deleted");
    Ok(SeeOther::to(post_path(comment.post_id), Some("Comment deleted.")))
}

// ---------------------------------------------------------------------------
// Votes
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct VoteResponse {
    pub redirect_to: String,
    /// Absent when the value was not +1/-1 and nothing changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<VoteAction>,
    pub vote: Option<VoteValue>,
    pub score: i64,
}

pub async fn cast_vote(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<VoteForm>,
) -> Result<SeeOther<VoteResponse>, AppError> {
    let service = VoteService::new(state.db.clone());
    let outcome = service
        .cast_vote(id, auth.user_id, payload.vote_value())
        .await
        .map_err(|err| {
            if let BlogError::Store(source) = &err {
                tracing::error!(error = ?source, post_id = %id, user_id = %auth.user_id, "failed to cast vote");
            }
            AppError::from(err)
        })?;

    let vote = match outcome {
        Some(outcome) => {
            tracing::info!(post_id = %id, user_id = %auth.user_id, action = ?outcome.action, "vote cast");
            outcome.vote
        }
        None => service.user_vote(id, auth.user_id).await.map_err(|err| {
            tracing::error!(error = ?err, post_id = %id, "failed to read vote");
            AppError::internal("failed to read vote")
        })?,
    };

    let score = service.score(id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %id, "failed to compute score");
        AppError::internal("failed to compute score")
    })?;

    let location = post_path(id);
    Ok(SeeOther::with_body(
        location.clone(),
        VoteResponse {
            redirect_to: location,
            action: outcome.map(|outcome| outcome.action),
            vote,
            score,
        },
    ))
}
