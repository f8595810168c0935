use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, Local, version4::V4};
use sha2::{Digest, Sha256};
use sqlx::Row;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app::error::{violation, BlogError, BlogResult, Violation};
use crate::app::forms::RegisterForm;
use crate::domain::user::User;
use crate::infra::db::Db;
use crate::AppState;

const TOKEN_ISSUER: &str = "musiccorner";

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: OffsetDateTime,
    pub refresh_expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AuthService {
    db: Db,
    access_key: [u8; 32],
    refresh_key: [u8; 32],
    access_ttl_minutes: u64,
    refresh_ttl_days: u64,
}

impl AuthService {
    pub fn new(
        db: Db,
        access_key: [u8; 32],
        refresh_key: [u8; 32],
        access_ttl_minutes: u64,
        refresh_ttl_days: u64,
    ) -> Self {
        Self {
            db,
            access_key,
            refresh_key,
            access_ttl_minutes,
            refresh_ttl_days,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.db.clone(),
            state.paseto_access_key,
            state.paseto_refresh_key,
            state.access_ttl_minutes,
            state.refresh_ttl_days,
        )
    }

    pub async fn signup(&self, form: RegisterForm) -> BlogResult<User> {
        let form = form.clean()?;
        let password_hash = hash_password(&form.password)?;

        let row = sqlx::query(
            "INSERT INTO users (username, password_hash) \
             VALUES ($1, $2) \
             RETURNING id, username, created_at",
        )
        .bind(&form.username)
        .bind(password_hash)
        .fetch_one(self.db.pool())
        .await
        .map_err(|err| match violation(&err) {
            Some(Violation::Unique(_)) => {
                BlogError::Conflict("A user with that username already exists.".into())
            }
            _ => err.into(),
        })?;

        Ok(User {
            id: row.get("id"),
            username: row.get("username"),
            created_at: row.get("created_at"),
        })
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Option<TokenPair>> {
        let row = sqlx::query("SELECT id, password_hash FROM users WHERE username = $1")
            .bind(username.trim())
            .fetch_optional(self.db.pool())
            .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let user_id: Uuid = row.get("id");
        let password_hash: String = row.get("password_hash");
        if password_hash.is_empty() {
            return Ok(None);
        }

        if !verify_password(password, &password_hash)? {
            return Ok(None);
        }

        let tokens = self.issue_token_pair(user_id).await?;
        Ok(Some(tokens))
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<Option<TokenPair>> {
        let Some((user_id, refresh_id)) = self.open_refresh_token(refresh_token)? else {
            return Ok(None);
        };
        let mut tx = self.db.pool().begin().await?;

        // Consuming the old token first means a replayed token loses the race.
        let consumed: Option<Uuid> = sqlx::query_scalar(
            "UPDATE refresh_tokens \
             SET revoked_at = now() \
             WHERE id = $1 \
               AND user_id = $2 \
               AND token_hash = $3 \
               AND revoked_at IS NULL \
               AND expires_at > now() \
             RETURNING id",
        )
        .bind(refresh_id)
        .bind(user_id)
        .bind(hash_token(refresh_token))
        .fetch_optional(&mut *tx)
        .await?;

        if consumed.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let tokens = self.issue_token_pair_with_tx(user_id, &mut tx).await?;
        sqlx::query("UPDATE refresh_tokens SET replaced_by = $1 WHERE id = $2")
            .bind(tokens.refresh_id)
            .bind(refresh_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(tokens.pair))
    }

    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<bool> {
        let Some((user_id, refresh_id)) = self.open_refresh_token(refresh_token)? else {
            return Ok(false);
        };
        let token_hash = hash_token(refresh_token);

        let result = sqlx::query(
            "UPDATE refresh_tokens \
             SET revoked_at = now() \
             WHERE id = $1 AND user_id = $2 AND token_hash = $3 AND revoked_at IS NULL",
        )
        .bind(refresh_id)
        .bind(user_id)
        .bind(token_hash)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn authenticate_access_token(&self, token: &str) -> Result<Option<AuthSession>> {
        let Some(claims) = self.open(TokenKind::Access, token)? else {
            return Ok(None);
        };
        Ok(Some(AuthSession {
            user_id: claim_uuid(&claims, "sub")?,
        }))
    }

    pub async fn get_current_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, username, created_at FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;

        let user = row.map(|row| User {
            id: row.get("id"),
            username: row.get("username"),
            created_at: row.get("created_at"),
        });

        Ok(user)
    }

    fn key_for(&self, kind: TokenKind) -> Result<SymmetricKey<V4>> {
        let bytes = match kind {
            TokenKind::Access => &self.access_key,
            TokenKind::Refresh => &self.refresh_key,
        };
        Ok(SymmetricKey::<V4>::from(bytes)?)
    }

    fn lifetime(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => Duration::minutes(self.access_ttl_minutes as i64),
            TokenKind::Refresh => Duration::days(self.refresh_ttl_days as i64),
        }
    }

    /// Encrypts a token of `kind` for `user_id`. Refresh tokens carry `jti`.
    fn seal(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        jti: Option<Uuid>,
    ) -> Result<(String, OffsetDateTime)> {
        let lifetime = self.lifetime(kind);
        let mut claims = Claims::new_expires_in(&std::time::Duration::try_from(lifetime)?)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_ISSUER)?;
        claims.subject(&user_id.to_string())?;
        if let Some(jti) = jti {
            claims.token_identifier(&jti.to_string())?;
        }
        claims.add_additional(TYPE_CLAIM, kind.as_str())?;

        let token = local::encrypt(&self.key_for(kind)?, &claims, None, None)?;
        Ok((token, OffsetDateTime::now_utc() + lifetime))
    }

    /// Claims of a valid, unexpired token of `kind`; `None` for anything else.
    fn open(&self, kind: TokenKind, token: &str) -> Result<Option<Claims>> {
        let key = self.key_for(kind)?;
        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(TOKEN_ISSUER);
        rules.validate_audience_with(TOKEN_ISSUER);

        let Ok(untrusted) = UntrustedToken::<Local, V4>::try_from(token) else {
            return Ok(None);
        };
        let Ok(trusted) = local::decrypt(&key, &untrusted, &rules, None, None) else {
            return Ok(None);
        };

        Ok(trusted
            .payload_claims()
            .filter(|claims| kind.matches(claims))
            .cloned())
    }

    pub async fn issue_token_pair(&self, user_id: Uuid) -> Result<TokenPair> {
        let mut tx = self.db.pool().begin().await?;
        let tokens = self.issue_token_pair_with_tx(user_id, &mut tx).await?;
        tx.commit().await?;
        Ok(tokens.pair)
    }

    async fn issue_token_pair_with_tx(
        &self,
        user_id: Uuid,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<IssuedTokens> {
        let (access_token, access_expires_at) = self.seal(TokenKind::Access, user_id, None)?;

        let refresh_id = Uuid::new_v4();
        let (refresh_token, refresh_expires_at) =
            self.seal(TokenKind::Refresh, user_id, Some(refresh_id))?;

        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(refresh_id)
        .bind(user_id)
        .bind(hash_token(&refresh_token))
        .bind(refresh_expires_at)
        .execute(&mut **tx)
        .await?;

        Ok(IssuedTokens {
            refresh_id,
            pair: TokenPair {
                access_token,
                refresh_token,
                access_expires_at,
                refresh_expires_at,
            },
        })
    }

    /// `(user_id, refresh_id)` of a well-formed refresh token.
    fn open_refresh_token(&self, token: &str) -> Result<Option<(Uuid, Uuid)>> {
        let Some(claims) = self.open(TokenKind::Refresh, token)? else {
            return Ok(None);
        };
        Ok(Some((claim_uuid(&claims, "sub")?, claim_uuid(&claims, "jti")?)))
    }
}

const TYPE_CLAIM: &str = "typ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }

    fn matches(self, claims: &Claims) -> bool {
        claims
            .get_claim(TYPE_CLAIM)
            .and_then(|value| value.as_str())
            .is_some_and(|value| value == self.as_str())
    }
}

struct IssuedTokens {
    refresh_id: Uuid,
    pair: TokenPair,
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {}", err))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| anyhow!("stored password hash is unreadable: {}", err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Refresh tokens are stored as hex SHA-256 digests, never in the clear.
fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn claim_uuid(claims: &Claims, name: &str) -> Result<Uuid> {
    let value = claims
        .get_claim(name)
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow!("token has no {} claim", name))?;
    Ok(Uuid::parse_str(value)?)
}
