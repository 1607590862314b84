//! Source account and OAuth credential queries
//!
//! Refresh tokens only enter this module already encrypted; plaintext never
//! reaches a query bind.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::{OAuthState, OAuthToken, SourceAccount, SourceProvider};
use crate::{Error, Result};

const ACCOUNT_COLUMNS: &str = "id, provider, name, enabled, created_at, updated_at";
const TOKEN_COLUMNS: &str = "id, source_account_id, provider, access_token, \
     refresh_token_encrypted, scope, token_type, expires_at, created_at, updated_at";
const STATE_COLUMNS: &str =
    "id, provider, source_account_id, state, code_verifier, redirect_to, consumed, used_at, created_at";

pub async fn get_account(pool: &SqlitePool, id: i64) -> Result<SourceAccount> {
    sqlx::query_as::<_, SourceAccount>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM source_accounts WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("SourceAccount {id}")))
}

pub async fn list_accounts(pool: &SqlitePool) -> Result<Vec<SourceAccount>> {
    Ok(sqlx::query_as::<_, SourceAccount>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM source_accounts ORDER BY id"
    ))
    .fetch_all(pool)
    .await?)
}

/// Find or create the `(provider, name)` account
pub async fn ensure_account(
    pool: &SqlitePool,
    provider: SourceProvider,
    name: &str,
) -> Result<SourceAccount> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO source_accounts (provider, name, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (provider, name) DO UPDATE SET updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(provider)
    .bind(name)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    get_account(pool, id).await
}

pub async fn get_token(
    pool: &SqlitePool,
    source_account_id: i64,
    provider: SourceProvider,
) -> Result<Option<OAuthToken>> {
    Ok(sqlx::query_as::<_, OAuthToken>(&format!(
        "SELECT {TOKEN_COLUMNS} FROM oauth_tokens WHERE source_account_id = ? AND provider = ?"
    ))
    .bind(source_account_id)
    .bind(provider)
    .fetch_optional(pool)
    .await?)
}

pub async fn list_tokens(pool: &SqlitePool) -> Result<Vec<OAuthToken>> {
    Ok(sqlx::query_as::<_, OAuthToken>(&format!(
        "SELECT {TOKEN_COLUMNS} FROM oauth_tokens ORDER BY id"
    ))
    .fetch_all(pool)
    .await?)
}

/// Insert or refresh the account's token. `refresh_token_encrypted` is kept
/// when the provider omits a new refresh token.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_token(
    pool: &SqlitePool,
    source_account_id: i64,
    provider: SourceProvider,
    access_token: &str,
    refresh_token_encrypted: Option<&str>,
    scope: Option<&str>,
    token_type: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<OAuthToken> {
    let now = Utc::now();
    let existing = get_token(pool, source_account_id, provider).await?;
    match existing {
        Some(token) => {
            sqlx::query(
                r#"
                UPDATE oauth_tokens
                SET access_token = ?,
                    refresh_token_encrypted = COALESCE(?, refresh_token_encrypted),
                    scope = COALESCE(?, scope),
                    token_type = COALESCE(?, token_type),
                    expires_at = ?,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(access_token)
            .bind(refresh_token_encrypted)
            .bind(scope)
            .bind(token_type)
            .bind(expires_at)
            .bind(now)
            .bind(token.id)
            .execute(pool)
            .await?;
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO oauth_tokens
                    (source_account_id, provider, access_token, refresh_token_encrypted,
                     scope, token_type, expires_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(source_account_id)
            .bind(provider)
            .bind(access_token)
            .bind(refresh_token_encrypted)
            .bind(scope)
            .bind(token_type)
            .bind(expires_at)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;
        }
    }
    get_token(pool, source_account_id, provider)
        .await?
        .ok_or_else(|| Error::Internal("Token upsert produced no row".into()))
}

pub async fn create_state(
    pool: &SqlitePool,
    provider: SourceProvider,
    source_account_id: i64,
    state: &str,
    code_verifier: &str,
    redirect_to: Option<&str>,
) -> Result<OAuthState> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO oauth_states (provider, source_account_id, state, code_verifier, redirect_to, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(provider)
    .bind(source_account_id)
    .bind(state)
    .bind(code_verifier)
    .bind(redirect_to)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    sqlx::query_as::<_, OAuthState>(&format!("SELECT {STATE_COLUMNS} FROM oauth_states WHERE id = ?"))
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
}

pub async fn find_state(pool: &SqlitePool, state: &str) -> Result<Option<OAuthState>> {
    Ok(sqlx::query_as::<_, OAuthState>(&format!(
        "SELECT {STATE_COLUMNS} FROM oauth_states WHERE state = ?"
    ))
    .bind(state)
    .fetch_optional(pool)
    .await?)
}

pub async fn consume_state(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE oauth_states SET consumed = 1, used_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
