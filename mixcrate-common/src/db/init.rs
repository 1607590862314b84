//! Database initialization and schema migrations
//!
//! The runner is explicit and versioned: every migration is an ordered list
//! of statements applied inside one transaction, recorded in
//! `schema_version`. Running it again is a no-op.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::Result;

/// Open (creating if needed) the SQLite database and apply migrations
pub async fn init_database(database_url: &str) -> Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:");
    let url = if in_memory || database_url.contains('?') {
        database_url.to_string()
    } else {
        format!("{database_url}?mode=rwc")
    };

    // An in-memory database exists per connection; a pool of them would be
    // a pool of unrelated databases
    let options = if in_memory {
        SqlitePoolOptions::new().max_connections(1)
    } else {
        SqlitePoolOptions::new()
    };
    let pool = options.connect(&url).await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

struct Migration {
    version: i64,
    description: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "base schema",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS source_accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                provider TEXT NOT NULL CHECK (provider IN ('manual', 'spotify', 'youtube')),
                name TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (provider, name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                artists TEXT NOT NULL,
                album TEXT,
                genre TEXT,
                bpm INTEGER,
                duration_ms INTEGER,
                isrc TEXT,
                year INTEGER,
                explicit INTEGER NOT NULL DEFAULT 0,
                cover_url TEXT,
                normalized_title TEXT NOT NULL,
                normalized_artists TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                CHECK (bpm IS NULL OR bpm > 0),
                CHECK (duration_ms IS NULL OR duration_ms > 0)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_tracks_normalized ON tracks(normalized_artists, normalized_title)",
            "CREATE INDEX IF NOT EXISTS idx_tracks_isrc ON tracks(isrc)",
            r#"
            CREATE TABLE IF NOT EXISTS track_identities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
                provider TEXT NOT NULL CHECK (provider IN ('manual', 'spotify', 'youtube')),
                provider_track_id TEXT NOT NULL,
                provider_url TEXT,
                fingerprint TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (provider, provider_track_id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_identities_track ON track_identities(track_id)",
            r#"
            CREATE TABLE IF NOT EXISTS playlists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_account_id INTEGER REFERENCES source_accounts(id),
                provider TEXT NOT NULL CHECK (provider IN ('manual', 'spotify', 'youtube')),
                provider_playlist_id TEXT,
                name TEXT NOT NULL,
                description TEXT,
                owner TEXT,
                snapshot TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (provider, provider_playlist_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS playlist_tracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                playlist_id INTEGER NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
                track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
                position INTEGER,
                added_at TIMESTAMP,
                UNIQUE (playlist_id, track_id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_playlist_tracks_pos ON playlist_tracks(playlist_id, position)",
            r#"
            CREATE TABLE IF NOT EXISTS search_candidates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
                provider TEXT NOT NULL CHECK (provider IN ('youtube', 'ytmusic', 'other')),
                external_id TEXT NOT NULL,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                channel TEXT,
                duration_sec INTEGER,
                score REAL NOT NULL,
                chosen INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (track_id, provider, external_id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_candidates_track_score ON search_candidates(track_id, score)",
            r#"
            CREATE TABLE IF NOT EXISTS downloads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
                candidate_id INTEGER REFERENCES search_candidates(id) ON DELETE SET NULL,
                provider TEXT NOT NULL DEFAULT 'yt_dlp',
                status TEXT NOT NULL CHECK (status IN ('queued', 'running', 'done', 'failed', 'skipped', 'already')),
                filepath TEXT,
                format TEXT,
                filesize_bytes INTEGER,
                checksum_sha256 TEXT,
                error_message TEXT,
                started_at TIMESTAMP,
                finished_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_downloads_status ON downloads(status)",
            "CREATE INDEX IF NOT EXISTS idx_downloads_created ON downloads(created_at)",
            r#"
            CREATE TABLE IF NOT EXISTS library_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
                filepath TEXT NOT NULL UNIQUE,
                file_size INTEGER,
                file_mtime TIMESTAMP,
                checksum_sha256 TEXT,
                container TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_library_track ON library_files(track_id)",
            r#"
            CREATE TABLE IF NOT EXISTS oauth_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_account_id INTEGER NOT NULL REFERENCES source_accounts(id) ON DELETE CASCADE,
                provider TEXT NOT NULL CHECK (provider IN ('manual', 'spotify', 'youtube')),
                access_token TEXT NOT NULL,
                refresh_token_encrypted TEXT,
                scope TEXT,
                token_type TEXT,
                expires_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_oauth_account ON oauth_tokens(source_account_id)",
            r#"
            CREATE TABLE IF NOT EXISTS oauth_states (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                provider TEXT NOT NULL CHECK (provider IN ('manual', 'spotify', 'youtube')),
                source_account_id INTEGER NOT NULL REFERENCES source_accounts(id) ON DELETE CASCADE,
                state TEXT NOT NULL UNIQUE,
                code_verifier TEXT NOT NULL,
                redirect_to TEXT,
                consumed INTEGER NOT NULL DEFAULT 0,
                used_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        ],
    },
    Migration {
        version: 2,
        description: "track release dates and catalog added-at",
        statements: &[
            "ALTER TABLE tracks ADD COLUMN release_date DATE",
            "ALTER TABLE tracks ADD COLUMN spotify_added_at TIMESTAMP",
        ],
    },
    Migration {
        version: 3,
        description: "searched-not-found annotation",
        statements: &["ALTER TABLE tracks ADD COLUMN searched_not_found INTEGER NOT NULL DEFAULT 0"],
    },
    Migration {
        version: 4,
        description: "persisted score breakdowns",
        statements: &["ALTER TABLE search_candidates ADD COLUMN score_breakdown TEXT"],
    },
    Migration {
        version: 5,
        description: "playlist selection flag",
        statements: &["ALTER TABLE playlists ADD COLUMN selected INTEGER NOT NULL DEFAULT 0"],
    },
];

/// Apply every migration newer than the recorded schema version
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // The version table must exist before we can ask for the current version
    sqlx::query(MIGRATIONS[0].statements[0]).execute(pool).await?;

    let current: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    let current = current.unwrap_or(0);

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_version (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(
            version = migration.version,
            description = migration.description,
            "Applied schema migration"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, MIGRATIONS.len() as i64);
    }
}
