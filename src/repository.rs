use crate::{
    error::{AppError, AppResult, ConflictKind},
    models::{AdminDashboardStats, Comment, NewUser, Post, PostRequest, Role, User},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc, time::Duration};
use uuid::Uuid;

/// Repository Trait
///
/// The store contract. Every uniqueness rule (username, email, external identity,
/// like pair) is enforced by the storage layer and surfaces as
/// `AppError::Conflict`, so concurrent writers never rely on read-then-write checks.
/// Deleting a user or a post cascades to the rows that reference it.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Accounts ---
    async fn create_user(&self, user: NewUser) -> AppResult<User>;
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;
    /// Case-insensitive.
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>>;
    async fn find_user_by_identity(&self, provider: &str, subject: &str) -> AppResult<Option<User>>;
    /// Attaches an external identity to an account that has none.
    /// `Conflict(AlreadyLinked)` when the account got linked in the meantime.
    async fn link_identity(&self, user_id: Uuid, provider: &str, subject: &str) -> AppResult<User>;
    async fn set_user_role(&self, id: Uuid, role: Role) -> AppResult<Option<User>>;
    async fn delete_user(&self, id: Uuid) -> AppResult<bool>;
    async fn list_users(&self) -> AppResult<Vec<User>>;

    // --- Posts ---
    async fn create_post(&self, author_id: Uuid, req: PostRequest) -> AppResult<Post>;
    async fn get_post(&self, id: Uuid) -> AppResult<Option<Post>>;
    /// Newest first.
    async fn list_posts(&self) -> AppResult<Vec<Post>>;
    async fn update_post(&self, id: Uuid, req: PostRequest) -> AppResult<Option<Post>>;
    async fn delete_post(&self, id: Uuid) -> AppResult<bool>;

    // --- Comments ---
    async fn add_comment(&self, post_id: Uuid, author_id: Uuid, body: String) -> AppResult<Comment>;
    async fn get_comment(&self, id: i64) -> AppResult<Option<Comment>>;
    /// Oldest first.
    async fn list_comments(&self, post_id: Uuid) -> AppResult<Vec<Comment>>;
    async fn update_comment(&self, id: i64, body: String) -> AppResult<Option<Comment>>;
    async fn delete_comment(&self, id: i64) -> AppResult<bool>;

    // --- Likes ---
    /// Removes the like if present, otherwise adds it. Returns the new state.
    async fn toggle_like(&self, user_id: Uuid, post_id: Uuid) -> AppResult<bool>;
    async fn has_liked(&self, user_id: Uuid, post_id: Uuid) -> AppResult<bool>;
    async fn count_likes(&self, post_id: Uuid) -> AppResult<i64>;

    async fn get_stats(&self) -> AppResult<AdminDashboardStats>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Maps a failed write onto the error taxonomy: unique violations become
/// conflicts, dangling references become not-found.
fn write_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return AppError::Conflict(ConflictKind::from_constraint_message(db.message()));
        }
        if db.is_foreign_key_violation() {
            return AppError::NotFound("Referenced record");
        }
    }
    AppError::Database(err)
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, oauth_provider, oauth_subject, role, created_at";

const POST_SELECT: &str = r#"
    SELECT p.id, p.author_id, p.title, p.body, p.created_at, p.updated_at,
           u.username AS author_username
    FROM posts p
    JOIN users u ON u.id = p.author_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.body, c.author_id, c.post_id, c.created_at,
           u.username AS author_username
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

/// SqliteRepository
///
/// The `Repository` implementation backed by a single SQLite database.
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Creates a new repository instance using an initialized connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `url` with foreign keys enforced.
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    /// A private, migrated in-memory database. One connection that never
    /// expires, because every new in-memory connection is a fresh database.
    pub async fn in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let repo = Self::new(pool);
        repo.migrate().await?;
        Ok(repo)
    }

    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("migration failed: {e}")))
    }

    async fn count(&self, table_query: &str) -> AppResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(table_query)
            .fetch_one(&self.pool)
            .await?)
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    /// create_user
    ///
    /// Single INSERT; the unique indexes decide collisions atomically.
    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let query = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(&user.username)
            .bind(user.email.to_lowercase())
            .bind(&user.password_hash)
            .bind(&user.oauth_provider)
            .bind(&user.oauth_subject)
            .bind(user.role)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        // The column is COLLATE NOCASE, lower-casing here keeps the index usable either way.
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_identity(&self, provider: &str, subject: &str) -> AppResult<Option<User>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE oauth_provider = ? AND oauth_subject = ?"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(provider)
            .bind(subject)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// link_identity
    ///
    /// The `IS NULL` guard makes linking a compare-and-set: a concurrent link of
    /// the same account updates zero rows instead of overwriting.
    async fn link_identity(&self, user_id: Uuid, provider: &str, subject: &str) -> AppResult<User> {
        let query = format!(
            r#"UPDATE users SET oauth_provider = ?, oauth_subject = ?
               WHERE id = ? AND oauth_provider IS NULL AND oauth_subject IS NULL
               RETURNING {USER_COLUMNS}"#
        );
        let linked = sqlx::query_as::<_, User>(&query)
            .bind(provider)
            .bind(subject)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error)?;

        match linked {
            Some(user) => Ok(user),
            None if self.get_user(user_id).await?.is_some() => {
                Err(AppError::Conflict(ConflictKind::AlreadyLinked))
            }
            None => Err(AppError::NotFound("User")),
        }
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> AppResult<Option<User>> {
        let query = format!("UPDATE users SET role = ? WHERE id = ? RETURNING {USER_COLUMNS}");
        sqlx::query_as::<_, User>(&query)
            .bind(role)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error)
    }

    /// delete_user
    ///
    /// Posts, comments and likes of the user go with it (ON DELETE CASCADE),
    /// including comments and likes other users left on those posts.
    async fn delete_user(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, User>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn create_post(&self, author_id: Uuid, req: PostRequest) -> AppResult<Post> {
        let now = Utc::now();
        sqlx::query_as::<_, Post>(
            r#"INSERT INTO posts (id, author_id, title, body, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               RETURNING id, author_id, title, body, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(author_id)
        .bind(req.title.trim())
        .bind(&req.body)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)
    }

    async fn get_post(&self, id: Uuid) -> AppResult<Option<Post>> {
        let query = format!("{POST_SELECT} WHERE p.id = ?");
        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_posts(&self) -> AppResult<Vec<Post>> {
        let query = format!("{POST_SELECT} ORDER BY p.created_at DESC");
        Ok(sqlx::query_as::<_, Post>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_post(&self, id: Uuid, req: PostRequest) -> AppResult<Option<Post>> {
        sqlx::query_as::<_, Post>(
            r#"UPDATE posts SET title = ?, body = ?, updated_at = ?
               WHERE id = ?
               RETURNING id, author_id, title, body, created_at, updated_at"#,
        )
        .bind(req.title.trim())
        .bind(&req.body)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error)
    }

    async fn delete_post(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_comment(&self, post_id: Uuid, author_id: Uuid, body: String) -> AppResult<Comment> {
        sqlx::query_as::<_, Comment>(
            r#"INSERT INTO comments (body, author_id, post_id, created_at)
               VALUES (?, ?, ?, ?)
               RETURNING id, body, author_id, post_id, created_at"#,
        )
        .bind(body)
        .bind(author_id)
        .bind(post_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)
    }

    async fn get_comment(&self, id: i64) -> AppResult<Option<Comment>> {
        let query = format!("{COMMENT_SELECT} WHERE c.id = ?");
        Ok(sqlx::query_as::<_, Comment>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_comments(&self, post_id: Uuid) -> AppResult<Vec<Comment>> {
        let query = format!("{COMMENT_SELECT} WHERE c.post_id = ? ORDER BY c.created_at ASC, c.id ASC");
        Ok(sqlx::query_as::<_, Comment>(&query)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_comment(&self, id: i64, body: String) -> AppResult<Option<Comment>> {
        sqlx::query_as::<_, Comment>(
            r#"UPDATE comments SET body = ? WHERE id = ?
               RETURNING id, body, author_id, post_id, created_at"#,
        )
        .bind(body)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error)
    }

    async fn delete_comment(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(result.rows_affected() > 0)
    }

    /// toggle_like
    ///
    /// Delete-or-insert inside one transaction. The UNIQUE (user_id, post_id)
    /// constraint still backs the pair if two toggles race.
    async fn toggle_like(&self, user_id: Uuid, post_id: Uuid) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM likes WHERE user_id = ? AND post_id = ?")
            .bind(user_id)
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?
            .rows_affected();

        let liked = if removed > 0 {
            false
        } else {
            sqlx::query("INSERT INTO likes (user_id, post_id, created_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(post_id)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .map_err(write_error)?;
            true
        };

        tx.commit().await?;
        Ok(liked)
    }

    async fn has_liked(&self, user_id: Uuid, post_id: Uuid) -> AppResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM likes WHERE user_id = ? AND post_id = ?",
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(found > 0)
    }

    async fn count_likes(&self, post_id: Uuid) -> AppResult<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM likes WHERE post_id = ?")
                .bind(post_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// get_stats
    ///
    /// Compiles all counters for the administrative dashboard.
    async fn get_stats(&self) -> AppResult<AdminDashboardStats> {
        Ok(AdminDashboardStats {
            total_users: self.count("SELECT COUNT(*) FROM users").await?,
            total_posts: self.count("SELECT COUNT(*) FROM posts").await?,
            total_comments: self.count("SELECT COUNT(*) FROM comments").await?,
            total_likes: self.count("SELECT COUNT(*) FROM likes").await?,
        })
    }
}
