use actix_web::web;
use anyhow::anyhow;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::errors::Result;
use crate::DbPool;

pub mod catalog;
pub mod reviews;
pub mod titles;
pub mod users;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Runs `f` with a pooled connection on the blocking thread pool.
pub async fn with_conn<F, T>(pool: &web::Data<DbPool>, f: F) -> Result<T>
where
    F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    web::block(move || {
        let mut conn = pool
            .get()
            .map_err(|e| anyhow!("Couldn't get db connection from pool: {}", e))?;
        f(&mut conn)
    })
    .await?
}

pub fn run_migrations(conn: &mut PgConnection) -> anyhow::Result<()> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("Failed to run migrations: {}", e))?;
    for migration in applied {
        log::info!("Applied migration {}", migration);
    }
    Ok(())
}

/// `%needle%` with LIKE wildcards in the needle escaped.
pub fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Scratch-database support for the persistence tests. They are ignored by
/// default; run them with `TEST_DATABASE_URL` set and `cargo test -- --ignored`.
#[cfg(test)]
pub mod testing {
    use diesel::{Connection, PgConnection, RunQueryDsl, SelectableHelper};
    use once_cell::sync::Lazy;

    use crate::errors::{ApiError, Result};
    use crate::model::{NewReview, NewTitle, NewUser, Review, Title, User};
    use crate::schema::titles;

    pub const DATABASE_URL_VAR: &str = "TEST_DATABASE_URL";

    static MIGRATED_URL: Lazy<String> = Lazy::new(|| {
        let url = std::env::var(DATABASE_URL_VAR)
            .unwrap_or_else(|_| panic!("{} must point at a scratch database", DATABASE_URL_VAR));
        let mut conn = PgConnection::establish(&url).expect("Failed to connect to the test database");
        super::run_migrations(&mut conn).expect("Failed to migrate the test database");
        url
    });

    /// Runs `f` inside a transaction that is always rolled back.
    pub fn with_test_conn<F>(f: F)
    where
        F: FnOnce(&mut PgConnection) -> Result<()>,
    {
        let mut conn =
            PgConnection::establish(&MIGRATED_URL).expect("Failed to connect to the test database");
        conn.test_transaction::<_, ApiError, _>(f);
    }

    pub fn user(conn: &mut PgConnection, name: &str) -> Result<User> {
        super::users::create(
            conn,
            NewUser {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                ..Default::default()
            },
        )
    }

    pub fn title(conn: &mut PgConnection, name: &str, year: i32) -> Result<Title> {
        Ok(diesel::insert_into(titles::table)
            .values(NewTitle {
                name: name.to_string(),
                description: None,
                year,
                category_id: None,
            })
            .returning(Title::as_returning())
            .get_result(conn)?)
    }

    pub fn review(conn: &mut PgConnection, title: &Title, author: &User, score: i32) -> Result<Review> {
        super::reviews::create_review(
            conn,
            NewReview {
                title_id: title.id,
                author_id: author.id,
                text: format!("{} rates it {}", author.username, score),
                score,
            },
        )
    }
}
