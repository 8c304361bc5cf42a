//! Copy task records from Redis into Postgres.
//!
//! Existing Postgres rows are left alone, so the tool can be re-run after
//! a partial migration. The work queue stays in Redis.

use anyhow::Context;
use relaize_db::{PgTaskRepo, RedisTaskRepo, TaskRepo};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relaize_migrate=info,relaize_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".into());
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let client = redis::Client::open(redis_url.as_str()).context("invalid REDIS_URL")?;
    let source = RedisTaskRepo::connect(&client)
        .await
        .context("failed to connect to Redis")?;

    let pool = relaize_db::create_pool(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    relaize_db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;
    let target = PgTaskRepo::new(pool);

    let ids = source.all_ids().await?;
    let total = ids.len();
    let (mut migrated, mut skipped) = (0usize, 0usize);

    for id in ids {
        let Some(task) = source.get(id).await? else {
            tracing::warn!(task_id = %id, "Indexed task has no data blob; skipping");
            skipped += 1;
            continue;
        };
        if target.insert_if_absent(&task).await? {
            migrated += 1;
        } else {
            skipped += 1;
        }
    }

    tracing::info!(migrated, skipped, total, "Migration finished");
    Ok(())
}
