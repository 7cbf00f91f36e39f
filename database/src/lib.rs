use sqlx::{migrate::Migrator, postgres::PgPoolOptions};
use tracing::instrument;

mod error;
mod institution;
mod launch;
mod meeting;
mod token;

pub use error::Error;
pub use institution::Institution;
pub use launch::{Launch, LmsKind};
pub use meeting::ScheduledMeeting;
pub use sqlx::{types::Json, PgPool};
pub use token::LaunchToken;

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Connect to the credential store
#[instrument(skip_all)]
pub async fn connect(url: &str) -> Result<PgPool> {
    let db = PgPoolOptions::new().max_connections(5).connect(url).await?;
    Ok(db)
}

/// Apply all pending schema migrations
#[instrument(skip_all)]
pub async fn migrate(db: &PgPool) -> Result<()> {
    MIGRATOR.run(db).await?;
    Ok(())
}
