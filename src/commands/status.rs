use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::{DB_SCHEMA_VERSION, Store};

pub fn run(args: StatusArgs) -> Result<()> {
    if !args.db_path.exists() {
        warn!(path = %args.db_path.display(), "database file missing");
        return Ok(());
    }

    let store = Store::open(&args.db_path)
        .with_context(|| format!("failed to open {}", args.db_path.display()))?;
    let counts = store.counts()?;

    info!(
        path = %args.db_path.display(),
        schema_version = %store.metadata("db_schema_version")?.unwrap_or_default(),
        expected_schema_version = DB_SCHEMA_VERSION,
        updated_at = %store.metadata("db_updated_at")?.unwrap_or_default(),
        roots = counts.roots,
        attachments = counts.attachments,
        "database status"
    );

    Ok(())
}
