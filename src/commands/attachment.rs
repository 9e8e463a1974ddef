use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::AttachmentArgs;
use crate::model::ServedFile;
use crate::publish;
use crate::store::Store;

pub fn run(args: AttachmentArgs) -> Result<()> {
    let store = Store::open(&args.db_path)
        .with_context(|| format!("failed to open {}", args.db_path.display()))?;

    let attachment = publish::resolve_attachment(&store, &args.root_id, &args.filename)
        .with_context(|| format!("no attachment {} under {}", args.filename, args.root_id))?;

    let source_path = attachment.source_path(&args.base_path);
    if attachment.is_missing(&args.base_path) {
        warn!(path = %source_path.display(), "attachment source missing");
        bail!("attachment source missing: {}", source_path.display());
    }

    info!(id = %attachment.id, served_path = %attachment.served_path(), "attachment resolved");
    println!("{}", source_path.display());

    Ok(())
}
