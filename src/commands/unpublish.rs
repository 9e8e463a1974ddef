use anyhow::{Context, Result};
use tracing::info;

use crate::cli::UnpublishArgs;
use crate::publish;
use crate::store::Store;
use crate::util::print_json_pretty;

pub fn run(args: UnpublishArgs) -> Result<()> {
    let mut store = Store::open(&args.db_path)
        .with_context(|| format!("failed to open {}", args.db_path.display()))?;

    let report = publish::unpublish(&mut store, &args.filename)
        .with_context(|| format!("failed to unpublish {}", args.filename))?;

    info!(
        id = %report.root.id,
        attachments_removed = report.attachments_removed,
        "unpublish completed"
    );

    if args.json {
        print_json_pretty(&report)
    } else {
        println!(
            "unpublished {} ({} attachments removed)",
            report.root.filename, report.attachments_removed
        );
        Ok(())
    }
}
