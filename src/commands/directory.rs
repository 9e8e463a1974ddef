use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::DirectoryArgs;
use crate::publish;
use crate::store::Store;
use crate::util::{print_json_pretty, public_url};

pub fn run(args: DirectoryArgs) -> Result<()> {
    let store = Store::open(&args.db_path)
        .with_context(|| format!("failed to open {}", args.db_path.display()))?;

    let entries = publish::directory(&store, &args.base_path)?;
    info!(published = entries.len(), "directory listed");

    if args.json {
        return print_json_pretty(&entries);
    }

    for entry in &entries {
        if entry.missing {
            warn!(filename = %entry.root.filename, "source file missing");
        }
        println!(
            "{}\t{}\t{}",
            entry.root.filename,
            public_url(args.site_url.as_deref(), &entry.served_path),
            if entry.missing { "missing" } else { "ok" }
        );
    }

    Ok(())
}
