use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::PublishArgs;
use crate::model::ServedFile;
use crate::publish;
use crate::store::Store;
use crate::util::{print_json_pretty, public_url};

#[derive(Debug, Serialize)]
struct PublishOutput<'a> {
    id: &'a str,
    filename: &'a str,
    url: String,
}

pub fn run(args: PublishArgs) -> Result<()> {
    let mut store = Store::open(&args.db_path)
        .with_context(|| format!("failed to open {}", args.db_path.display()))?;

    let root = publish::publish(&mut store, &args.base_path, &args.filename)
        .with_context(|| format!("failed to publish {}", args.filename))?;
    let url = public_url(args.site_url.as_deref(), &root.served_path());

    info!(id = %root.id, url = %url, "publish completed");

    if args.json {
        print_json_pretty(&PublishOutput {
            id: &root.id,
            filename: &root.filename,
            url,
        })
    } else {
        println!("{url}");
        Ok(())
    }
}
