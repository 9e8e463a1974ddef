use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::RenderArgs;
use crate::publish;
use crate::store::Store;
use crate::util::write_text;

pub fn run(args: RenderArgs) -> Result<()> {
    let strategy = args.strategy();
    let mut store = Store::open(&args.db_path)
        .with_context(|| format!("failed to open {}", args.db_path.display()))?;

    let rendered = publish::render_by_id(&mut store, &args.base_path, &args.id, strategy)
        .with_context(|| format!("failed to render {}", args.id))?;

    match &args.output {
        Some(path) => {
            write_text(path, &rendered.html)?;
            info!(path = %path.display(), "wrote rendered html");
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(rendered.html.as_bytes())
                .context("failed to write rendered html to stdout")?;
        }
    }

    info!(
        id = %rendered.root.id,
        attachments = rendered.attachments.len(),
        tables_of_contents = rendered.tables_of_contents,
        strategy = strategy.as_str(),
        "render completed"
    );

    Ok(())
}
