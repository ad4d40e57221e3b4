use anyhow::Context;
use ditto_core::{AssembleOptions, Assembler};

use crate::cli::args::BuildArgs;
use crate::cli::input::{collect_entries, resolve_timestamp};
use crate::exit_codes;

pub fn run(args: BuildArgs) -> anyhow::Result<i32> {
    let entries = collect_entries(&args.input)?;
    let timestamp = resolve_timestamp(&args.input)?;

    let assembler = Assembler::new(AssembleOptions {
        deflate_level: args.level,
        parallel: args.parallel,
        require_entries: args.require_entries,
    });
    let buffer = assembler
        .assemble(&entries, &timestamp, args.strategy)
        .context("building archive")?;

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&args.output, buffer.as_bytes())
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    tracing::info!(
        output = %args.output.display(),
        strategy = %args.strategy,
        entries = buffer.entry_count(),
        bytes = buffer.len(),
        "wrote archive"
    );
    println!("{}  {}", buffer.fingerprint().prefixed(), args.output.display());
    Ok(exit_codes::SUCCESS)
}
