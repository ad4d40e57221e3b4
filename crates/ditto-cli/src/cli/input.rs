//! Filesystem side of a build: enumerate, filter, read, and resolve the
//! timestamp. Everything downstream of here is pure.

use anyhow::{bail, Context, Result};
use ditto_core::{sorted_entries, ArchiveTimestamp, InputEntry};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Component, Path};
use walkdir::WalkDir;

use super::args::InputArgs;

pub(crate) fn compile_globset(globs: &[String]) -> Result<GlobSet> {
    let mut b = GlobSetBuilder::new();
    for g in globs {
        let glob = GlobBuilder::new(g)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob: {}", g))?;
        b.add(glob);
    }
    Ok(b.build()?)
}

/// Collect regular files under `--root`, as forward-slash relative paths in
/// lexicographic order. Symlinks and other special files are skipped.
pub(crate) fn collect_entries(args: &InputArgs) -> Result<Vec<InputEntry>> {
    let root = &args.root;
    if !root.is_dir() {
        bail!("--root is not a directory: {}", root.display());
    }

    let include = if args.include.is_empty() {
        compile_globset(&["**".to_string()])?
    } else {
        compile_globset(&args.include)?
    };
    let exclude = compile_globset(&args.exclude)?;

    let mut entries = Vec::new();
    for dent in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let dent = dent.with_context(|| format!("walking {}", root.display()))?;
        if !dent.file_type().is_file() {
            if dent.file_type().is_symlink() {
                tracing::debug!(path = %dent.path().display(), "skipping symlink");
            }
            continue;
        }

        let rel = relative_path(root, dent.path())?;
        if !include.is_match(&rel) || exclude.is_match(&rel) {
            continue;
        }

        let content = std::fs::read(dent.path())
            .with_context(|| format!("failed to read {}", dent.path().display()))?;
        tracing::debug!(path = %rel, bytes = content.len(), "captured entry");
        entries.push(InputEntry::new(rel, content)?);
    }

    tracing::info!(root = %root.display(), entries = entries.len(), "collected input files");
    Ok(sorted_entries(entries))
}

fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(s) => parts.push(s),
                None => bail!("path is not valid UTF-8: {}", path.display()),
            },
            other => bail!("unexpected path component {:?} in {}", other, path.display()),
        }
    }
    Ok(parts.join("/"))
}

/// `--timestamp` wins over `--epoch`/`SOURCE_DATE_EPOCH`; with neither, the
/// DOS epoch. The host clock is never used.
pub(crate) fn resolve_timestamp(args: &InputArgs) -> Result<ArchiveTimestamp> {
    if let Some(ts) = &args.timestamp {
        return ts
            .parse()
            .with_context(|| format!("invalid --timestamp {:?}", ts));
    }
    if let Some(secs) = args.epoch {
        return ArchiveTimestamp::from_unix_seconds(secs)
            .with_context(|| format!("invalid --epoch / SOURCE_DATE_EPOCH {}", secs));
    }
    Ok(ArchiveTimestamp::DOS_EPOCH)
}
