use anyhow::Context;
use ditto_core::{
    BuildError, DivergencePolicy, EquivalenceVerifier, ErrorClass, VerifyConfig,
    VerifyConfigOverrides,
};

use crate::cli::args::{OutputFormat, VerifyArgs};
use crate::cli::input::{collect_entries, resolve_timestamp};
use crate::exit_codes;

pub fn run(args: VerifyArgs) -> anyhow::Result<i32> {
    let config = load_config(&args)?;
    let entries = collect_entries(&args.input)?;
    let timestamp = resolve_timestamp(&args.input)?;

    let verifier = EquivalenceVerifier::new(config);
    let (report, artifacts) = match verifier.verify_with_artifacts(&entries, &timestamp, &args.stem)
    {
        Ok(out) => out,
        Err(e) if is_check_failure(&e) => {
            eprintln!("verify: FAILED ({}): {}", e.code(), e);
            return Ok(exit_codes::DIVERGENCE);
        }
        Err(e) => return Err(e).context("verifying archive equivalence"),
    };

    if let Some(dir) = &args.out_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        for artifact in &artifacts {
            let path = dir.join(&artifact.output_name);
            std::fs::write(&path, artifact.buffer.as_bytes())
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote artifact");
        }
    }

    match args.format {
        OutputFormat::Text => print!("{}", report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.is_ok() {
        Ok(exit_codes::SUCCESS)
    } else {
        for r in report.divergences() {
            eprintln!("verify: divergence in {} (advisory)", r.strategy_name);
        }
        Ok(exit_codes::DIVERGENCE)
    }
}

fn load_config(args: &VerifyArgs) -> anyhow::Result<VerifyConfig> {
    let base = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            VerifyConfig::from_yaml_str(&raw)
                .with_context(|| format!("in config {}", path.display()))?
        }
        None => VerifyConfig::default(),
    };

    let config = base.apply(VerifyConfigOverrides {
        strategies: (!args.strategies.is_empty()).then(|| args.strategies.clone()),
        runs: args.runs,
        deflate_level: args.level,
        parallel: None,
        require_entries: args.require_entries.then_some(true),
        divergence: args.advisory.then_some(DivergencePolicy::Report),
    });
    config.validate()?;
    Ok(config)
}

/// Failures of the check itself, as opposed to bad input or I/O.
fn is_check_failure(e: &BuildError) -> bool {
    match e.class() {
        ErrorClass::Determinism => true,
        ErrorClass::Integrity => !matches!(e, BuildError::Io(_)),
        ErrorClass::Input | ErrorClass::Limits => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ditto_core::CompressionStrategy;

    #[test]
    fn divergence_and_mismatch_are_check_failures() {
        let divergence = BuildError::Divergence {
            strategy_a: "store[run 0]".into(),
            strategy_b: "store[run 1]".into(),
            fingerprint_a: "a".into(),
            fingerprint_b: "b".into(),
        };
        assert!(is_check_failure(&divergence));
        assert!(is_check_failure(&BuildError::ContentMismatch {
            strategy: CompressionStrategy::Deflate,
            path: "x".into(),
        }));
        assert!(!is_check_failure(&BuildError::DuplicatePath("x".into())));
        assert!(!is_check_failure(&BuildError::Io(std::io::Error::other(
            "disk"
        ))));
    }
}
