//! Cross-strategy equivalence verification.
//!
//! Builds the same input set under each requested strategy, several times,
//! and checks two things:
//!
//! 1. **Determinism**: repeated `Store` builds are byte-identical (same
//!    SHA-256 fingerprint). Runs alternate sequential and parallel encoding,
//!    so the worker pool is covered by the same check.
//! 2. **Structure**: every strategy's buffer decodes back to exactly the
//!    input entries (path, order, bytes, CRC-32, timestamp). `Deflate`
//!    buffers are held to this standard only; their compressed bytes may
//!    legitimately differ between conformant deflate implementations.
//!
//! A determinism failure is `BuildError::Divergence` (or a `Divergence`
//! status under `DivergencePolicy::Report`). A structural failure is always
//! an error.

use serde::Serialize;

use crate::archive::inspect::inspect;
use crate::archive::{ArchiveBuffer, Assembler, CompressionStrategy, InputEntry};
use crate::checksum::{crc32, Fingerprint};
use crate::config::{ConfigError, DivergencePolicy, VerifyConfig};
use crate::error::{BuildError, Result};
use crate::timestamp::ArchiveTimestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// All runs byte-identical and structurally sound.
    Match,
    /// Structurally sound; bytes are not required to be identical.
    StructuralMatch,
    /// Runs that had to be identical were not (reported, not fatal).
    Divergence,
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Match => "match",
            Self::StructuralMatch => "structural-match",
            Self::Divergence => "DIVERGENCE",
        })
    }
}

/// Outcome for one strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyRecord {
    pub strategy_name: String,
    /// Fingerprint of the first run's buffer.
    pub fingerprint_hex: String,
    pub byte_length: usize,
    pub match_status: MatchStatus,
    pub runs: usize,
    pub entry_count: usize,
}

/// One record per verified strategy, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub records: Vec<StrategyRecord>,
}

impl VerificationReport {
    /// True when no strategy diverged.
    pub fn is_ok(&self) -> bool {
        self.records
            .iter()
            .all(|r| r.match_status != MatchStatus::Divergence)
    }

    pub fn record(&self, strategy: CompressionStrategy) -> Option<&StrategyRecord> {
        self.records
            .iter()
            .find(|r| r.strategy_name == strategy.name())
    }

    pub fn divergences(&self) -> impl Iterator<Item = &StrategyRecord> {
        self.records
            .iter()
            .filter(|r| r.match_status == MatchStatus::Divergence)
    }
}

impl std::fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:<10} {:<18} {:>10} {:>5}  fingerprint",
            "strategy", "status", "bytes", "runs"
        )?;
        for r in &self.records {
            writeln!(
                f,
                "{:<10} {:<18} {:>10} {:>5}  sha256:{}",
                r.strategy_name,
                r.match_status.to_string(),
                r.byte_length,
                r.runs,
                r.fingerprint_hex
            )?;
        }
        Ok(())
    }
}

/// A named buffer for the file-write collaborator.
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    pub output_name: String,
    pub buffer: ArchiveBuffer,
}

#[derive(Debug, Clone, Default)]
pub struct EquivalenceVerifier {
    config: VerifyConfig,
}

impl EquivalenceVerifier {
    pub fn new(config: VerifyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Verify every configured strategy against `entries` at `timestamp`.
    pub fn verify(
        &self,
        entries: &[InputEntry],
        timestamp: &ArchiveTimestamp,
    ) -> Result<VerificationReport> {
        self.run(entries, timestamp).map(|(report, _)| report)
    }

    /// Like `verify`, also handing back one `<stem>-<strategy>.zip` artifact
    /// per strategy (the first run's buffer).
    pub fn verify_with_artifacts(
        &self,
        entries: &[InputEntry],
        timestamp: &ArchiveTimestamp,
        stem: &str,
    ) -> Result<(VerificationReport, Vec<OutputArtifact>)> {
        let (report, buffers) = self.run(entries, timestamp)?;
        let artifacts = buffers
            .into_iter()
            .map(|buffer| OutputArtifact {
                output_name: format!("{}-{}.zip", stem, buffer.strategy().name()),
                buffer,
            })
            .collect();
        Ok((report, artifacts))
    }

    fn run(
        &self,
        entries: &[InputEntry],
        timestamp: &ArchiveTimestamp,
    ) -> Result<(VerificationReport, Vec<ArchiveBuffer>)> {
        // An empty strategy set would otherwise pass without building anything.
        self.config.validate().map_err(|e| match e {
            ConfigError::Invalid(msg) => BuildError::InvalidConfig(msg),
            other => BuildError::InvalidConfig(other.to_string()),
        })?;

        let mut report = VerificationReport::default();
        let mut buffers = Vec::new();

        for strategy in unique_strategies(&self.config.strategies) {
            let (record, buffer) = self.verify_strategy(entries, timestamp, strategy)?;
            tracing::info!(
                strategy = %strategy,
                status = %record.match_status,
                fingerprint = %record.fingerprint_hex,
                bytes = record.byte_length,
                "verified strategy"
            );
            report.records.push(record);
            buffers.push(buffer);
        }

        Ok((report, buffers))
    }

    fn verify_strategy(
        &self,
        entries: &[InputEntry],
        timestamp: &ArchiveTimestamp,
        strategy: CompressionStrategy,
    ) -> Result<(StrategyRecord, ArchiveBuffer)> {
        let runs = self.config.runs;
        let mut status = if strategy.is_byte_deterministic() {
            MatchStatus::Match
        } else {
            MatchStatus::StructuralMatch
        };

        let first = Assembler::new(self.config.assemble_options(0))
            .assemble(entries, timestamp, strategy)?;
        check_structure(&first, entries, timestamp)?;
        let first_fp = first.fingerprint();

        for run in 1..runs {
            let buf = Assembler::new(self.config.assemble_options(run))
                .assemble(entries, timestamp, strategy)?;
            let fp = buf.fingerprint();
            status = self.run_status(strategy, run, &first_fp, &fp, status)?;
            if fp != first_fp && !strategy.is_byte_deterministic() {
                tracing::warn!(
                    strategy = %strategy,
                    run,
                    first = %first_fp,
                    this = %fp,
                    "compressed bytes differ between runs; checking structure"
                );
                check_structure(&buf, entries, timestamp)?;
            }
        }

        if let Some(pinned) = self.config.expected_for(strategy) {
            if !first_fp.matches(pinned) {
                self.diverged(
                    strategy.name().to_string(),
                    format!("{}@expected", strategy.name()),
                    &first_fp,
                    pinned,
                )?;
                status = MatchStatus::Divergence;
            }
        }

        let record = StrategyRecord {
            strategy_name: strategy.name().to_string(),
            fingerprint_hex: first_fp.hex().to_string(),
            byte_length: first.len(),
            match_status: status,
            runs,
            entry_count: first.entry_count(),
        };
        Ok((record, first))
    }

    /// Status after comparing run `run` with run 0. Only byte-deterministic
    /// strategies can diverge; deflate runs are settled structurally.
    fn run_status(
        &self,
        strategy: CompressionStrategy,
        run: usize,
        first: &Fingerprint,
        this: &Fingerprint,
        current: MatchStatus,
    ) -> Result<MatchStatus> {
        if first == this || !strategy.is_byte_deterministic() {
            return Ok(current);
        }
        self.diverged(
            run_label(strategy, 0),
            run_label(strategy, run),
            first,
            this.hex(),
        )?;
        Ok(MatchStatus::Divergence)
    }

    fn diverged(
        &self,
        strategy_a: String,
        strategy_b: String,
        fingerprint_a: &Fingerprint,
        fingerprint_b: &str,
    ) -> Result<()> {
        match self.config.divergence {
            DivergencePolicy::Fail => Err(BuildError::Divergence {
                strategy_a,
                strategy_b,
                fingerprint_a: fingerprint_a.hex().to_string(),
                fingerprint_b: fingerprint_b.to_string(),
            }),
            DivergencePolicy::Report => {
                tracing::warn!(
                    a = %strategy_a,
                    b = %strategy_b,
                    fingerprint_a = %fingerprint_a,
                    fingerprint_b = %fingerprint_b,
                    "divergence (advisory)"
                );
                Ok(())
            }
        }
    }
}

/// Verify `strategies` with default settings otherwise.
pub fn verify(
    entries: &[InputEntry],
    timestamp: &ArchiveTimestamp,
    strategies: &[CompressionStrategy],
) -> Result<VerificationReport> {
    EquivalenceVerifier::new(VerifyConfig {
        strategies: strategies.to_vec(),
        ..VerifyConfig::default()
    })
    .verify(entries, timestamp)
}

/// Decode `buf` and compare it entry by entry with the inputs.
fn check_structure(
    buf: &ArchiveBuffer,
    entries: &[InputEntry],
    timestamp: &ArchiveTimestamp,
) -> Result<()> {
    let strategy = buf.strategy();
    let decoded = inspect(buf.as_bytes())?;
    let packed = timestamp.pack();

    for (i, input) in entries.iter().enumerate() {
        let mismatch = || BuildError::ContentMismatch {
            strategy,
            path: input.path().to_string(),
        };
        let out = decoded.get(i).ok_or_else(mismatch)?;
        let same = out.path == input.path()
            && out.method == strategy.method_code()
            && out.packed_date_time == packed
            && out.crc32 == crc32(input.content())
            && out.content == input.content();
        if !same {
            return Err(mismatch());
        }
    }
    if let Some(extra) = decoded.get(entries.len()) {
        return Err(BuildError::ContentMismatch {
            strategy,
            path: extra.path.clone(),
        });
    }
    Ok(())
}

fn run_label(strategy: CompressionStrategy, run: usize) -> String {
    format!("{}[run {}]", strategy.name(), run)
}

fn unique_strategies(requested: &[CompressionStrategy]) -> Vec<CompressionStrategy> {
    let mut out = Vec::with_capacity(requested.len());
    for s in requested {
        if !out.contains(s) {
            out.push(*s);
        }
    }
    out
}
