use toxicframe_core::adaptive::{AdaptiveOrchestrator, AdaptivePlan, AdaptiveReport, AdaptiveStep};
use toxicframe_core::brute_force::{
    two_byte_sweep, BruteForceEnumerator, CrossProduct, EditVariants, Finding, ScanReport,
};
use toxicframe_core::classification::Classification;
use toxicframe_core::config::ToxicframeConfig;
use toxicframe_core::context::{ContextError, RunContext, RunSettings};
use toxicframe_core::corpus::{PatternLayout, ReferenceCorpus, load_seeds};
use toxicframe_core::hill_climb::MutationHillClimber;
use toxicframe_core::length_search::{self, LengthOutcome};
use toxicframe_core::mutator::{BitFlipMutator, Mutator, SampledSubstitutionMutator};
use toxicframe_core::range_search::RangeBoundarySearch;
use toxicframe_core::safe_cache::SafeCache;
use toxicframe_core::simplify::{self, Simplification};
use toxicframe_core::store::{RecordKind, ResultStore, TestRecord};
use toxicframe_core::sweep::{self, EmbeddedResult, LengthHistogram};
use toxicframe_core::template::Template;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Find and minimise frames a device silently drops", long_about = None)]
struct Cli {
    #[clap(short, long, value_parser, global = true)]
    config_file: Option<PathBuf>,
    /// Trials per candidate for final classifications.
    #[clap(long, global = true)]
    trials: Option<u32>,
    #[clap(long, global = true)]
    binary_search_trials: Option<u32>,
    /// Trials per candidate in brute-force batches.
    #[clap(long, global = true)]
    batch_trials: Option<u32>,
    #[clap(long, global = true)]
    batch_size: Option<usize>,
    /// Disable the SAFE-only cache for this run.
    #[clap(long, global = true)]
    no_cache: bool,
    /// Re-measure candidates that already have a stored result.
    #[clap(long, global = true)]
    force_retest: bool,
    /// Result store path, overriding [store] path.
    #[clap(long, global = true)]
    db: Option<PathBuf>,
    #[clap(short, long, global = true)]
    verbose: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shrink a toxic reference capture to its smallest toxic slice.
    Range {
        corpus: PathBuf,
    },
    /// Minimise the suffix or pattern length of a toxic sample.
    Length {
        #[clap(value_enum)]
        part: LengthPart,
        sample: PathBuf,
        #[clap(long)]
        pattern_len: Option<usize>,
    },
    /// Find the shortest run of one repeated byte that is toxic.
    SingleByte {
        #[clap(value_parser = parse_byte)]
        byte: u8,
        #[clap(long, default_value_t = 1400)]
        max_len: usize,
    },
    /// Enumerate every part of a fixed length, or every edit of a seed.
    Brute {
        /// Label the results are stored under.
        #[clap(long, default_value = "brute_force")]
        label: String,
        #[clap(long, conflicts_with = "seed")]
        length: Option<usize>,
        #[clap(long, requires = "distance")]
        seed: Option<PathBuf>,
        #[clap(long)]
        distance: Option<usize>,
        #[clap(flatten)]
        template: TemplateArgs,
    },
    /// Sweep every 2-byte pattern repeated to fill a packet.
    TwoByte {
        #[clap(long, default_value_t = 200)]
        packet_size: usize,
        #[clap(long, value_parser = parse_u16, default_value = "0x0000")]
        first: u16,
        #[clap(long, value_parser = parse_u16, default_value = "0xffff")]
        last: u16,
    },
    /// Measure every run length of one byte over a range, with full trials.
    Histogram {
        #[clap(value_parser = parse_byte)]
        byte: u8,
        #[clap(long, default_value_t = 100)]
        start: usize,
        #[clap(long, default_value_t = 130)]
        end: usize,
    },
    /// Measure a toxic candidate at several offsets inside larger packets.
    Embedded {
        toxic: PathBuf,
        /// Packet sizes, comma separated.
        #[clap(long, value_delimiter = ',')]
        sizes: Vec<usize>,
        #[clap(long, value_parser = parse_byte, default_value = "0x22")]
        filler: u8,
    },
    /// Reduce the distinct byte values of a toxic pattern.
    Simplify {
        pattern: PathBuf,
        #[clap(long, default_value_t = simplify::DEFAULT_ROUNDS)]
        rounds: usize,
    },
    /// Catalogue toxic variants around known toxic seeds.
    Climb {
        #[clap(required = true)]
        seeds: Vec<PathBuf>,
        #[clap(long, default_value = "hill_climb")]
        label: String,
        #[clap(long)]
        iterations: Option<usize>,
        #[clap(long)]
        bit_flips: bool,
        #[clap(flatten)]
        template: TemplateArgs,
    },
    /// Length searches followed by content searches at the minimised length.
    Adaptive {
        sample: PathBuf,
        #[clap(long)]
        pattern_len: Option<usize>,
        /// Steps to run, comma separated. Defaults to all of them in order.
        #[clap(long, value_enum, value_delimiter = ',')]
        steps: Vec<StepArg>,
        #[clap(long)]
        iterations: Option<usize>,
        #[clap(long)]
        bit_flips: bool,
    },
    /// Summarise the result store without touching the network.
    Report {
        /// Maximum TOXIC records listed per kind.
        #[clap(long, default_value_t = 50)]
        limit: usize,
    },
    /// Drop every SAFE cache entry.
    CacheInvalidate,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LengthPart {
    Suffix,
    Pattern,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StepArg {
    SuffixLength,
    SuffixContent,
    PatternLength,
    PatternContent,
}

impl From<StepArg> for AdaptiveStep {
    fn from(step: StepArg) -> Self {
        match step {
            StepArg::SuffixLength => AdaptiveStep::SuffixLength,
            StepArg::SuffixContent => AdaptiveStep::SuffixContent,
            StepArg::PatternLength => AdaptiveStep::PatternLength,
            StepArg::PatternContent => AdaptiveStep::PatternContent,
        }
    }
}

/// Fixed bytes around the part being varied.
#[derive(Args, Debug)]
struct TemplateArgs {
    #[clap(long, value_parser = parse_hex)]
    prefix_hex: Option<HexBytes>,
    #[clap(long, default_value_t = 1)]
    repeat: usize,
    #[clap(long, value_parser = parse_hex)]
    suffix_hex: Option<HexBytes>,
}

#[derive(Clone, Debug, PartialEq)]
struct HexBytes(Vec<u8>);

impl TemplateArgs {
    fn template(&self) -> Template {
        Template {
            prefix: self.prefix_hex.clone().map(|h| h.0).unwrap_or_default(),
            repeat: self.repeat.max(1),
            suffix: self.suffix_hex.clone().map(|h| h.0).unwrap_or_default(),
        }
    }
}

fn parse_hex(s: &str) -> Result<HexBytes, String> {
    hex::decode(s.trim_start_matches("0x"))
        .map(HexBytes)
        .map_err(|e| format!("invalid hex '{s}': {e}"))
}

fn parse_byte(s: &str) -> Result<u8, String> {
    match s.strip_prefix("0x") {
        Some(digits) => u8::from_str_radix(digits, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("invalid byte '{s}': {e}"))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    match s.strip_prefix("0x") {
        Some(digits) => u16::from_str_radix(digits, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("invalid 16-bit value '{s}': {e}"))
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config_file {
        Some(config_path) => {
            tracing::info!(path = ?config_path, "loading configuration");
            ToxicframeConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("toxicframe.toml");
            if default_config_path.exists() {
                tracing::info!(path = ?default_config_path, "loading default configuration");
                ToxicframeConfig::load_from_file(&default_config_path)?
            } else {
                tracing::info!("no configuration file found, using built-in defaults");
                ToxicframeConfig::default()
            }
        }
    };
    apply_overrides(&cli, &mut config);
    tracing::debug!(?config, "effective configuration");

    match &cli.command {
        Command::Report { limit } => return report(&config, *limit),
        Command::CacheInvalidate => {
            let cache = SafeCache::open(&config.store.path, config.store.cache_epoch)?;
            let removed = cache.invalidate()?;
            println!("Removed {removed} SAFE cache entries from {:?}", config.store.path);
            return Ok(());
        }
        _ => {}
    }

    let settings = RunSettings {
        trials: config.trials.count,
        binary_search_trials: config.trials.binary_search,
        batch_trials: config.trials.batch,
        batch_size: config.batch.size,
        force_retest: cli.force_retest,
    };
    let ctx = match RunContext::open(&config, settings) {
        Ok(ctx) => ctx,
        Err(ContextError::TransportUnavailable { what, hint }) => {
            anyhow::bail!("{what} is unavailable: {hint}");
        }
        Err(e) => return Err(e).context("failed to open run context"),
    };

    let started = Instant::now();
    let outcome = run(&ctx, &config, &cli.command);
    let stats = ctx.close();
    println!(
        "Probes: {} classified ({} TOXIC, {} SAFE, {} MAYBE, {} confirmations), {} store hits, {} cache hits in {:.1?}",
        stats.classified,
        stats.toxic,
        stats.safe,
        stats.maybe,
        stats.confirmed,
        stats.store_hits,
        stats.cache_hits,
        started.elapsed()
    );
    outcome
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn apply_overrides(cli: &Cli, config: &mut ToxicframeConfig) {
    if let Some(trials) = cli.trials {
        config.trials.count = trials;
    }
    if let Some(trials) = cli.binary_search_trials {
        config.trials.binary_search = trials;
    }
    if let Some(trials) = cli.batch_trials {
        config.trials.batch = trials;
    }
    if let Some(size) = cli.batch_size {
        config.batch.size = size;
    }
    if cli.no_cache {
        config.store.safe_cache = false;
    }
    if let Some(db) = &cli.db {
        config.store.path = db.clone();
    }
}

fn run(ctx: &RunContext, config: &ToxicframeConfig, command: &Command) -> anyhow::Result<()> {
    match command {
        Command::Range { corpus } => {
            let corpus = ReferenceCorpus::load_from_file(corpus)?;
            tracing::info!(size = corpus.len(), "reference corpus loaded");
            match RangeBoundarySearch::new(ctx, &corpus).run()? {
                Some(range) => {
                    let slice = corpus.slice(range.start, range.len())?;
                    println!(
                        "Smallest toxic slice: [{}, {}] ({} bytes, confirmed {})\n{}",
                        range.start,
                        range.end,
                        range.len(),
                        range.confirmation,
                        slice.to_hex()
                    );
                }
                None => println!("The full corpus is not toxic; nothing to minimise."),
            }
        }
        Command::Length {
            part,
            sample,
            pattern_len,
        } => {
            let layout = read_layout(sample, pattern_len.unwrap_or(config.search.pattern_len))?;
            let outcome = match part {
                LengthPart::Suffix => length_search::suffix_length(ctx, &layout)?,
                LengthPart::Pattern => length_search::pattern_length(ctx, &layout)?,
            };
            print_length(&format!("{part:?}").to_lowercase(), outcome.as_ref());
        }
        Command::SingleByte { byte, max_len } => {
            let outcome = length_search::single_byte_length(ctx, *byte, *max_len)?;
            print_length(&format!("byte 0x{byte:02x}"), outcome.as_ref());
        }
        Command::Brute {
            label,
            length,
            seed,
            distance,
            template,
        } => {
            let scan = BruteForceEnumerator::new(ctx, label.as_str(), template.template());
            let on_toxic = |f: &Finding| {
                println!("TOXIC {} -> {}", hex::encode(&f.part), f.result);
            };
            let report = match (length, seed, distance) {
                (Some(length), _, _) => {
                    tracing::info!(space = %CrossProduct::space(*length), "enumerating cross product");
                    scan.scan(CrossProduct::new(*length), on_toxic)?
                }
                (None, Some(seed), Some(distance)) => {
                    let seed = std::fs::read(seed)
                        .with_context(|| format!("failed to read seed {seed:?}"))?;
                    scan.scan(edit_variants(&seed, *distance)?, on_toxic)?
                }
                _ => anyhow::bail!("brute needs either --length or --seed with --distance"),
            };
            print_scan(&report);
        }
        Command::TwoByte {
            packet_size,
            first,
            last,
        } => {
            let report = two_byte_sweep(ctx, *packet_size, *first, *last, |f: &Finding| {
                println!("TOXIC {} -> {}", hex::encode(&f.part), f.result);
            })?;
            print_scan(&report);
        }
        Command::Histogram { byte, start, end } => {
            let histogram = sweep::length_histogram(ctx, *byte, *start..=*end)?;
            print_histogram(&histogram);
        }
        Command::Embedded {
            toxic,
            sizes,
            filler,
        } => {
            let toxic = std::fs::read(toxic)
                .with_context(|| format!("failed to read candidate {toxic:?}"))?;
            let sizes = if sizes.is_empty() {
                sweep::DEFAULT_PACKET_SIZES.to_vec()
            } else {
                sizes.clone()
            };
            let results = sweep::embedded_scan(ctx, &toxic, &sizes, *filler)?;
            print_embedded(&results);
        }
        Command::Simplify { pattern, rounds } => {
            let pattern = std::fs::read(pattern)
                .with_context(|| format!("failed to read pattern {pattern:?}"))?;
            match simplify::simplify(ctx, &pattern, *rounds)? {
                Some(outcome) => print_simplification(&outcome),
                None => println!("The pattern is not toxic; nothing to simplify."),
            }
        }
        Command::Climb {
            seeds,
            label,
            iterations,
            bit_flips,
            template,
        } => {
            let seeds: Vec<Vec<u8>> = load_seeds(seeds)?
                .iter()
                .map(|c| c.as_bytes().to_vec())
                .collect();
            anyhow::ensure!(!seeds.is_empty(), "no non-empty seed files found");
            let initial = seeds.len();
            let report = MutationHillClimber::new(ctx, label.as_str(), template.template())
                .with_mutators(mutators(config.search.samples_per_position, *bit_flips))
                .with_seed(config.search.rng_seed)
                .with_max_iterations(iterations.unwrap_or(config.search.hill_climb_iterations))
                .run(seeds)?;
            println!(
                "{} iterations, {} neighbours tested, {} new toxic variants, {} unconfirmed",
                report.iterations,
                report.tested,
                report.discovered(initial).len(),
                report.unconfirmed
            );
            for part in report.discovered(initial) {
                println!("  {}", hex::encode(part));
            }
        }
        Command::Adaptive {
            sample,
            pattern_len,
            steps,
            iterations,
            bit_flips,
        } => {
            let sample = std::fs::read(sample)
                .with_context(|| format!("failed to read sample {sample:?}"))?;
            let mut plan = AdaptivePlan::all(pattern_len.unwrap_or(config.search.pattern_len));
            if !steps.is_empty() {
                plan.steps = steps.iter().copied().map(AdaptiveStep::from).collect();
            }
            plan.iterations = iterations.unwrap_or(config.search.hill_climb_iterations);
            plan.samples_per_position = config.search.samples_per_position;
            plan.bit_flips = *bit_flips;
            plan.rng_seed = config.search.rng_seed;
            let report = AdaptiveOrchestrator::new(ctx, plan).run(&sample)?;
            print_adaptive(&report);
        }
        Command::Report { .. } | Command::CacheInvalidate => {}
    }
    Ok(())
}

/// Validates `distance` against the seed before sizing the search space.
fn edit_variants(seed: &[u8], distance: usize) -> anyhow::Result<EditVariants> {
    let variants = EditVariants::new(seed, distance)?;
    tracing::info!(
        space = %EditVariants::space(seed.len(), distance),
        "enumerating edit variants"
    );
    Ok(variants)
}

fn mutators(samples_per_position: usize, bit_flips: bool) -> Vec<Box<dyn Mutator>> {
    let mut mutators: Vec<Box<dyn Mutator>> =
        vec![Box::new(SampledSubstitutionMutator::new(samples_per_position))];
    if bit_flips {
        mutators.push(Box::new(BitFlipMutator));
    }
    mutators
}

fn read_layout(sample: &Path, pattern_len: usize) -> anyhow::Result<PatternLayout> {
    let bytes =
        std::fs::read(sample).with_context(|| format!("failed to read sample {sample:?}"))?;
    let layout = PatternLayout::analyze(&bytes, pattern_len)?;
    println!(
        "Layout: pattern {} x {} + {}-byte suffix",
        hex::encode(&layout.pattern),
        layout.repeats,
        layout.suffix.len()
    );
    Ok(layout)
}

fn print_length(what: &str, outcome: Option<&LengthOutcome>) {
    match outcome {
        Some(outcome) => println!(
            "Shortest toxic {what} length: {} ({} bytes on the wire, confirmed {})\n{}",
            outcome.length,
            outcome.candidate.len(),
            outcome.confirmation,
            outcome.candidate.to_hex()
        ),
        None => println!("No toxic {what} length found in range."),
    }
}

fn print_scan(report: &ScanReport) {
    println!(
        "Tested {} candidates: {} TOXIC, {} MAYBE, {} hits did not confirm",
        report.tested,
        report.toxic.len(),
        report.maybe,
        report.unconfirmed
    );
}

fn print_histogram(histogram: &LengthHistogram) {
    for (length, result) in &histogram.rows {
        println!("  0x{:02x} x {length:<5} {result}", histogram.byte);
    }
    for classification in [Classification::Toxic, Classification::Maybe, Classification::Safe] {
        if let Some((lo, hi)) = histogram.span(classification) {
            println!("{classification:?}: lengths {lo}..={hi}");
        }
    }
    if let Some((safe, toxic)) = histogram.transition() {
        println!("Largest SAFE length {safe}, smallest TOXIC length {toxic}");
    }
}

fn print_embedded(results: &[EmbeddedResult]) {
    for r in results {
        println!("  size {:<5} offset {:<5} {}", r.packet_size, r.offset, r.result);
    }
    let toxic = results.iter().filter(|r| r.result.is_toxic()).count();
    println!("{toxic} of {} placements TOXIC", results.len());
}

fn print_simplification(outcome: &Simplification) {
    for (replaced, with) in &outcome.steps {
        println!("  0x{replaced:02x} -> 0x{with:02x}");
    }
    println!(
        "Simplified after {} candidates ({} replacements, confirmed {}):\n{}\n{}",
        outcome.tested,
        outcome.steps.len(),
        outcome.confirmation,
        outcome.original.to_hex(),
        outcome.simplified.to_hex()
    );
}

fn print_adaptive(report: &AdaptiveReport) {
    if let Some(outcome) = &report.suffix_length {
        print_length("suffix", Some(outcome));
    }
    if let Some(climb) = &report.suffix_variants {
        println!("Suffix variants ({}):", climb.frontier.len());
        for part in &climb.frontier {
            println!("  {}", hex::encode(part));
        }
    }
    if let Some(outcome) = &report.pattern_length {
        print_length("pattern", Some(outcome));
    }
    if let Some(climb) = &report.pattern_variants {
        println!("Pattern variants ({}):", climb.frontier.len());
        for part in &climb.frontier {
            println!("  {}", hex::encode(part));
        }
    }
}

fn report(config: &ToxicframeConfig, limit: usize) -> anyhow::Result<()> {
    let store = ResultStore::open(&config.store.path)
        .with_context(|| format!("failed to open result store {:?}", config.store.path))?;
    let summary = store.summary()?;
    println!(
        "{:?}: {} records ({} TOXIC, {} SAFE, {} MAYBE)",
        config.store.path,
        summary.total(),
        summary.toxic,
        summary.safe,
        summary.maybe
    );
    if config.store.safe_cache {
        let stats = SafeCache::open(&config.store.path, config.store.cache_epoch)?.stats()?;
        println!(
            "SAFE cache (epoch {}): {} durable entries",
            config.store.cache_epoch, stats.durable
        );
    }

    for kind in [RecordKind::Range, RecordKind::Pattern] {
        let toxic = store.records(kind, Some(Classification::Toxic))?;
        if toxic.is_empty() {
            continue;
        }
        println!("\nTOXIC {kind:?} records ({}):", toxic.len());
        for record in toxic.iter().take(limit) {
            print_record(record);
        }
        if toxic.len() > limit {
            println!("  ... {} more", toxic.len() - limit);
        }
    }

    if let Some(smallest) = store.smallest_toxic()? {
        println!("\nSmallest TOXIC candidate:");
        print_record(&smallest);
    }
    Ok(())
}

fn print_record(record: &TestRecord) {
    println!(
        "  {:<40} {:>5} bytes  {}  {}",
        record.key.to_string(),
        record.length,
        record.result,
        record.description.as_deref().unwrap_or("")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_override_config() {
        let cli = Cli::parse_from([
            "toxicframe",
            "report",
            "--trials",
            "4",
            "--batch-size",
            "32",
            "--batch-trials",
            "2",
            "--no-cache",
            "--db",
            "/tmp/other.db",
        ]);
        let mut config = ToxicframeConfig::default();
        apply_overrides(&cli, &mut config);
        assert_eq!(config.trials.count, 4);
        assert_eq!(config.batch.size, 32);
        assert_eq!(config.trials.batch, 2);
        assert!(!config.store.safe_cache);
        assert_eq!(config.store.path, PathBuf::from("/tmp/other.db"));
    }

    #[test]
    fn adaptive_steps_parse_comma_separated() {
        let cli = Cli::parse_from([
            "toxicframe",
            "adaptive",
            "sample.bin",
            "--steps",
            "suffix-length,pattern-content",
        ]);
        let Command::Adaptive { steps, .. } = cli.command else {
            panic!("expected adaptive");
        };
        let steps: Vec<AdaptiveStep> = steps.into_iter().map(AdaptiveStep::from).collect();
        assert_eq!(
            steps,
            vec![AdaptiveStep::SuffixLength, AdaptiveStep::PatternContent]
        );
    }

    #[test]
    fn byte_and_hex_arguments_parse() {
        assert_eq!(parse_byte("0x4a"), Ok(0x4a));
        assert_eq!(parse_byte("74"), Ok(74));
        assert!(parse_byte("300").is_err());
        assert_eq!(parse_hex("0xdead"), Ok(HexBytes(vec![0xde, 0xad])));
        assert!(parse_hex("xyz").is_err());
    }

    #[test]
    fn brute_rejects_length_with_seed() {
        let parsed = Cli::try_parse_from([
            "toxicframe",
            "brute",
            "--length",
            "2",
            "--seed",
            "s.bin",
            "--distance",
            "1",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn edit_distance_past_the_seed_is_rejected() {
        assert!(edit_variants(b"abc", 4).is_err());
        assert!(edit_variants(b"abc", 0).is_err());
        assert!(edit_variants(b"abc", 3).is_ok());
    }

    #[test]
    fn sweep_subcommands_parse() {
        let cli = Cli::parse_from(["toxicframe", "two-byte", "--first", "0x4a00", "--last", "19200"]);
        let Command::TwoByte {
            packet_size,
            first,
            last,
        } = cli.command
        else {
            panic!("expected two-byte");
        };
        assert_eq!((packet_size, first, last), (200, 0x4a00, 19200));

        let cli = Cli::parse_from(["toxicframe", "embedded", "t.bin", "--sizes", "200,794"]);
        let Command::Embedded { sizes, filler, .. } = cli.command else {
            panic!("expected embedded");
        };
        assert_eq!(sizes, vec![200, 794]);
        assert_eq!(filler, 0x22);

        let cli = Cli::parse_from(["toxicframe", "histogram", "0x4a"]);
        assert!(matches!(
            cli.command,
            Command::Histogram {
                byte: 0x4a,
                start: 100,
                end: 130
            }
        ));

        let cli = Cli::parse_from(["toxicframe", "simplify", "p.bin"]);
        assert!(matches!(cli.command, Command::Simplify { rounds: 20, .. }));
        assert_eq!(parse_u16("0xffff"), Ok(0xffff));
        assert!(parse_u16("70000").is_err());
    }

    #[test]
    fn report_reads_store_without_oracle() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ToxicframeConfig::default();
        config.store.path = dir.path().join("results.db");
        report(&config, 10).unwrap();
    }
}
