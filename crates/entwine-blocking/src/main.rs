//! entwine-blocking CLI - Parallel blocking for entity resolution.

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use entwine_blocking::io::{
    load_collection, write_neighbor_pairs, write_pairs, DEFAULT_ID_FIELD,
};
use entwine_blocking::tokenizer::{
    DEFAULT_COMBINATION_THRESHOLD, DEFAULT_MAX_QGRAMS, DEFAULT_QGRAM_SIZE, DEFAULT_SUFFIX_LENGTH,
};
use entwine_blocking::{
    num_cpus, BlockBuilder, BlockingConfig, CandidateGraph, CardinalityEdgePruner, EntityMatcher,
    MatchStats, MatchingConfig, NeighborMap, PruneConfig, PruneStats, SimilarityMetric,
    TokenizerStrategy, WeightingScheme,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// JSON output for blocking results.
#[derive(Serialize)]
struct JsonOutput {
    input: String,
    input2: Option<String>,
    output: Option<String>,
    mode: String,
    tokenizer: TokenizerStrategy,
    num_entities: usize,
    num_blocks: usize,
    total_cardinality: u64,
    num_partitions: usize,
    num_workers: usize,
    elapsed_secs: f64,
    throughput_records_s: f64,
    pruning: Option<PruneStats>,
    matching: Option<MatchStats>,
}

/// Blocking key strategy.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum TokenizerArg {
    /// Whole words
    Standard,
    /// Character q-grams per word
    Qgrams,
    /// Word suffixes
    SuffixArrays,
    /// Whole words plus all substrings
    ExtendedSuffixArrays,
    /// Concatenated q-gram combinations
    ExtendedQgrams,
}

/// Candidate pair weighting scheme.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum WeightingArg {
    /// Number of shared blocks
    CommonBlocks,
    /// Shared blocks over the block union
    Jaccard,
}

/// Similarity metric for matching.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum MetricArg {
    /// Twice the word overlap over the summed sizes
    Dice,
    /// Word overlap over the union
    Jaccard,
}

/// Parallel blocking for entity resolution.
///
/// Groups records into blocks by shared keys, prunes the candidate pairs
/// down to the heaviest co-occurrences, and optionally scores the survivors
/// into a match graph. One input file runs Dirty resolution; adding a second
/// with --input2 runs Clean-Clean resolution across the two collections.
#[derive(Parser, Debug)]
#[command(name = "entwine-blocking")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input file path (JSONL, one record per line).
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Second input file for Clean-Clean resolution.
    #[arg(long, value_name = "INPUT2")]
    input2: Option<PathBuf>,

    /// Field holding each record's identifier.
    #[arg(long, default_value = DEFAULT_ID_FIELD)]
    id_field: String,

    /// Comma-separated attributes to load from the input (all by default).
    #[arg(long, value_delimiter = ',')]
    attributes: Option<Vec<String>>,

    /// Comma-separated attributes to load from the second input.
    #[arg(long, value_delimiter = ',')]
    attributes2: Option<Vec<String>>,

    /// Blocking key strategy.
    #[arg(short = 't', long, value_enum, default_value = "standard")]
    tokenizer: TokenizerArg,

    /// Q-gram length for the qgrams and extended-qgrams strategies.
    #[arg(long, default_value_t = DEFAULT_QGRAM_SIZE)]
    qgram_size: usize,

    /// Minimum suffix length for the suffix-array strategies.
    #[arg(long, default_value_t = DEFAULT_SUFFIX_LENGTH)]
    suffix_length: usize,

    /// Q-grams kept per word before combining (extended-qgrams).
    #[arg(long, default_value_t = DEFAULT_MAX_QGRAMS)]
    max_qgrams: usize,

    /// Fraction of a word's q-grams a combination must cover (extended-qgrams).
    #[arg(long, default_value_t = DEFAULT_COMBINATION_THRESHOLD)]
    combination_threshold: f64,

    /// Worker threads (defaults to the available parallelism).
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Partitions to tile the work into (defaults to the worker count).
    #[arg(long)]
    partitions: Option<usize>,

    /// Prune candidate pairs by shared-block weight.
    #[arg(long)]
    prune: bool,

    /// Pairs to keep when pruning (defaults to half the comparisons).
    #[arg(long)]
    top_k: Option<usize>,

    /// Weighting scheme for pruning.
    #[arg(long, value_enum, default_value = "common-blocks")]
    weighting: WeightingArg,

    /// Pairs lighter than this never survive pruning.
    #[arg(long, default_value = "0.0")]
    min_weight: f64,

    /// Score surviving pairs into a match graph (implies --prune).
    #[arg(long = "match")]
    match_pairs: bool,

    /// Similarity metric for matching.
    #[arg(long, value_enum, default_value = "dice")]
    metric: MetricArg,

    /// Similarity scores below this are dropped (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    similarity_threshold: f64,

    /// Output file for the surviving pairs (JSONL).
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Output results as JSON.
    #[arg(long)]
    json: bool,

    /// Show progress spinner.
    #[arg(long)]
    progress: bool,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Create a spinner for indeterminate progress.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn to_strategy(args: &Cli) -> TokenizerStrategy {
    match args.tokenizer {
        TokenizerArg::Standard => TokenizerStrategy::Standard,
        TokenizerArg::Qgrams => TokenizerStrategy::QGrams { q: args.qgram_size },
        TokenizerArg::SuffixArrays => {
            TokenizerStrategy::SuffixArrays { min_length: args.suffix_length }
        }
        TokenizerArg::ExtendedSuffixArrays => {
            TokenizerStrategy::ExtendedSuffixArrays { min_length: args.suffix_length }
        }
        TokenizerArg::ExtendedQgrams => TokenizerStrategy::ExtendedQGrams {
            q: args.qgram_size,
            max_qgrams: args.max_qgrams,
            threshold: args.combination_threshold,
        },
    }
}

fn to_scheme(args: &Cli) -> WeightingScheme {
    match args.weighting {
        WeightingArg::CommonBlocks => WeightingScheme::CommonBlocks,
        WeightingArg::Jaccard => WeightingScheme::JaccardBlocks,
    }
}

fn to_metric(args: &Cli) -> SimilarityMetric {
    match args.metric {
        MetricArg::Dice => SimilarityMetric::Dice,
        MetricArg::Jaccard => SimilarityMetric::Jaccard,
    }
}

fn run(args: &Cli, input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let prune = args.prune || args.match_pairs;
    let workers = args.workers.unwrap_or_else(num_cpus);

    let pb = if args.progress && !args.json {
        Some(create_spinner("Reading input files..."))
    } else {
        None
    };

    if args.verbose && !args.json {
        eprintln!("Configuration:");
        eprintln!("  Input: {}", input.display());
        if let Some(ref input2) = args.input2 {
            eprintln!("  Input 2: {}", input2.display());
        }
        if let Some(ref output) = args.output {
            eprintln!("  Output: {}", output.display());
        }
        eprintln!("  Id field: {}", args.id_field);
        eprintln!("  Tokenizer: {:?}", to_strategy(args));
        eprintln!("  Workers: {workers}");
        if let Some(partitions) = args.partitions {
            eprintln!("  Partitions: {partitions}");
        }
        if prune {
            eprintln!("  Weighting: {:?}", to_scheme(args));
            if let Some(top_k) = args.top_k {
                eprintln!("  Top-k: {top_k}");
            }
            eprintln!("  Minimum weight: {}", args.min_weight);
        }
        if args.match_pairs {
            eprintln!("  Metric: {:?}", to_metric(args));
            eprintln!("  Similarity threshold: {}", args.similarity_threshold);
        }
        eprintln!();
    }

    let collection = Arc::new(load_collection(
        input,
        args.input2.as_deref(),
        &args.id_field,
        args.attributes.as_deref(),
        args.attributes2.as_deref(),
    )?);

    if let Some(ref pb) = pb {
        pb.set_message(format!("Read {} records", collection.num_entities()));
    }
    if args.verbose && !args.json {
        eprintln!("Read {} records ({})", collection.num_entities(), collection.kind());
    }

    let mut config = BlockingConfig::default()
        .with_tokenizer(to_strategy(args))
        .with_workers(workers);
    if let Some(partitions) = args.partitions {
        config = config.with_partitions(partitions);
    }
    let builder = BlockBuilder::new(config)?;

    if let Some(ref pb) = pb {
        pb.set_message("Building blocks...");
    }
    let (index, build_stats) = builder.build(Arc::clone(&collection))?;

    let mut prune_outcome: Option<(NeighborMap, PruneStats)> = None;
    if prune {
        let mut prune_config = PruneConfig::default()
            .with_scheme(to_scheme(args))
            .with_minimum_weight(args.min_weight)
            .with_workers(workers);
        if let Some(partitions) = args.partitions {
            prune_config = prune_config.with_partitions(partitions);
        }
        if let Some(capacity) = args.top_k {
            prune_config = prune_config.with_capacity(capacity);
        }
        let pruner = CardinalityEdgePruner::new(prune_config)?;
        if let Some(ref pb) = pb {
            pb.set_message("Pruning candidate pairs...");
        }
        prune_outcome = Some(pruner.prune(&collection, &index)?);
    }

    let mut match_outcome: Option<(CandidateGraph, MatchStats)> = None;
    if args.match_pairs {
        if let Some((ref neighbors, _)) = prune_outcome {
            let mut matching_config = MatchingConfig::default()
                .with_metric(to_metric(args))
                .with_threshold(args.similarity_threshold)
                .with_workers(workers);
            if let Some(partitions) = args.partitions {
                matching_config = matching_config.with_partitions(partitions);
            }
            let matcher = EntityMatcher::new(matching_config)?;
            if let Some(ref pb) = pb {
                pb.set_message("Scoring candidate pairs...");
            }
            match_outcome = Some(matcher.match_candidates(Arc::clone(&collection), neighbors)?);
        }
    }

    if let Some(ref output_path) = args.output {
        if let Some((ref graph, _)) = match_outcome {
            write_pairs(output_path, graph)?;
        } else if let Some((ref neighbors, _)) = prune_outcome {
            write_neighbor_pairs(output_path, neighbors)?;
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let elapsed = start.elapsed();
    let throughput = build_stats.num_entities as f64 / elapsed.as_secs_f64();

    if args.json {
        let output = JsonOutput {
            input: input.display().to_string(),
            input2: args.input2.as_ref().map(|p| p.display().to_string()),
            output: args.output.as_ref().map(|p| p.display().to_string()),
            mode: collection.kind().to_string(),
            tokenizer: to_strategy(args),
            num_entities: build_stats.num_entities,
            num_blocks: build_stats.num_blocks,
            total_cardinality: build_stats.total_cardinality,
            num_partitions: build_stats.num_partitions,
            num_workers: workers,
            elapsed_secs: elapsed.as_secs_f64(),
            throughput_records_s: throughput,
            pruning: prune_outcome.map(|(_, stats)| stats),
            matching: match_outcome.map(|(_, stats)| stats),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        eprintln!();
        eprintln!("Blocking Results:");
        eprintln!("  Mode:               {}", collection.kind());
        eprintln!("  Records:            {}", build_stats.num_entities);
        eprintln!("  Blocks:             {}", build_stats.num_blocks);
        eprintln!("  Comparisons:        {}", build_stats.total_cardinality);
        eprintln!("  Partitions:         {}", build_stats.num_partitions);
        eprintln!("  Workers:            {workers}");
        if let Some((_, stats)) = &prune_outcome {
            eprintln!();
            eprintln!("Pruning Results:");
            eprintln!("  Capacity:           {}", stats.capacity);
            eprintln!("  Pairs kept:         {}", stats.kept);
        }
        if let Some((_, stats)) = &match_outcome {
            eprintln!();
            eprintln!("Matching Results:");
            eprintln!("  Candidates scored:  {}", stats.num_candidates);
            eprintln!("  Matches:            {}", stats.num_edges);
            eprintln!("  Matched entities:   {}", stats.num_nodes);
        }
        if let Some(ref output_path) = args.output {
            eprintln!();
            eprintln!("Wrote pairs to {}", output_path.display());
        }
        eprintln!();
        eprintln!("Total time: {:.3}s", elapsed.as_secs_f64());
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    // Handle completions subcommand
    if let Some(Commands::Completions { shell }) = args.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "entwine-blocking", &mut io::stdout());
        return Ok(());
    }

    // Require input file for blocking operations
    let input = args.input.clone().ok_or("Input file is required")?;

    // Validate arguments
    if args.qgram_size == 0 {
        eprintln!("Error: qgram size must be > 0");
        std::process::exit(1);
    }

    if args.suffix_length == 0 {
        eprintln!("Error: suffix length must be > 0");
        std::process::exit(1);
    }

    if args.max_qgrams == 0 {
        eprintln!("Error: max qgrams must be > 0");
        std::process::exit(1);
    }

    if args.combination_threshold <= 0.0 || args.combination_threshold > 1.0 {
        eprintln!("Error: combination threshold must be between 0.0 (exclusive) and 1.0");
        std::process::exit(1);
    }

    if args.similarity_threshold < 0.0 || args.similarity_threshold > 1.0 {
        eprintln!("Error: similarity threshold must be between 0.0 and 1.0");
        std::process::exit(1);
    }

    if !args.min_weight.is_finite() {
        eprintln!("Error: minimum weight must be finite");
        std::process::exit(1);
    }

    if args.workers == Some(0) {
        eprintln!("Error: workers must be > 0");
        std::process::exit(1);
    }

    if args.partitions == Some(0) {
        eprintln!("Error: partitions must be > 0");
        std::process::exit(1);
    }

    if args.top_k == Some(0) {
        eprintln!("Error: top-k must be > 0");
        std::process::exit(1);
    }

    if args.output.is_some() && !args.prune && !args.match_pairs {
        eprintln!("Error: output file requires --prune or --match");
        std::process::exit(1);
    }

    run(&args, &input)
}
