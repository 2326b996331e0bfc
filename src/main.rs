use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ankitag::annotator::{DEFAULT_TAGS_INSTRUCTIONS, LlmAnnotatorBuilder};
use ankitag::batcher::{BatchFilter, DEFAULT_BATCH_SIZE};
use ankitag::ollama::{DEFAULT_TIMEOUT, OllamaClient, OllamaClientBuilder};
use ankitag::pipeline::DEFAULT_SENTINEL_TAG;
use ankitag::store::{self, StoreError};
use ankitag::{
    Deck, FieldSchema, IncrementalWriter, MalformedPolicy, PipelineBuilder, PipelineConfig,
    PipelineError,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// ankitag - tag exported flashcards with an LLM, batch by batch
#[derive(Parser)]
#[command(name = "ankitag")]
#[command(about = "Add LLM-suggested tags to a tab-separated flashcard export")]
#[command(
    long_about = "Add LLM-suggested tags to a tab-separated flashcard export.\n\n\
New rows are APPENDED to the output file if it already exists. Back up your collection \
before importing the result, and select \"Existing notes: Update\" in the import options."
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Tag cards from an export and write them to an output file
    Tag(TagCommand),
    /// Inspect an export and check that the annotation service is reachable
    Check(CheckCommand),
}

/// Field positions (0-based) within each row
#[derive(Args)]
struct SchemaArgs {
    /// Column holding the card front
    #[arg(long, value_name = "INDEX", default_value_t = FieldSchema::default().front)]
    front_field: usize,

    /// Column holding the card back
    #[arg(long, value_name = "INDEX", default_value_t = FieldSchema::default().back)]
    back_field: usize,

    /// Column holding the space-separated tags
    #[arg(long, value_name = "INDEX", default_value_t = FieldSchema::default().tags)]
    tags_field: usize,
}

impl SchemaArgs {
    fn schema(&self) -> FieldSchema {
        FieldSchema::default().with_card_fields(self.front_field, self.back_field, self.tags_field)
    }
}

/// Tag cards
#[derive(Parser)]
struct TagCommand {
    /// Exported deck to read
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// File to append tagged cards to (created if missing)
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Skip the first N cards of the input (use to resume an interrupted run)
    #[arg(short = 's', long, value_name = "N", default_value_t = 0)]
    start_from_card: usize,

    /// Also send cards that already have tags
    #[arg(long)]
    include_tagged: bool,

    /// Tag that does not count as "already tagged" (repeatable)
    #[arg(long = "ignore-tag", value_name = "TAG", default_values_t = vec!["leech".to_string()])]
    ignore_tags: Vec<String>,

    /// Cards per request
    #[arg(short, long, value_name = "N", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Tag applied to every card of a batch whose reply did not match it
    #[arg(long, value_name = "TAG", default_value = DEFAULT_SENTINEL_TAG)]
    sentinel_tag: String,

    /// Model name (defaults to OLLAMA_MODEL)
    #[arg(short, long, value_name = "MODEL")]
    model: Option<String>,

    /// Ollama base URL (defaults to OLLAMA_HOST or http://localhost:11434)
    #[arg(long, value_name = "URL")]
    host: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Instructions describing the allowed tag vocabulary
    #[arg(long, value_name = "TEXT", default_value = DEFAULT_TAGS_INSTRUCTIONS)]
    tags_instructions: String,

    /// Abort instead of skipping rows with too few fields
    #[arg(long)]
    strict: bool,

    #[command(flatten)]
    schema: SchemaArgs,
}

/// Inspect an export
#[derive(Parser)]
struct CheckCommand {
    /// Exported deck to read
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Cards per request, used to report the batch count
    #[arg(short, long, value_name = "N", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Tag that does not count as "already tagged" (repeatable)
    #[arg(long = "ignore-tag", value_name = "TAG", default_values_t = vec!["leech".to_string()])]
    ignore_tags: Vec<String>,

    /// Ollama base URL (defaults to OLLAMA_HOST or http://localhost:11434)
    #[arg(long, value_name = "URL")]
    host: Option<String>,

    #[command(flatten)]
    schema: SchemaArgs,
}

fn main() {
    // A missing .env file is fine; the environment may already be set up
    let _ = dotenvy::dotenv();
    init_logging();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Tag(cmd) => handle_tag(cmd),
        Commands::Check(cmd) => handle_check(cmd),
    };

    if let Err(e) = result {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors are bad arguments, a missing input file, or malformed input
/// under `--strict`. Everything else (service and I/O failures) is internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    if error.to_string().contains("cannot be") {
        return true;
    }

    error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<StoreError>(),
            Some(StoreError::MalformedRecord { .. } | StoreError::StrayCarriageReturn { .. })
        ) || cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
    })
}

fn malformed_policy(strict: bool) -> MalformedPolicy {
    if strict {
        MalformedPolicy::Abort
    } else {
        MalformedPolicy::Skip
    }
}

fn build_client(host: Option<&str>, model: Option<&str>, timeout: Duration) -> Result<OllamaClient> {
    let mut builder = OllamaClientBuilder::new().timeout(timeout);
    if let Some(host) = host {
        builder = builder.base_url(host);
    }
    if let Some(model) = model {
        builder = builder.model(model);
    }
    builder.build().context("Failed to configure Ollama client")
}

/// Returns true if both paths name the same existing file.
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Handles the tag command by running the pipeline over the input deck.
fn handle_tag(cmd: &TagCommand) -> Result<()> {
    if same_file(&cmd.input, &cmd.output) {
        anyhow::bail!("Input and output cannot be the same file");
    }
    if cmd.batch_size == 0 {
        anyhow::bail!("Batch size cannot be zero");
    }

    let schema = cmd.schema.schema();
    let deck = store::load(&cmd.input, &schema)
        .with_context(|| format!("Failed to read input file: {}", cmd.input.display()))?
        .apply_policy(malformed_policy(cmd.strict))
        .context("Input file contains malformed rows")?;

    tracing::info!(
        "Loaded {} cards and {} header lines from {}",
        deck.records.len(),
        deck.comments.len(),
        cmd.input.display()
    );

    let client = build_client(
        cmd.host.as_deref(),
        cmd.model.as_deref(),
        Duration::from_secs(cmd.timeout_secs),
    )?;
    if client.model().is_empty() {
        anyhow::bail!("Model name cannot be empty; pass --model or set OLLAMA_MODEL");
    }

    let annotator = LlmAnnotatorBuilder::new()
        .model(client.model())
        .tags_instructions(cmd.tags_instructions.as_str())
        .client(Arc::new(client))
        .build();

    let config = PipelineConfig {
        schema,
        filter: BatchFilter {
            start_from: cmd.start_from_card,
            only_unprocessed: !cmd.include_tagged,
            ignored_tags: cmd.ignore_tags.clone(),
        },
        batch_size: cmd.batch_size,
        sentinel_tag: cmd.sentinel_tag.clone(),
        ..PipelineConfig::default()
    };
    let pipeline = PipelineBuilder::new()
        .annotator(Arc::new(annotator))
        .config(config)
        .build()?;

    let mut writer = IncrementalWriter::open(&cmd.output, &deck.comments)
        .with_context(|| format!("Failed to open output file: {}", cmd.output.display()))?;

    match pipeline.run(deck.records, &mut writer) {
        Ok(summary) => {
            println!(
                "Tagged {} cards in {} batches -> {}",
                summary.records_written,
                summary.batches,
                writer.path().display()
            );
            if summary.fallback_batches > 0 {
                println!(
                    "{} batches got the '{}' tag because the reply did not match; \
                     a smaller --batch-size usually helps",
                    summary.fallback_batches,
                    pipeline.config().sentinel_tag
                );
            }
            if summary.untagged_records > 0 {
                println!("{} cards received no new tags", summary.untagged_records);
            }
            Ok(())
        }
        Err(PipelineError::Annotation {
            resume_from,
            source,
        }) => Err(anyhow::Error::new(source).context(format!(
            "Stopped at card {resume_from}; {} rows are saved in {}. \
             Rerun with --start-from-card {resume_from} to continue",
            writer.written_rows(),
            writer.path().display()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Counts reported by the check command.
#[derive(Debug, PartialEq, Eq)]
struct DeckStats {
    header_lines: usize,
    cards: usize,
    malformed_rows: usize,
    untagged_cards: usize,
    batches: usize,
}

fn deck_stats(
    deck: &Deck,
    schema: &FieldSchema,
    ignore_tags: &[String],
    batch_size: usize,
) -> DeckStats {
    let untagged_cards = deck
        .records
        .iter()
        .filter(|record| record.is_unprocessed(schema, ignore_tags))
        .count();

    DeckStats {
        header_lines: deck.comments.len(),
        cards: deck.records.len(),
        malformed_rows: deck.rejected.len(),
        untagged_cards,
        batches: untagged_cards.div_ceil(batch_size.max(1)),
    }
}

/// Handles the check command by reporting deck statistics and service health.
fn handle_check(cmd: &CheckCommand) -> Result<()> {
    let schema = cmd.schema.schema();
    let deck = store::load(&cmd.input, &schema)
        .with_context(|| format!("Failed to read input file: {}", cmd.input.display()))?;
    let stats = deck_stats(&deck, &schema, &cmd.ignore_tags, cmd.batch_size);

    println!("Input: {}", cmd.input.display());
    println!("  Header lines:   {}", stats.header_lines);
    println!("  Cards:          {}", stats.cards);
    println!("  Malformed rows: {}", stats.malformed_rows);
    for rejected in &deck.rejected {
        println!("    {rejected}");
    }
    println!("  Untagged cards: {}", stats.untagged_cards);
    println!(
        "  Batches:        {} (batch size {})",
        stats.batches, cmd.batch_size
    );

    let client = build_client(cmd.host.as_deref(), None, DEFAULT_TIMEOUT)?;
    println!("Ollama: {}", client.base_url());
    match client.list_models() {
        Ok(models) if models.is_empty() => println!("  Reachable, but no models installed"),
        Ok(models) => println!("  Reachable, models: {}", models.join(", ")),
        Err(e) => println!("  Unreachable: {e}"),
    }

    Ok(())
}
