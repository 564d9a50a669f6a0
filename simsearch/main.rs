use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use simsearch::{
    annotate, CorpusEntry, CorpusProvider, CorpusSearchBuilder, DirectoryCorpus, EngineConfig, ExtractorConfig,
    FailurePolicy, ImagePreprocessing, Manifest, ManifestCorpus, SearchOutcome, UrlFetcher,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status when the search completes without a similar entry
const EXIT_NO_MATCH: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about = "Find the most visually similar image of a corpus")]
struct Cli {
    /// Engine configuration (TOML); flags override its values
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search the corpus for the image most similar to QUERY
    Find {
        query: PathBuf,
        /// Corpus manifest (.toml or .json)
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,
        #[arg(long)]
        max_dimension: Option<u32>,
        #[arg(long)]
        threads: Option<usize>,
        /// Per-image fetch timeout in milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
        /// Drop entries that fail instead of aborting
        #[arg(long)]
        skip_failed: bool,
        /// Also bound corpus images by the max dimension
        #[arg(long)]
        resize_corpus: bool,
        /// Print the score of every entry
        #[arg(long)]
        all: bool,
        /// Write the query with its confidently matched keypoints marked
        #[arg(long, value_name = "PNG")]
        annotate: Option<PathBuf>,
    },
    /// Add the images of a directory to a manifest, skipping known URLs
    Index {
        dir: PathBuf,
        #[arg(long, value_name = "FILE")]
        manifest: PathBuf,
        /// Publish entries under this URL prefix instead of local paths
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Print one corpus entry
    Show {
        id: u64,
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,
    },
    /// Print an engine configuration
    Config {
        #[arg(long, value_enum, default_value_t = Preset::Balanced)]
        preset: Preset,
        /// Write to a file instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Preset {
    Fast,
    Balanced,
    Precision,
}

/// Entry as reported to callers; missing attribution is ""
#[derive(Debug, Serialize)]
struct EntryRecord<'a> {
    id: u64,
    name: &'a str,
    attribution: &'a str,
    image_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<usize>,
}

impl<'a> EntryRecord<'a> {
    fn new(entry: &'a CorpusEntry, score: Option<usize>) -> Self {
        Self {
            id: entry.id,
            name: &entry.name,
            attribution: entry.attribution_or_empty(),
            image_url: &entry.image_url,
            score,
        }
    }
}

/// Directory that relative image paths of a manifest are resolved against
fn manifest_dir(manifest: &Path) -> std::io::Result<PathBuf> {
    match manifest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize(),
        _ => std::env::current_dir(),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut engine = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Find {
            query,
            corpus,
            max_dimension,
            threads,
            timeout_ms,
            skip_failed,
            resize_corpus,
            all,
            annotate: annotate_path,
        } => {
            let search_cfg = &mut engine.search;
            if let Some(max) = max_dimension {
                search_cfg.max_dimension = max;
            }
            if threads.is_some() {
                search_cfg.threads = threads;
            }
            if let Some(ms) = timeout_ms {
                search_cfg.fetch_timeout_ms = ms;
            }
            if skip_failed {
                search_cfg.failure_policy = FailurePolicy::SkipFailed;
            }
            search_cfg.resize_corpus |= resize_corpus;
            engine.validate()?;

            let entries = ManifestCorpus::new(&corpus).entries()?;
            let fetcher = UrlFetcher::new(engine.search.fetch_timeout())?.with_file_root(manifest_dir(&corpus)?);
            let search = CorpusSearchBuilder::from_engine_config(&engine)
                .fetcher(Arc::new(fetcher))
                .build()?;
            let raster = ImagePreprocessing::decode(&std::fs::read(&query)?)?;

            let report = search.search(&raster, &entries)?;
            if all {
                let records: Vec<EntryRecord> = report
                    .candidates
                    .iter()
                    .map(|c| EntryRecord::new(&c.entry, Some(c.score)))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&records)?);
            }

            match report.outcome {
                SearchOutcome::Found(best) => {
                    if !all {
                        let record = EntryRecord::new(best.entry(), Some(best.score()));
                        println!("{}", serde_json::to_string_pretty(&record)?);
                    }
                    if let Some(path) = annotate_path {
                        let canvas = annotate::draw_keypoints(&report.query, &best.query_keypoints)
                            .ok_or("query buffer does not match its dimensions")?;
                        canvas.save(&path)?;
                        tracing::info!(path = %path.display(), "wrote annotated query");
                    }
                    Ok(ExitCode::SUCCESS)
                }
                SearchOutcome::NoMatchFound => {
                    eprintln!("no similar image found");
                    Ok(ExitCode::from(EXIT_NO_MATCH))
                }
            }
        }
        Command::Index { dir, manifest, base_url } => {
            let provider = match base_url {
                Some(base) => DirectoryCorpus::new(dir).with_base_url(base),
                None => DirectoryCorpus::new(dir.canonicalize()?).relative_to(manifest_dir(&manifest)?),
            };
            let mut current = Manifest::load_or_default(&manifest)?;
            let report = current.merge(provider.entries()?);
            current.save(&manifest)?;
            println!(
                "{}",
                serde_json::json!({
                    "added": report.added,
                    "skipped": report.skipped,
                    "total": current.entries.len(),
                })
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Show { id, corpus } => {
            let manifest = Manifest::load(corpus)?;
            match manifest.find(id) {
                Some(entry) => {
                    println!("{}", serde_json::to_string_pretty(&EntryRecord::new(entry, None))?);
                    Ok(ExitCode::SUCCESS)
                }
                None => Err(format!("no corpus entry with id {id}").into()),
            }
        }
        Command::Config { preset, output } => {
            engine.extractor = match preset {
                Preset::Fast => ExtractorConfig::fast_preset(),
                Preset::Balanced => ExtractorConfig::balanced_preset(),
                Preset::Precision => ExtractorConfig::precision_preset(),
            };
            match output {
                Some(path) => engine.save(path)?,
                None => print!("{}", engine.to_toml()?),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
