use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use facet::{format_reports, Facet, FacetConfig, MatchReport, OutputFormat};
use similarity::Similarity;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "facet", about = "Extract medical concepts from text", version)]
struct Cli {
    /// YAML configuration file; defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `facet=debug,matcher=trace`.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install a dictionary source (triples file or UMLS META directory).
    Install {
        source: PathBuf,
    },
    /// Extract concepts from inline text and/or files.
    Match {
        /// Text to match; each argument is its own source.
        text: Vec<String>,
        /// Files to match; each file is read as one text.
        #[arg(short, long)]
        file: Vec<PathBuf>,
        /// Output format; overrides `output.format`.
        #[arg(long)]
        format: Option<OutputFormat>,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        similarity: Option<Similarity>,
    },
    /// Print approximate dictionary terms for a query.
    Search {
        query: String,
        #[arg(long)]
        threshold: Option<f64>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    let mut cfg = match &cli.config {
        Some(path) => FacetConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => FacetConfig::default(),
    };

    match cli.command {
        Command::Install { source } => {
            let facet = Facet::open(cfg)?;
            let report = facet.install(&source, &AtomicBool::new(false))?;
            println!(
                "installed {} terms ({} rows read, {} skipped, {} batches) in {:.2?}",
                report.terms_indexed,
                report.rows_read,
                report.rows_skipped,
                report.batches,
                report.elapsed
            );
        }
        Command::Match {
            text,
            file,
            format,
            threshold,
            similarity,
        } => {
            if text.is_empty() && file.is_empty() {
                bail!("nothing to match: pass text or --file");
            }
            if let Some(threshold) = threshold {
                cfg.matcher.threshold = threshold;
            }
            if let Some(similarity) = similarity {
                cfg.matcher.similarity = similarity;
            }
            let format = format.unwrap_or(cfg.output.format);
            let facet = Facet::open(cfg)?;

            let mut sources: Vec<(String, String)> =
                text.into_iter().map(|t| ("-".to_string(), t)).collect();
            for path in file {
                let body = fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                sources.push((path.display().to_string(), body));
            }

            let texts: Vec<&str> = sources.iter().map(|(_, body)| body.as_str()).collect();
            let results = facet.match_many(&texts)?;
            let reports: Vec<MatchReport> = sources
                .into_iter()
                .zip(results)
                .map(|((source, _), matches)| MatchReport::new(source, matches))
                .collect();
            print!("{}", format_reports(&reports, format)?);
            if format == OutputFormat::Json {
                println!();
            }
        }
        Command::Search { query, threshold } => {
            if let Some(threshold) = threshold {
                cfg.matcher.threshold = threshold;
            }
            let facet = Facet::open(cfg)?;
            for candidate in facet.search(&query)? {
                println!("{:.4}\t{}", candidate.score, candidate.term);
            }
        }
    }
    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
