use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use paste_normalizer::{format, PipelineOptions};

#[derive(Parser, Debug)]
#[command(
    name = "paste-normalizer",
    version,
    about = "Normalize HTML pasted from academic publishers",
    long_about = "Normalize HTML pasted from academic publisher pages.\n\n\
        Detects the publisher format, extracts footnotes and bibliography\n\
        entries, cleans the markup, and links in-text citations and\n\
        footnote markers to appended Notes/References sections.\n\n\
        Examples:\n  \
        paste-normalizer process article.html --book book1\n  \
        paste-normalizer process snippet.html --book book1 --auto --save\n  \
        paste-normalizer detect article.html --verbose\n  \
        paste-normalizer keys \"Smith, J. (2020). Title.\"\n  \
        paste-normalizer show --book book1"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "json",
        help = "Output format",
        long_help = "Output format.\n  json     JSON (default, best for programmatic use)\n  markdown Human-readable markdown"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Debug)]
enum OutputFormat {
    Json,
    Markdown,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a pasted HTML file through the pipeline
    #[command(long_about = "Run a pasted HTML file through the pipeline.\n\n\
        Use - to read from stdin. --lite skips extraction and linking;\n\
        --auto picks lite or full from the estimated paste size.\n\n\
        Examples:\n  \
        paste-normalizer process article.html --book book1\n  \
        paste-normalizer process - --book book1 --stamp 1700000000000")]
    Process {
        /// HTML file, or - for stdin
        file: PathBuf,

        #[arg(long, short, help = "Book id that prefixes generated footnote ids")]
        book: String,

        #[arg(long, help = "Sanitize and clean only", conflicts_with = "auto")]
        lite: bool,

        #[arg(long, help = "Choose lite or full pipeline from the paste size")]
        auto: bool,

        #[arg(long, help = "Store footnotes and references in the database")]
        save: bool,

        #[arg(long, help = "Database path (default: $PASTE_NORMALIZER_DB or ~/.paste-normalizer/store.db)")]
        db: Option<PathBuf>,

        #[arg(long, help = "Fixed timestamp component for generated ids")]
        stamp: Option<i64>,

        #[arg(long, default_value = "pasted-", help = "Ids with this prefix survive cleanup")]
        reserved_prefix: String,

        #[arg(long, default_value = "20", help = "Node count at or below which --auto uses the lite pipeline")]
        threshold: usize,
    },

    /// Detect the publisher format of an HTML file
    Detect {
        /// HTML file, or - for stdin
        file: PathBuf,

        #[arg(long, short, help = "Report matched selectors per format")]
        verbose: bool,
    },

    /// Generate reference keys for a citation or bibliography text
    #[command(long_about = "Generate reference keys for a citation or bibliography text.\n\n\
        Examples:\n  \
        paste-normalizer keys \"Smith, J. (2020). Title.\"\n  \
        paste-normalizer keys \"CIT0012 Jones 2019\" --format-id taylor-francis")]
    Keys {
        /// Reference or citation text
        text: String,

        #[arg(long, short, default_value = "", help = "Surrounding text")]
        context: String,

        #[arg(long, default_value = "general", help = "Format id the text comes from")]
        format_id: String,
    },

    /// List registered formats in detection order
    Formats,

    /// Show stored footnotes and references of a book
    Show {
        #[arg(long, short, help = "Book id")]
        book: String,

        #[arg(long, help = "Database path")]
        db: Option<PathBuf>,
    },
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        return std::io::read_to_string(std::io::stdin()).context("Failed to read stdin");
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Process {
            file,
            book,
            lite,
            auto,
            save,
            db,
            stamp,
            reserved_prefix,
            threshold,
        } => {
            let markup = read_input(&file)?;
            let options = PipelineOptions {
                id_stamp: stamp,
                reserved_id_prefix: reserved_prefix,
                small_paste_threshold: threshold,
            };
            let result = if lite {
                paste_normalizer::process_paste_lite(&markup, &book, options)?
            } else if auto {
                paste_normalizer::process_paste_auto(&markup, &book, options)?
            } else {
                paste_normalizer::process_paste(&markup, &book, options)?
            };
            if save {
                paste_normalizer::save_result(&book, &result, db.as_deref())?;
            }
            print_output(&cli.format, &result, format::paste)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Detect { file, verbose } => {
            let markup = read_input(&file)?;
            if verbose {
                let report = paste_normalizer::detect_format_verbose(&markup);
                print_output(&cli.format, &report, format::detection)?;
            } else {
                let detected = paste_normalizer::detect_format(&markup);
                match cli.format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&detected)?),
                    OutputFormat::Markdown => println!("{detected}"),
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Keys {
            text,
            context,
            format_id,
        } => {
            let keys = paste_normalizer::generate_keys(&text, &context, &format_id);
            let found = !keys.is_empty();
            print_output(&cli.format, &keys, |k| format::keys(k))?;
            Ok(if found {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }

        Command::Formats => {
            let entries = paste_normalizer::list_formats();
            print_output(&cli.format, &entries, |e| format::formats(e))?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Show { book, db } => {
            let stored = paste_normalizer::load_book(&book, db.as_deref())?;
            print_output(&cli.format, &stored, format::stored_book)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Print output in the requested format
fn print_output<T: serde::Serialize>(
    fmt: &OutputFormat,
    value: &T,
    markdown_fn: impl FnOnce(&T) -> String,
) -> anyhow::Result<()> {
    match fmt {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Markdown => {
            print!("{}", markdown_fn(value));
        }
    }
    Ok(())
}
