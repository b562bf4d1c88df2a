//! CLI entry point for `mboxmd`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use mboxmd::config::Config;
use mboxmd::convert::{convert_archive, ConvertEvent, ConvertOptions, ConvertStats, ErrorPolicy};
use mboxmd::export::document::WritePolicy;
use mboxmd::parser::header::DatePolicy;

#[derive(Parser)]
#[command(name = "mboxmd", version, about = "Convert MBOX archives to Markdown")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert every message of an MBOX file into a Markdown document
    Convert {
        /// MBOX file to read
        path: PathBuf,
        /// Output directory (default: ./<name>_md)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// What to do when a document already exists: overwrite, skip, rename
        #[arg(long, value_name = "POLICY")]
        policy: Option<WritePolicy>,
        /// Only accept the fixed date format and stop on the first bad date
        #[arg(long)]
        strict_dates: bool,
        /// First-segment header decoding and quoted-printable on every body
        #[arg(long)]
        legacy: bool,
        /// Stop on the first unparseable message instead of skipping it
        #[arg(long)]
        abort_on_error: bool,
        /// Worker threads
        #[arg(short, long, value_name = "N")]
        jobs: Option<usize>,
        /// Maximum subject characters kept in filenames
        #[arg(long, value_name = "N")]
        max_subject_len: Option<usize>,
        /// Print a JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = mboxmd::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Convert {
            path,
            output,
            policy,
            strict_dates,
            legacy,
            abort_on_error,
            jobs,
            max_subject_len,
            json,
        } => {
            let mut options = config.convert_options();
            if let Some(policy) = policy {
                options.write_policy = policy;
            }
            if strict_dates {
                options.date_policy = DatePolicy::Strict;
            }
            if legacy {
                options = options.legacy_decoding();
            }
            if abort_on_error {
                options.on_parse_error = ErrorPolicy::Abort;
            }
            if let Some(jobs) = jobs {
                options.jobs = jobs.max(1);
            }
            if let Some(len) = max_subject_len {
                options.max_subject_len = len;
            }
            let output = output.unwrap_or_else(|| default_output_dir(&path, &config));
            cmd_convert(&path, &output, &options, json)
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mboxmd::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mboxmd.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// `<config output_dir>` if set, otherwise `./<mbox stem>_md`.
fn default_output_dir(mbox: &Path, config: &Config) -> PathBuf {
    if let Some(ref dir) = config.convert.output_dir {
        return dir.clone();
    }
    let stem = mbox
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mbox".to_string());
    PathBuf::from(format!("{stem}_md"))
}

/// Machine-readable result of `convert --json`.
#[derive(Serialize)]
struct ConvertSummary<'a> {
    input: &'a Path,
    output: &'a Path,
    #[serde(flatten)]
    stats: &'a ConvertStats,
    input_bytes: u64,
    output_bytes: u64,
    elapsed_ms: u64,
}

/// Convert an MBOX file and print one line per message.
///
/// With `json` the per-message lines go to stderr and stdout carries only
/// the summary.
fn cmd_convert(
    path: &Path,
    output: &Path,
    options: &ConvertOptions,
    json: bool,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    let pb = ProgressBar::new(file_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} Converting [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let mut output_bytes: u64 = 0;
    let result = convert_archive(path, output, options, &mut |event, progress| {
        match event {
            ConvertEvent::Converted { index, outcome } => {
                let line = if outcome.is_written() {
                    output_bytes += std::fs::metadata(outcome.path())
                        .map(|m| m.len())
                        .unwrap_or(0);
                    format!(
                        "Processed email {index} and saved to {}",
                        outcome.filename()
                    )
                } else {
                    format!(
                        "Processed email {index}, {} already exists, skipped",
                        outcome.filename()
                    )
                };
                pb.suspend(|| report(&line, json));
            }
            ConvertEvent::Failed { index, error } => {
                let line = format!("Skipped email {index}: {error}");
                pb.suspend(|| report(&line, json));
            }
        }
        pb.set_position(progress.bytes_read);
    });
    pb.finish_and_clear();
    let stats = result?;

    if json {
        let summary = ConvertSummary {
            input: path,
            output,
            stats: &stats,
            input_bytes: file_size,
            output_bytes,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    use humansize::{format_size, BINARY};
    println!();
    println!("  Conversion complete:");
    println!("  {:<25} {}", "Messages", stats.messages);
    println!("  {:<25} {}", "Documents written", stats.written);
    if options.write_policy == WritePolicy::Skip {
        println!("  {:<25} {}", "Already present", stats.skipped_existing);
    }
    if stats.failed > 0 {
        println!("  {:<25} {}", "Unparseable (skipped)", stats.failed);
    }
    println!("  {:<25} {}", "Archive size", format_size(file_size, BINARY));
    println!("  {:<25} {}", "Output size", format_size(output_bytes, BINARY));
    println!("  {:<25} {}", "Output directory", output.display());
    println!("  {:<25} {:.2?}", "Elapsed", start.elapsed());
    println!();

    Ok(())
}

fn report(line: &str, to_stderr: bool) {
    if to_stderr {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mboxmd", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
