//! CLI binary for sched2ics.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ScheduleConfig`, reads the input document, and writes the .ics payload.
//! The binary is also the "upload collaborator": it decides PDF vs. image
//! from the file extension, which the library core never does itself.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use sched2ics::{
    parse_schedule, parse_to_file, ScheduleConfig, ScheduleOutput, ScheduleSource, SourceProfile,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (stdout)
  sched2ics schedule.pdf

  # Write the calendar to a file
  sched2ics schedule.pdf -o schedule.ics

  # A photographed schedule, Algiers campus
  sched2ics photo.jpg --timezone ALG -o schedule.ics

  # Pin the generation date for reproducible output
  sched2ics schedule.pdf --date 2026-09-01 -o schedule.ics

  # Structured JSON (courses + warnings + stats) instead of the .ics text
  sched2ics --json schedule.pdf > result.json

  # Firefox print profile, custom semester length
  sched2ics --profile firefox --weeks 15 schedule.pdf

TIMEZONES:
  --timezone accepts an IANA identifier (Europe/Paris, Asia/Riyadh, …) or a
  campus alias: KSA (Asia/Riyadh, default), ALG (Africa/Algiers).

ENVIRONMENT VARIABLES:
  SCHED2ICS_OUTPUT     Default output path
  SCHED2ICS_TIMEZONE   Default timezone or alias
  SCHED2ICS_WEEKS      Default recurrence duration in weeks
  SCHED2ICS_DPI        Default rendering DPI
  SCHED2ICS_LANG       Tesseract language pack (e.g. eng, eng+fra)

SETUP:
  The bundled OCR engine shells out to the `tesseract` binary, which must be
  on PATH (apt install tesseract-ocr / brew install tesseract). Bilingual
  schedules read best with the French pack installed (tesseract-ocr-fra)
  and --lang eng+fra.
"#;

/// Convert a university schedule PDF or image into an iCalendar file.
#[derive(Parser, Debug)]
#[command(
    name = "sched2ics",
    version,
    about = "Convert a university schedule PDF or image into an iCalendar file",
    long_about = "Convert a scanned or rendered university schedule into structured course \
records and a recurring-event .ics file. The table grid is recovered with line detection \
and contour extraction, each cell is OCR'd with Tesseract, and one weekly event is \
generated per course.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Schedule document: a .pdf file, or an image (.png, .jpg, …).
    input: PathBuf,

    /// Write the .ics payload to this file instead of stdout.
    #[arg(short, long, env = "SCHED2ICS_OUTPUT")]
    output: Option<PathBuf>,

    /// Source profile: chrome, firefox. Selects two-page fallback geometry.
    #[arg(long, value_enum, default_value = "chrome")]
    profile: ProfileArg,

    /// Schedule timezone: IANA id or campus alias (KSA, ALG).
    #[arg(long, env = "SCHED2ICS_TIMEZONE", default_value = "KSA")]
    timezone: String,

    /// Number of weekly occurrences per course (semester length).
    #[arg(long, env = "SCHED2ICS_WEEKS", default_value_t = 19)]
    weeks: u32,

    /// Generation date (YYYY-MM-DD); defaults to today. Events start on the
    /// first matching weekday on or after this date.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Rendering DPI for PDF pages (72–600).
    #[arg(long, env = "SCHED2ICS_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Concurrent OCR worker count.
    #[arg(short, long, env = "SCHED2ICS_WORKERS", default_value_t = 8)]
    workers: usize,

    /// Anchor keyword spellings (repeatable). Default: THURSDAY, JEUDI.
    #[arg(long = "keyword")]
    keywords: Vec<String>,

    /// Tesseract language pack, e.g. eng or eng+fra.
    #[arg(long, env = "SCHED2ICS_LANG")]
    lang: Option<String>,

    /// Overall request timeout in seconds.
    #[arg(long, env = "SCHED2ICS_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Output structured JSON (courses + warnings + stats) instead of .ics.
    #[arg(long, env = "SCHED2ICS_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCHED2ICS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCHED2ICS_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ProfileArg {
    Chrome,
    Firefox,
}

impl From<ProfileArg> for SourceProfile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Chrome => SourceProfile::Chrome,
            ProfileArg::Firefox => SourceProfile::Firefox,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Read and classify the input ──────────────────────────────────────
    let bytes = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let source = classify_source(&cli.input, bytes);

    let config = build_config(&cli)?;

    // ── Run the pipeline ─────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let output = parse_to_file(source, output_path, &config)
            .await
            .context("Schedule conversion failed")?;

        if !cli.quiet {
            print_summary(&output, Some(output_path));
        }
    } else {
        let output = parse_schedule(source, &config)
            .await
            .context("Schedule conversion failed")?;

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            io::stdout()
                .lock()
                .write_all(output.calendar.as_bytes())
                .context("Failed to write to stdout")?;
        }

        if !cli.quiet && !cli.json {
            print_summary(&output, None);
        }
    }

    Ok(())
}

/// PDF vs. image, decided from the file extension. The library core never
/// sniffs bytes; that contract belongs to the caller.
fn classify_source(path: &Path, bytes: Vec<u8>) -> ScheduleSource {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        ScheduleSource::Pdf(bytes)
    } else {
        ScheduleSource::Image(bytes)
    }
}

/// Map CLI args to `ScheduleConfig`.
fn build_config(cli: &Cli) -> Result<ScheduleConfig> {
    let mut builder = ScheduleConfig::builder()
        .dpi(cli.dpi)
        .ocr_workers(cli.workers)
        .weeks(cli.weeks)
        .timezone(&cli.timezone)
        .request_timeout_secs(cli.timeout)
        .profile(cli.profile.into());

    if !cli.keywords.is_empty() {
        builder = builder.keywords(cli.keywords.clone());
    }
    if let Some(date) = cli.date {
        builder = builder.generation_date(date);
    }
    #[cfg(feature = "tesseract")]
    if let Some(ref lang) = cli.lang {
        builder = builder.ocr(std::sync::Arc::new(sched2ics::TesseractOcr::with_lang(
            lang.clone(),
        )));
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(output: &ScheduleOutput, path: Option<&Path>) {
    let tick = if output.warnings.is_empty() {
        green("✔")
    } else {
        yellow("⚠")
    };
    let target = match path {
        Some(p) => format!("  →  {}", bold(&p.display().to_string())),
        None => String::new(),
    };
    eprintln!(
        "{tick}  {} course(s)  {}ms{target}",
        bold(&output.courses.len().to_string()),
        output.stats.total_ms,
    );
    for warning in &output.warnings {
        eprintln!("   {} {}", yellow("!"), dim(&warning.to_string()));
    }
    if output.is_empty() {
        eprintln!(
            "   {}",
            dim("no courses could be parsed; the calendar has no events")
        );
    }
}
