//! Purpose: `bulkwrite` CLI entry point.
//! Role: Binary crate root; parses args, replays scripted bulk rounds, emits JSON lines on stdout.
//! Invariants: Each round emits exactly one JSON line; a summary line closes the run.
//! Invariants: Errors are emitted as JSON on stderr; exit codes derive from `api::to_exit_code`.
//! Invariants: Logging goes to stderr through `tracing` and never mixes with stdout JSON.
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Args, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod replay;

use bulkwrite::api::{
    DEFAULT_MAX_ROUNDS, DEFAULT_RETRY_STATUSES, Error, ErrorKind, RetryConfig, to_exit_code,
};
use bulkwrite::report::{
    DEFAULT_MAX_DOCUMENT_PREVIEW, DEFAULT_MAX_ERROR_SAMPLES, ReportConfig, ledger_json,
};
use replay::{parse_rounds, read_documents, replay};

/// Exit code when documents are still failed after the last round.
const EXIT_DOCUMENTS_FAILED: i32 = 9;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `bulkwrite --help`."));
            }
        },
    };

    init_tracing();
    match cli.command {
        Command::Replay(args) => run_replay(args),
    }
}

#[derive(Parser)]
#[command(
    name = "bulkwrite",
    version,
    about = "Track per-document outcomes of bulk writes and rebuild retry rounds",
    long_about = None,
    after_help = r#"EXAMPLES
  $ bulkwrite replay --docs docs.jsonl --rounds rounds.json
  $ bulkwrite replay --docs - --rounds rounds.json --retry-status 429 --retry-status 503 < docs.jsonl

ROUNDS SCRIPT
  A JSON array, one entry per round; positions are current positions in that round:
  [{"http_status": 200, "elapsed_ms": 31, "failures": [{"position": 1, "status": 429, "message": "rejected"}]}]
  Rounds past the end of the script succeed for every document."#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay scripted engine responses through the retry ledger.
    Replay(ReplayArgs),
}

#[derive(Args)]
struct ReplayArgs {
    #[arg(
        long,
        help = "Newline-delimited documents, one per line ('-' reads stdin)",
        value_hint = ValueHint::FilePath
    )]
    docs: PathBuf,
    #[arg(
        long,
        help = "JSON array of scripted round responses",
        value_hint = ValueHint::FilePath
    )]
    rounds: PathBuf,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_ROUNDS,
        help = "Maximum rounds, the first submission included"
    )]
    max_rounds: usize,
    #[arg(
        long = "retry-status",
        value_name = "STATUS",
        help = "Per-document status to retry (repeatable; default 429)"
    )]
    retry_statuses: Vec<u16>,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_ERROR_SAMPLES,
        help = "Maximum failures sampled per report line"
    )]
    samples: usize,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_DOCUMENT_PREVIEW,
        help = "Maximum bytes of each failed document shown in samples"
    )]
    preview_bytes: usize,
}

fn run_replay(args: ReplayArgs) -> Result<RunOutcome, Error> {
    let documents = if args.docs.as_os_str() == "-" {
        read_documents(io::stdin().lock())?
    } else {
        read_documents(BufReader::new(open_file(&args.docs)?))?
    };
    let script = std::fs::read_to_string(&args.rounds).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to read {}", args.rounds.display()))
            .with_source(err)
    })?;
    let rounds = parse_rounds(&script)?;

    let retry = RetryConfig {
        retry_statuses: if args.retry_statuses.is_empty() {
            DEFAULT_RETRY_STATUSES.to_vec()
        } else {
            args.retry_statuses
        },
        max_rounds: args.max_rounds.max(1),
    };
    let report = ReportConfig {
        max_error_samples: args.samples,
        max_document_preview: args.preview_bytes,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let ledger = replay(documents, rounds, retry, &report, |line| {
        emit_line(&mut out, &line)
    })?;

    let mut summary = ledger_json(&ledger, &report);
    if let (Some(time), Value::Object(map)) = (time_now(), &mut summary) {
        map.insert("time".to_string(), json!(time));
    }
    emit_line(&mut out, &summary)?;

    if ledger.failed().is_empty() {
        Ok(RunOutcome::ok())
    } else {
        Ok(RunOutcome::with_code(EXIT_DOCUMENTS_FAILED))
    }
}

fn open_file(path: &Path) -> Result<File, Error> {
    File::open(path).map_err(|err| {
        let kind = if err.kind() == io::ErrorKind::NotFound {
            ErrorKind::Usage
        } else {
            ErrorKind::Io
        };
        Error::new(kind)
            .with_message(format!("failed to open {}", path.display()))
            .with_source(err)
    })
}

fn emit_line<W: Write>(out: &mut W, value: &Value) -> Result<(), Error> {
    let json = serde_json::to_string(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("json encode failed")
            .with_source(err)
    })?;
    writeln!(out, "{json}").map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write stdout")
            .with_source(err)
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error: ").to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn emit_error(err: &Error) {
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert(
        "message".to_string(),
        json!(err.message().unwrap_or("unexpected failure")),
    );
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(position) = err.position() {
        inner.insert("position".to_string(), json!(position));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = std::error::Error::source(err);
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}
