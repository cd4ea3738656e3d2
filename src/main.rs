use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use form_autofill::executor::FieldOutcome;
use form_autofill::{AutofillBrowser, FileIdentifierStore, Record, RunReport, Runner, Schema};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fill a web form from a JSON record using a selector schema")]
struct Args {
    /// Data record to fill the form from
    #[arg(long, default_value = "listing.json")]
    json: PathBuf,

    /// Schema describing the form fields
    #[arg(long, default_value = "selectors.json")]
    selectors: PathBuf,

    /// Human-speed defaults and a visible browser
    #[arg(long)]
    safe: bool,

    #[arg(long)]
    headed: bool,

    /// Force headless even with --safe or --headed
    #[arg(long)]
    headless: bool,

    /// Click the schema's submit target after filling
    #[arg(long)]
    submit: bool,

    /// Pause after each page operation, in milliseconds
    #[arg(long)]
    slowmo: Option<u64>,

    /// Base per-keystroke delay, in milliseconds
    #[arg(long)]
    typing_delay: Option<u64>,

    /// Base pause between fields, in milliseconds
    #[arg(long)]
    between_delay: Option<u64>,

    /// Persistent Chrome profile directory
    #[arg(long)]
    user_data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn read_json(path: &Path, what: &str) -> form_autofill::Result<serde_json::Value> {
    if !path.exists() {
        return Err(form_autofill::Error::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{what} file not found: {}", path.display()),
        )));
    }
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

async fn wait_for_enter(message: &str) -> form_autofill::Result<()> {
    info!("{message}");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(())
}

async fn run(args: Args) -> form_autofill::Result<()> {
    let record = Record::new(read_json(&args.json, "JSON")?);
    let mut schema = Schema::from_value(read_json(&args.selectors, "Selectors")?)?;

    let options = &mut schema.options;
    if args.safe {
        options.apply_safe_defaults();
    }
    if let Some(ms) = args.slowmo {
        options.slow_mo_ms = ms;
    }
    if let Some(ms) = args.typing_delay {
        options.typing_delay_ms = ms;
    }
    if let Some(ms) = args.between_delay {
        options.between_fields_delay_ms = ms;
    }
    if let Some(dir) = args.user_data_dir.clone() {
        options.user_data_dir = Some(dir);
    }
    let headless = args.headless || !(args.headed || args.safe);

    let mut builder = AutofillBrowser::builder()
        .headless(headless)
        .slow_mo(Duration::from_millis(schema.options.slow_mo_ms));
    if let Some(dir) = &schema.options.user_data_dir {
        builder = builder.user_data_dir(dir);
    }
    let browser = builder.build().await?;
    let page = browser.page().await?;

    let store = FileIdentifierStore::from_options(&schema.options.identifier);
    let runner = Runner::new(&page, &schema, &store).submit(args.submit);

    runner.open().await?;
    if schema.options.pause_for_manual_start {
        wait_for_enter("Complete login/navigation, then press Enter to start auto-fill...")
            .await?;
    }
    let report = runner.fill(record).await?;
    summarize(&report);

    if schema.options.pause_for_review {
        wait_for_enter("Review the page, then press Enter to close the browser...").await?;
    }
    if args.headed && !schema.options.pause_for_review {
        info!("Browser left open for review. Close it when done.");
        return browser.wait_closed().await;
    }
    browser.close().await
}

fn summarize(report: &RunReport) {
    for field in &report.fields {
        if let FieldOutcome::Skipped(reason) = &field.outcome {
            warn!("{}: skipped ({})", field.name, reason);
        }
    }
    info!(
        "{} field(s) filled, {} skipped{}",
        report.applied(),
        report.skipped(),
        if report.submitted { ", form submitted" } else { "" }
    );
}
