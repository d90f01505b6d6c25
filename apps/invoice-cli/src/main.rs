//! Invoice CLI
//!
//! - `invoice update <pdf> --specs <json>`: apply explicit update specs
//! - `invoice auto <pdf>`: detect VAT and recalculate every price
//! - `invoice detect <pdf>`: print the detected VAT rate and prices as JSON

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use invoice_core::prices::{scan_prices, PriceCandidate};
use invoice_core::vat::{detect_vat_amount, detect_vat_in_document, VatAmount};
use invoice_core::{
    load_update_specs, output_path, process_invoice, update_invoice_file, CoverStyle,
    InvoiceDocument, OverlayConfig, RunReport, SpecStatus, VatDetection,
};
use serde::Serialize;
use tracing::{debug, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "invoice")]
#[command(about = "Cover and rewrite text on PDF invoices")]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply the update specs in a JSON file
    Update {
        input: PathBuf,

        /// JSON list of updates, or an object with an `updates` list
        #[arg(short, long)]
        specs: PathBuf,

        /// Appended to the file stem of the output
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Detect the VAT rate and remove it from every price
    Auto {
        input: PathBuf,

        /// `download` covers with opaque white, anything else highlights
        #[arg(long)]
        style: Option<String>,

        /// Appended to the file stem of the output
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Print the detected VAT rate and prices without changing anything
    Detect { input: PathBuf },
}

#[derive(Serialize)]
struct DetectReport<'a> {
    file: &'a Path,
    vat: VatDetection,
    vat_amount: Option<VatAmount>,
    prices: Vec<PriceCandidate>,
}

fn load_config(path: Option<&Path>) -> Result<OverlayConfig> {
    match path {
        Some(path) => OverlayConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(OverlayConfig::default()),
    }
}

fn print_report(report: &RunReport) {
    for spec in &report.specs {
        match &spec.status {
            SpecStatus::Applied => println!(
                "applied  '{}' ({} of {} matches)",
                spec.search_text, spec.applied, spec.matches_found
            ),
            SpecStatus::NoMatch => println!("no match '{}'", spec.search_text),
            SpecStatus::Failed(e) => println!("failed   '{}': {}", spec.search_text, e),
        }
        for r in &spec.recalculations {
            println!(
                "         {:.2} @ {}% -> {:.2}",
                r.prior_gross_value, r.vat_rate, r.corrected_value
            );
        }
        for u in &spec.unresolved {
            println!(
                "         skipped '{}' on page {}: {}",
                u.matched,
                u.page_index + 1,
                u.error
            );
        }
    }
    if let Some(path) = &report.output_path {
        println!("Saved {}", path.display());
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Update {
            input,
            specs,
            suffix,
        } => {
            let specs = load_update_specs(&specs)
                .with_context(|| format!("loading update specs {}", specs.display()))?;
            debug!(count = specs.len(), "update specs loaded");
            let suffix = suffix.unwrap_or_else(|| config.output_suffix.clone());
            let report = update_invoice_file(&input, &specs, &suffix, &config)
                .with_context(|| format!("updating {}", input.display()))?;
            print_report(&report);
        }
        Command::Auto {
            input,
            style,
            suffix,
        } => {
            let suffix = suffix.unwrap_or_else(|| config.output_suffix.clone());
            let output = output_path(&input, &suffix)?;
            let source =
                std::fs::read(&input).with_context(|| format!("reading {}", input.display()))?;

            let outcome = process_invoice(
                &source,
                CoverStyle::from_request_style(style.as_deref()),
                &config,
            )
            .with_context(|| format!("processing {}", input.display()))?;
            std::fs::write(&output, &outcome.bytes)
                .with_context(|| format!("writing {}", output.display()))?;

            let summary = &outcome.summary;
            println!("VAT rate:        {}%", summary.detected_vat);
            if let (Some(code), Some(name)) = (&summary.country_code, &summary.country_name) {
                println!("Country:         {} ({})", name, code);
            }
            println!("Prior total:     {:.2}", summary.prior_total);
            println!("Corrected total: {:.2}", summary.corrected_total);
            if let Some(amount) = summary.vat_amount {
                println!("VAT amount:      {:.2} (covered)", amount);
            }
            println!("Prices updated:  {}", summary.prices_updated);
            println!("Saved {}", output.display());
        }
        Command::Detect { input } => {
            let doc = InvoiceDocument::open(&input)
                .with_context(|| format!("opening {}", input.display()))?;
            let vat = detect_vat_in_document(&doc);
            let report = DetectReport {
                file: &input,
                vat_amount: vat.rate_percent.and_then(|rate| detect_vat_amount(&doc, rate)),
                vat,
                prices: scan_prices(&doc),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    run(cli)
}
