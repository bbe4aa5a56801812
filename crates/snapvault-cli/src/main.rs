mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, CleanupArgs, Commands, HistoryArgs, VerifyArgs};
use dotenv::dotenv;
use progress::CliReporter;
use snapvault_core::cleaner::{format_bytes, Cleaner};
use snapvault_core::config::load_configuration;
use snapvault_core::digest::HashAlgorithm;
use snapvault_core::mapping::{media_files, DateMapper, ScanOptions};
use snapvault_core::record::RunRecordReader;
use snapvault_core::report::{ReportHeader, ReportReader, VerifySummary};
use snapvault_core::store::discovery::{
    self, DiscoveryFilter, ReportSummary, RunSummary, Selection, SelectionMode,
};
use snapvault_core::store::Store;
use snapvault_core::{AppConfig, Error, Verifier, VerifyOutcome};
use tracing::error;

const EXIT_FAILURE: i32 = 1;
const EXIT_NO_CANDIDATES: i32 = 2;
const EXIT_AMBIGUOUS: i32 = 3;

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let config = match load_configuration(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(EXIT_FAILURE);
        }
    };

    let code = match args.command {
        Some(Commands::Verify(verify_args)) => run_command(verify_command(&config, &verify_args)),
        Some(Commands::Cleanup(cleanup_args)) => {
            run_command(cleanup_command(&config, &cleanup_args))
        }
        Some(Commands::History(history_args)) => {
            run_command(history_command(&config, &history_args))
        }
        None => {
            let _ = Cli::command().print_long_help();
            0
        }
    };
    process::exit(code);
}

fn run_command(result: Result<i32, Error>) -> i32 {
    match result {
        Ok(code) => code,
        Err(err) => {
            error!("Error: {}", err);
            exit_code_for(&err)
        }
    }
}

fn exit_code_for(err: &Error) -> i32 {
    match err {
        Error::NoCandidates(_) => EXIT_NO_CANDIDATES,
        Error::AmbiguousSelection { .. } => EXIT_AMBIGUOUS,
        _ => EXIT_FAILURE,
    }
}

fn selection_mode(by_id: Option<String>, last: bool, yes: bool) -> SelectionMode {
    if let Some(id) = by_id {
        SelectionMode::ById(id)
    } else if last {
        SelectionMode::Last
    } else if yes {
        SelectionMode::RequireExplicit
    } else {
        SelectionMode::Interactive
    }
}

// ── verify ───────────────────────────────────────────────────────────

fn verify_command(config: &AppConfig, args: &VerifyArgs) -> Result<i32, Error> {
    let algorithm = match &args.algorithm {
        Some(raw) => Some(raw.parse::<HashAlgorithm>()?),
        None => None,
    };
    let store = Store::from_config(config);
    let verifier = Verifier::from_config(config, &store, algorithm)?;

    if args.reconstruct {
        return verify_reconstruct(config, args, &store, &verifier);
    }

    let record_path: PathBuf = if let Some(run_file) = &args.run_file {
        if !run_file.exists() {
            error!("Run file not found: {}", run_file.display());
            return Ok(EXIT_FAILURE);
        }
        run_file.clone()
    } else {
        let filter = DiscoveryFilter {
            source_root: args.source.clone(),
            destination_root: args.destination.clone(),
            include_dry_runs: args.include_dry_runs,
            ..DiscoveryFilter::default()
        };
        let mode = selection_mode(args.run_id.clone(), args.last, args.yes);
        let selection = match discovery::select_run(&store, &filter, &mode) {
            Ok(selection) => selection,
            Err(Error::NoCandidates(kind)) => {
                println!(
                    "{}",
                    format!("No {} found in {}", kind, store.runs_dir().display()).yellow()
                );
                println!();
                println!("Options:");
                println!("  • run the organizer to create a run record");
                println!("  • pass --run-file to use a record directly");
                println!("  • pass --reconstruct with --source and --destination");
                println!("  • pass --include-dry-runs to include dry-run records");
                return Ok(EXIT_NO_CANDIDATES);
            }
            Err(err) => return Err(err),
        };
        match selection {
            Selection::Chosen(summary) => {
                if mode == SelectionMode::Interactive {
                    print_run_summary(&summary);
                    if !prompt_confirm("Use this run?", Some(true))? {
                        return Ok(0);
                    }
                }
                summary.path
            }
            Selection::NeedsChoice(candidates) => match choose_run(&candidates)? {
                Some(summary) => summary.path,
                None => return Ok(0),
            },
        }
    };

    let reader = RunRecordReader::open(&record_path)?;
    let header = reader.header();
    println!();
    println!("{} {}", "Verifying run:".blue(), header.run_id);
    println!("  Source: {}", header.source_root.display());
    println!("  Destination: {}", header.destination_root.display());
    println!("  Algorithm: {}", verifier.algorithm());
    println!();

    let reporter = CliReporter::new();
    let outcome = verifier.verify_run(&store, reader, &reporter)?;
    print_verify_results(&outcome, verifier.algorithm());
    Ok(0)
}

fn verify_reconstruct(
    config: &AppConfig,
    args: &VerifyArgs,
    store: &Store,
    verifier: &Verifier,
) -> Result<i32, Error> {
    let (source, destination) = match (&args.source, &args.destination) {
        (Some(source), Some(destination)) => (source.clone(), destination.clone()),
        _ => {
            error!("--reconstruct requires both --source and --destination");
            return Ok(EXIT_FAILURE);
        }
    };
    for dir in [&source, &destination] {
        if !dir.is_dir() {
            error!("Not a directory: {}", dir.display());
            return Ok(EXIT_FAILURE);
        }
    }

    println!("{}", "Verification (reconstructed mapping)".blue().bold());
    println!("  Source:      {}", source.display());
    println!("  Destination: {}", destination.display());
    println!("  Algorithm:   {}", verifier.algorithm());
    println!();

    let mapper = DateMapper::from_config(config, &destination);
    let options = ScanOptions::from_config(config);
    let sources = media_files(&source, &options);

    let reporter = CliReporter::new();
    let outcome =
        verifier.verify_reconstructed(store, &source, &destination, &mapper, sources, &reporter)?;
    print_verify_results(&outcome, verifier.algorithm());
    Ok(0)
}

fn print_verify_results(outcome: &VerifyOutcome, algorithm: HashAlgorithm) {
    let summary = &outcome.summary;
    println!();
    println!("{}", "Verification results:".bold());
    println!("  Algorithm:           {}", algorithm);
    println!("  Total files:         {}", summary.total);
    println!("  OK:                  {}", summary.ok.to_string().green());
    println!(
        "  OK (duplicate):      {}",
        summary.ok_existing_duplicate.to_string().green()
    );
    println!("  Mismatch:            {}", summary.mismatch.to_string().red());
    println!(
        "  Missing destination: {}",
        summary.missing_destination.to_string().yellow()
    );
    println!(
        "  Missing source:      {}",
        summary.missing_source.to_string().yellow()
    );
    println!("  Errors:              {}", summary.error.to_string().red());
    println!("  Skipped:             {}", summary.skipped);
    println!();
    println!("Duration: {:.1}s", outcome.duration_seconds);
    println!("Report: {}", outcome.path.display());

    let eligible = summary.cleanup_eligible();
    let not_eligible = summary.total - eligible;
    println!();
    if summary.total > 0 && eligible == summary.total {
        if algorithm == HashAlgorithm::Sha256 {
            println!(
                "{}",
                "All files verified (sha256); all entries eligible for cleanup.".green()
            );
        } else {
            println!(
                "{}",
                "All files passed the quick check (size only); not eligible for cleanup by default."
                    .yellow()
            );
        }
    } else if eligible > 0 {
        println!(
            "{}",
            format!(
                "Partial verification: {} files eligible for cleanup, {} not eligible.",
                eligible, not_eligible
            )
            .yellow()
        );
    } else {
        println!(
            "{}",
            "No files eligible for cleanup (mismatch/missing/error or quick verification).".yellow()
        );
    }
    if eligible > 0 && algorithm == HashAlgorithm::Sha256 {
        println!("Run 'snapvault cleanup' to delete verified sources.");
    }
}

// ── cleanup ──────────────────────────────────────────────────────────

fn cleanup_command(config: &AppConfig, args: &CleanupArgs) -> Result<i32, Error> {
    let store = Store::from_config(config);
    let use_dry_run = if args.no_dry_run {
        false
    } else if args.dry_run {
        true
    } else {
        config.cleanup.dry_run_default
    };

    let report_path: PathBuf = if let Some(verify_file) = &args.verify_file {
        if !verify_file.exists() {
            error!("Verification file not found: {}", verify_file.display());
            return Ok(EXIT_FAILURE);
        }
        verify_file.clone()
    } else {
        let filter = DiscoveryFilter {
            source_root: args.source.clone(),
            destination_root: args.destination.clone(),
            ..DiscoveryFilter::default()
        };
        let mode = selection_mode(args.verify_id.clone(), args.last, args.yes);
        let selection = match discovery::select_report(&store, &filter, &mode) {
            Ok(selection) => selection,
            Err(Error::NoCandidates(kind)) => {
                println!(
                    "{}",
                    format!(
                        "No {} found in {}",
                        kind,
                        store.verifications_dir().display()
                    )
                    .yellow()
                );
                println!();
                println!("Run 'snapvault verify' first to verify copy operations.");
                return Ok(EXIT_NO_CANDIDATES);
            }
            Err(err) => return Err(err),
        };
        match selection {
            Selection::Chosen(summary) => {
                if mode == SelectionMode::Interactive {
                    print_report_summary(&summary);
                    if !prompt_confirm("Use this verification?", Some(true))? {
                        return Ok(0);
                    }
                }
                summary.path
            }
            Selection::NeedsChoice(candidates) => match choose_report(&candidates)? {
                Some(summary) => summary.path,
                None => return Ok(0),
            },
        }
    };

    let cleaner = Cleaner::from_config(config).with_dry_run(use_dry_run);
    let (eligible, bytes) = cleaner.preview(&report_path)?;

    if eligible == 0 {
        println!("{}", "No files eligible for cleanup.".yellow());
        let (header, summary) = report_overview(&report_path)?;
        println!();
        println!("Reasons:");
        println!("  • OK entries: {}", summary.cleanup_eligible());
        println!(
            "  • Mismatch/missing: {}",
            summary.mismatch + summary.missing_destination + summary.missing_source
        );
        if header.hash_algorithm != HashAlgorithm::Sha256 {
            println!(
                "  • Algorithm: {} (sha256 required for cleanup)",
                header.hash_algorithm
            );
        }
        return Ok(0);
    }

    let mode_text = if use_dry_run {
        "DRY RUN".yellow()
    } else {
        "LIVE DELETE".red()
    };
    println!();
    println!("Mode: {}", mode_text);
    println!(
        "Files eligible for deletion: {} ({})",
        eligible,
        format_bytes(bytes)
    );
    println!();

    if !use_dry_run && !args.force {
        println!(
            "{}",
            "WARNING: this permanently deletes source files!".red().bold()
        );
        println!("They were verified as correctly copied to the destination.");
        println!();
        if !prompt_confirm(&format!("Delete {} source files?", eligible), Some(false))? {
            println!("Aborted.");
            return Ok(0);
        }
    }

    let reporter = CliReporter::new();
    let outcome = cleaner.cleanup(&report_path, &reporter)?;

    println!();
    if use_dry_run {
        println!("{}", "Dry run results:".yellow().bold());
        println!("  Would delete: {} files", outcome.deleted);
        println!("  Would free: {}", format_bytes(outcome.bytes_freed));
        println!();
        println!("Run with --no-dry-run to actually delete files.");
    } else {
        println!("{}", "Cleanup complete".green().bold());
        println!("  Deleted: {} files", outcome.deleted);
        println!("  Freed: {}", format_bytes(outcome.bytes_freed));
        if outcome.skipped > 0 {
            println!("  {}", format!("Skipped: {}", outcome.skipped).yellow());
        }
        if outcome.failed > 0 {
            println!("  {}", format!("Failed: {}", outcome.failed).red());
            for (path, err) in outcome.failed_paths.iter().take(5) {
                println!("    • {}: {}", path.display(), err);
            }
        }
    }
    Ok(0)
}

fn report_overview(path: &Path) -> Result<(ReportHeader, VerifySummary), Error> {
    let mut reader = ReportReader::open(path)?;
    let mut recomputed = VerifySummary::default();
    for entry in reader.by_ref() {
        recomputed.record(entry?.status);
    }
    let (header, footer) = reader.into_parts();
    let summary = footer.map(|f| f.summary).unwrap_or(recomputed);
    Ok((header, summary))
}

// ── history ──────────────────────────────────────────────────────────

fn history_command(config: &AppConfig, args: &HistoryArgs) -> Result<i32, Error> {
    let store = Store::from_config(config);
    let filter = DiscoveryFilter {
        include_dry_runs: args.include_dry_runs,
        ..DiscoveryFilter::default()
    };

    let runs = discovery::discover_runs(&store, &filter)?;
    println!("{}", format!("Run records ({}):", runs.len()).blue());
    if runs.is_empty() {
        println!("  (none)");
    }
    for run in &runs {
        let dry_marker = if run.mode.is_dry_run() { " (dry-run)" } else { "" };
        let partial_marker = if run.finalized { "" } else { " (partial)" };
        println!(
            "  {} — {}, {} files ({}){}{}",
            run.run_id,
            run.age_description(),
            run.total_files,
            run.mode.describe(),
            dry_marker,
            partial_marker,
        );
        println!(
            "     {} → {}",
            run.source_root.display(),
            run.destination_root.display()
        );
    }

    println!();
    let reports = discovery::discover_reports(&store, &filter)?;
    println!(
        "{}",
        format!("Verification reports ({}):", reports.len()).blue()
    );
    if reports.is_empty() {
        println!("  (none)");
    }
    for report in &reports {
        println!(
            "  {} — {}, {} OK / {} total",
            report.verify_id,
            report.age_description(),
            report.summary.cleanup_eligible(),
            report.summary.total,
        );
        println!(
            "     {} → {}",
            report.source_root.display(),
            report.destination_root.display()
        );
    }
    Ok(0)
}

// ── prompts ──────────────────────────────────────────────────────────

fn print_run_summary(run: &RunSummary) {
    println!(
        "Last apply run: {}, {} files ({})",
        run.age_description().cyan(),
        run.total_files,
        run.mode.describe(),
    );
    println!("  Source: {}", run.source_root.display());
    println!("  Destination: {}", run.destination_root.display());
    println!();
}

fn print_report_summary(report: &ReportSummary) {
    println!("Last verification: {}", report.age_description().cyan());
    println!(
        "  OK: {}, issues: {}",
        report.summary.cleanup_eligible(),
        report.summary.total - report.summary.cleanup_eligible(),
    );
    println!("  Source: {}", report.source_root.display());
    println!("  Destination: {}", report.destination_root.display());
    println!();
}

fn choose_run(candidates: &[RunSummary]) -> io::Result<Option<RunSummary>> {
    println!(
        "{}",
        format!("Found {} apply runs:", candidates.len()).blue()
    );
    println!();
    for (i, run) in candidates.iter().take(10).enumerate() {
        let dry_marker = if run.mode.is_dry_run() { " (dry-run)" } else { "" };
        println!(
            "  {}. {}, {} files ({}){}",
            i + 1,
            run.age_description(),
            run.total_files,
            run.mode.describe(),
            dry_marker,
        );
        println!(
            "     {} → {}",
            run.source_root.display(),
            run.destination_root.display()
        );
    }
    if candidates.len() > 10 {
        println!("  ... and {} more", candidates.len() - 10);
    }
    println!();

    Ok(prompt_index("Select run number (or 0 to cancel)", candidates.len().min(10))?
        .map(|index| candidates[index].clone()))
}

fn choose_report(candidates: &[ReportSummary]) -> io::Result<Option<ReportSummary>> {
    println!(
        "{}",
        format!("Found {} verification reports:", candidates.len()).blue()
    );
    println!();
    for (i, report) in candidates.iter().take(10).enumerate() {
        println!(
            "  {}. {}, {} OK / {} total",
            i + 1,
            report.age_description(),
            report.summary.cleanup_eligible(),
            report.summary.total,
        );
        println!("     {}", report.source_root.display());
    }
    if candidates.len() > 10 {
        println!("  ... and {} more", candidates.len() - 10);
    }
    println!();

    Ok(prompt_index(
        "Select verification number (or 0 to cancel)",
        candidates.len().min(10),
    )?
    .map(|index| candidates[index].clone()))
}

fn prompt_index(prompt: &str, count: usize) -> io::Result<Option<usize>> {
    let mut input = String::new();

    loop {
        input.clear();
        print!("{} [1]: ", prompt);
        io::stdout().flush()?;
        io::stdin().read_line(&mut input)?;

        let trimmed = input.trim();
        let choice = if trimmed.is_empty() {
            1
        } else {
            match trimmed.parse::<usize>() {
                Ok(n) => n,
                Err(_) => continue,
            }
        };
        if choice == 0 {
            return Ok(None);
        }
        if choice <= count {
            return Ok(Some(choice - 1));
        }
    }
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
