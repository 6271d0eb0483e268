//! Command handlers for ISO Fetcher CLI
//!
//! Each handler builds an [`ArchiveService`] from the loaded configuration and
//! drives one operation, printing a short human-readable report.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::app::archive::ArchiveConfig;
use crate::app::jobs::{DownloadJob, JobStatus, SubmitOptions};
use crate::app::service::ArchiveService;
use crate::cli::{
    CheckArgs, DeleteArgs, DiscoverArgs, DownloadArgs, GlobalArgs, ListArgs, VerifyArgs,
};
use crate::config::AppConfig;
use crate::constants::jobs::POLL_INTERVAL;
use crate::errors::{AppError, DownloadError, ParseError, Result};

/// Build the service from configuration, honouring `--archive-dir`
fn build_service(global: &GlobalArgs, config: &AppConfig) -> Result<ArchiveService> {
    let mut runtime = config.to_runtime_config();

    if let Some(dir) = &global.archive_dir {
        let catalog_name = runtime
            .archive
            .catalog_file
            .file_name()
            .map(|name| name.to_os_string());
        runtime.archive = ArchiveConfig::new(dir);
        if let Some(name) = catalog_name {
            runtime.archive = runtime.archive.with_catalog_file(dir.join(name));
        }
    }
    debug!("Archive directory: {}", runtime.archive.archive_dir.display());

    Ok(ArchiveService::new(runtime)?)
}

/// Handle the download command
///
/// Submits a job, then polls it until it finishes while rendering a progress
/// bar. Ctrl-C cancels the job and removes the partial file.
pub async fn handle_download(
    global: &GlobalArgs,
    config: &AppConfig,
    args: DownloadArgs,
) -> Result<()> {
    let service = build_service(global, config)?;

    let mut options = SubmitOptions::default().with_force(args.force);
    if args.no_discover {
        options = options.with_discovery(false);
    }
    if let Some(algorithm) = args.algorithm {
        options = options.with_hash_algorithm(algorithm);
    }
    if let Some(hash) = args.hash {
        options = options.with_expected_hash(hash);
    }
    if let Some(dir) = args.output {
        options = options.with_output_directory(dir);
    }
    options.hash_file_pattern = args.hash_pattern;

    let id = service.submit_download(&args.url, options).await;
    info!("Submitted job {} for {}", id, args.url);

    let progress = download_bar(global.quiet);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let job = loop {
        let job = service.job_status(id).await?;
        render_progress(&progress, &job);
        if job.status.is_terminal() {
            break job;
        }

        tokio::select! {
            _ = &mut ctrl_c => {
                warn!("Interrupted, cancelling job {}", id);
                if let Err(e) = service.tracker().cancel(id).await {
                    debug!("Cancel after interrupt: {}", e);
                }
                let job = service
                    .tracker()
                    .poll_until_finished(id, POLL_INTERVAL)
                    .await?;
                break job;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    };
    progress.finish_and_clear();

    if !args.force && refused_overwrite(&job) {
        eprintln!("Use --force to replace the existing file");
    }
    report_download(&job, args.strict)
}

/// Whether the job failed because its destination file already existed
fn refused_overwrite(job: &DownloadJob) -> bool {
    job.status == JobStatus::Error
        && job
            .error
            .as_deref()
            .is_some_and(|message| message.starts_with("File already exists"))
}

fn download_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let progress = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, ETA: {eta}) {msg}",
        )
        .map(|style| style.progress_chars("##-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

fn render_progress(progress: &ProgressBar, job: &DownloadJob) {
    if job.total_bytes > 0 && progress.length() != Some(job.total_bytes) {
        progress.set_length(job.total_bytes);
    }
    progress.set_position(job.bytes_transferred);
    progress.set_message(job.status.to_string());
}

fn report_download(job: &DownloadJob, strict: bool) -> Result<()> {
    match job.status {
        JobStatus::Completed => {
            let Some(outcome) = &job.result else {
                return Err(AppError::generic("completed job carries no result"));
            };

            println!("Downloaded {}", outcome.path.display());
            println!("  {}: {}", outcome.hash_algorithm, outcome.hash);
            println!("  Size: {} bytes in {:.1?}", outcome.size, outcome.duration);
            match &outcome.expected_hash {
                Some(_) if outcome.success => println!("  Checksum verified"),
                Some(expected) => {
                    println!("  Checksum MISMATCH (expected {})", expected);
                    if strict {
                        return Err(DownloadError::HashMismatch {
                            expected: expected.clone(),
                            actual: outcome.hash.clone(),
                        }
                        .into());
                    }
                }
                None => println!("  No published checksum found; not verified"),
            }
            Ok(())
        }
        JobStatus::Cancelled | JobStatus::Paused => {
            println!("{}", job.status_description());
            Ok(())
        }
        _ => Err(AppError::generic(job.status_description())),
    }
}

/// Handle the verify command
pub async fn handle_verify(
    global: &GlobalArgs,
    config: &AppConfig,
    args: VerifyArgs,
) -> Result<()> {
    let service = build_service(global, config)?;
    let algorithm = args.algorithm.unwrap_or(service.default_algorithm());

    let outcome = service.verify_file(&args.file, &args.hash, algorithm).await?;
    if outcome.is_valid {
        println!("OK {} ({})", args.file.display(), outcome.hash_algorithm);
        Ok(())
    } else {
        println!("MISMATCH {}", args.file.display());
        println!("  expected: {}", outcome.expected);
        println!("  actual:   {}", outcome.hash);
        Err(DownloadError::HashMismatch {
            expected: outcome.expected,
            actual: outcome.hash,
        }
        .into())
    }
}

/// Handle the list command
pub async fn handle_list(
    global: &GlobalArgs,
    config: &AppConfig,
    args: ListArgs,
) -> Result<()> {
    let service = build_service(global, config)?;

    if args.reconcile {
        let dropped = service.reconcile_archive().await?;
        for record in &dropped {
            println!("Dropped stale record {}", record.filename);
        }
    }

    let records = service.list_archive().await;
    if args.json {
        let rendered = serde_json::to_string_pretty(&records).map_err(ParseError::from)?;
        println!("{}", rendered);
        return Ok(());
    }

    if records.is_empty() {
        println!(
            "Archive at {} is empty",
            service.archive().archive_dir.display()
        );
        return Ok(());
    }

    println!("{:<40} {:<12} {:>14}  {}", "FILE", "VERSION", "SIZE", "ADDED");
    for record in &records {
        println!(
            "{:<40} {:<12} {:>14}  {}",
            record.filename,
            record.version.as_deref().unwrap_or("-"),
            record.size,
            record.added_date.format("%Y-%m-%d %H:%M")
        );
    }
    println!("{} images", records.len());
    Ok(())
}

/// Handle the delete command
pub async fn handle_delete(
    global: &GlobalArgs,
    config: &AppConfig,
    args: DeleteArgs,
) -> Result<()> {
    let service = build_service(global, config)?;
    service.delete_archive_entry(&args.filename).await?;
    println!("Deleted {}", args.filename);
    Ok(())
}

/// Handle the check command
pub async fn handle_check(
    global: &GlobalArgs,
    config: &AppConfig,
    args: CheckArgs,
) -> Result<()> {
    let service = build_service(global, config)?;
    let listing = service.fetch_listing(args.url.as_deref()).await?;
    let statuses = service.check_updates(&listing).await;

    let mut pending = 0;
    for status in &statuses {
        let state = if !status.in_archive {
            "missing"
        } else if status.update_available {
            "update"
        } else {
            "current"
        };
        if state != "current" {
            pending += 1;
        } else if args.pending {
            continue;
        }
        println!("{:<8} {}", state, status.name);
    }
    println!("{} of {} entries need downloading", pending, statuses.len());
    Ok(())
}

/// Handle the discover command
pub async fn handle_discover(
    global: &GlobalArgs,
    config: &AppConfig,
    args: DiscoverArgs,
) -> Result<()> {
    let service = build_service(global, config)?;
    match service.discover_hash(&args.url, args.algorithm).await {
        Some(found) => {
            println!("{}", found.hash);
            println!("  from {} ({})", found.source_url, found.pattern);
            Ok(())
        }
        None => Err(AppError::generic(format!(
            "no published checksum found for {}",
            args.url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::app::client::DownloadOutcome;
    use crate::app::hash::HashAlgorithm;
    use crate::app::jobs::JobId;

    fn completed_job(expected: Option<&str>, success: bool) -> DownloadJob {
        let mut job = DownloadJob::new(
            JobId::from(1),
            "a.iso".to_string(),
            "https://example.org/a.iso".to_string(),
            PathBuf::from("/tmp"),
            HashAlgorithm::Sha256,
            expected.map(str::to_string),
        );
        job.status = JobStatus::Completed;
        job.result = Some(DownloadOutcome {
            success,
            path: PathBuf::from("/tmp/a.iso"),
            filename: "a.iso".to_string(),
            hash: "aa".to_string(),
            expected_hash: expected.map(str::to_string),
            hash_algorithm: HashAlgorithm::Sha256,
            size: 2,
            duration: Duration::from_millis(5),
        });
        job
    }

    #[test]
    fn test_report_mismatch_fails_only_when_strict() {
        let job = completed_job(Some("bb"), false);
        assert!(report_download(&job, false).is_ok());
        assert!(report_download(&job, true).is_err());
    }

    #[test]
    fn test_report_error_status_is_error() {
        let mut job = completed_job(None, true);
        job.status = JobStatus::Error;
        job.result = None;
        job.error = Some("HTTP 404".to_string());
        assert!(report_download(&job, false).is_err());
    }

    #[test]
    fn test_refused_overwrite_detection() {
        let mut job = completed_job(None, true);
        job.status = JobStatus::Error;
        job.result = None;
        job.error = Some(
            DownloadError::DestinationExists {
                path: PathBuf::from("/tmp/a.iso"),
            }
            .to_string(),
        );
        assert!(refused_overwrite(&job));
        assert!(!job.error.as_deref().unwrap_or_default().contains("--force"));

        job.error = Some("HTTP 404".to_string());
        assert!(!refused_overwrite(&job));
    }
}
