use anyhow::{Result, bail};
use chrono::{DateTime, Local};
use console::{Term, style};
use phai_core::EngineConfig;
use phai_index::{
    FfmpegFrameSource, HttpEmbeddingClient, IndexMode, IndexReport, JobController, JobId,
    JobOutcome, JobSnapshot, JobState, Query, SearchResult,
};
use std::path::Path;
use std::time::SystemTime;
use tokio::signal::ctrl_c;
use tracing::info;

type Controller = JobController<HttpEmbeddingClient, FfmpegFrameSource>;

/// Configuration from `path` when given, otherwise defaults plus environment
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::from_env(),
    };
    Ok(config)
}

fn build_controller(config: EngineConfig) -> Result<Controller> {
    let provider = HttpEmbeddingClient::new(&config.provider)?;
    let frames = FfmpegFrameSource::new(&config.sampler);
    Ok(JobController::new(provider, frames, config))
}

/// Follow a job until it ends, drawing progress on stderr.
///
/// The first Ctrl-C asks the job to stop; it still ends through the
/// controller so the store is persisted before the process exits.
async fn follow(controller: &Controller, id: JobId) -> Result<JobSnapshot> {
    let term = Term::stderr();
    let mut receiver = controller.subscribe(id)?;
    let mut interrupted = false;

    loop {
        let snapshot = receiver.borrow_and_update().clone();
        if snapshot.state.is_terminal() {
            if term.is_term() {
                term.clear_line()?;
            }
            return Ok(snapshot);
        }
        if term.is_term() {
            draw_progress(&term, &snapshot)?;
        }

        tokio::select! {
            changed = receiver.changed() => {
                if changed.is_err() {
                    return Ok(controller.poll_progress(id)?);
                }
            }
            signal = ctrl_c(), if !interrupted => {
                signal?;
                interrupted = true;
                term.clear_line()?;
                term.write_line(&format!("{}", style("Stopping, finishing the current item...").yellow()))?;
                controller.stop(id)?;
            }
        }
    }
}

fn draw_progress(term: &Term, snapshot: &JobSnapshot) -> Result<()> {
    let progress = &snapshot.progress;
    let current = progress
        .current
        .as_deref()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    term.clear_line()?;
    term.write_str(&format!(
        "{} {}/{} {}",
        style(snapshot.state.label()).cyan(),
        progress.processed,
        progress.total,
        style(current).dim()
    ))?;
    Ok(())
}

fn format_time(time: Option<SystemTime>) -> String {
    time.map_or_else(
        || "-".to_owned(),
        |time| DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M").to_string(),
    )
}

pub async fn handle_index(config: EngineConfig, root: &Path, full: bool, json: bool) -> Result<()> {
    let mode = if full {
        IndexMode::Full
    } else {
        IndexMode::Incremental
    };
    let controller = build_controller(config)?;
    let id = controller.start_index(root, mode)?;
    info!("Started index job {id} for {}", root.display());

    let snapshot = follow(&controller, id).await?;
    match snapshot.state {
        JobState::Completed(JobOutcome::Indexed(report)) => {
            if json {
                Term::stdout().write_line(&serde_json::to_string_pretty(&report)?)?;
            } else {
                print_report(&report)?;
            }
        }
        JobState::Cancelled => {
            Term::stdout().write_line(&format!(
                "{}",
                style("Indexing cancelled; records written so far were kept").yellow()
            ))?;
        }
        JobState::Failed(cause) => bail!("Index job failed: {cause}"),
        other => bail!("Index job ended in unexpected state '{}'", other.label()),
    }
    Ok(())
}

fn print_report(report: &IndexReport) -> Result<()> {
    let term = Term::stdout();
    term.write_line(&format!(
        "{}",
        style(format!("Indexed {} files", report.discovered)).green().bold()
    ))?;
    term.write_line(&format!("  embedded:  {}", report.embedded))?;
    term.write_line(&format!("  unchanged: {}", report.unchanged))?;
    term.write_line(&format!("  removed:   {}", report.removed))?;
    term.write_line(&format!("  skipped:   {}", report.skipped.len()))?;
    for skipped in &report.skipped {
        term.write_line(&format!(
            "    {} {}",
            style(skipped.path.display()).yellow(),
            style(&skipped.reason).dim()
        ))?;
    }
    Ok(())
}

pub async fn handle_search(
    config: EngineConfig,
    text: String,
    limit: Option<usize>,
    threshold: Option<f32>,
    json: bool,
) -> Result<()> {
    let mut query = Query::new(text);
    if let Some(limit) = limit {
        query = query.with_limit(limit);
    }
    if let Some(threshold) = threshold {
        query = query.with_threshold(threshold);
    }
    query.validate()?;

    let controller = build_controller(config)?;
    let id = controller.start_search(query)?;
    let snapshot = follow(&controller, id).await?;
    match snapshot.state {
        JobState::Completed(JobOutcome::Searched(result)) => {
            if json {
                Term::stdout().write_line(&serde_json::to_string_pretty(&result)?)?;
            } else {
                print_results(&result)?;
            }
        }
        JobState::Cancelled => {
            Term::stdout().write_line(&format!("{}", style("Search cancelled").yellow()))?;
        }
        JobState::Failed(cause) => bail!("Search job failed: {cause}"),
        other => bail!("Search job ended in unexpected state '{}'", other.label()),
    }
    Ok(())
}

fn print_results(result: &SearchResult) -> Result<()> {
    let term = Term::stdout();
    if result.is_empty() {
        term.write_line(&format!(
            "{}",
            style(format!("No matches among {} indexed items", result.scanned)).yellow()
        ))?;
        return Ok(());
    }

    for (rank, item) in result.items.iter().enumerate() {
        term.write_line(&format!(
            "{:>3}. {} {:<5} {} {}",
            rank + 1,
            style(format!("{:.3}", item.score)).green(),
            item.kind.as_str(),
            item.path.display(),
            style(format_time(item.created_at)).dim()
        ))?;
    }
    term.write_line(&format!(
        "{}",
        style(format!(
            "{} of {} items matched ({} prompts)",
            result.len(),
            result.scanned,
            result.prompts.len()
        ))
        .dim()
    ))?;
    Ok(())
}

pub async fn handle_stats(config: EngineConfig, json: bool) -> Result<()> {
    let dir = config.resolve_index_dir();
    let controller = build_controller(config)?;
    let stats = controller.stats().await?;
    let term = Term::stdout();

    if json {
        term.write_line(&serde_json::to_string_pretty(&stats)?)?;
        return Ok(());
    }

    term.write_line(&format!("{}", style("Index").cyan().bold()))?;
    term.write_line(&format!("  location:  {}", dir.display()))?;
    term.write_line(&format!("  records:   {}", stats.total))?;
    term.write_line(&format!("  images:    {}", stats.images))?;
    term.write_line(&format!("  videos:    {}", stats.videos))?;
    term.write_line(&format!(
        "  dimension: {}",
        stats
            .dimension
            .map_or_else(|| "-".to_owned(), |dimension| dimension.to_string())
    ))?;
    Ok(())
}

pub fn handle_config(config: &EngineConfig, full: bool) -> Result<()> {
    let term = Term::stdout();
    if full {
        term.write_line(&toml::to_string_pretty(config)?)?;
        return Ok(());
    }

    term.write_line(&format!("{}", style("Configuration").cyan().bold()))?;
    term.write_line(&format!("  index:     {}", config.resolve_index_dir().display()))?;
    term.write_line(&format!(
        "  provider:  {} ({})",
        config.provider.endpoint, config.provider.model
    ))?;
    term.write_line(&format!(
        "  sampler:   {} frames, {:?}, {}",
        config.sampler.frames,
        config.sampler.policy,
        config.sampler.aggregation.as_str()
    ))?;
    term.write_line(&format!(
        "  query:     limit {}, threshold {}",
        config.query.default_limit,
        config
            .query
            .threshold
            .map_or_else(|| "none".to_owned(), |threshold| threshold.to_string())
    ))?;
    Ok(())
}
