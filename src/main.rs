// crabtriage - GPL-3.0-or-later
// This file is part of crabtriage.
//
// Copyright (C) 2025 Daniel Freiermuth
//
// crabtriage is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// crabtriage is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with crabtriage.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crabtriage::config::{GlobalConfig, TOKEN_ENV};
use crabtriage::export::{self, OutputFormat};
use crabtriage::fetch::GithubClient;
use crabtriage::{analyze_log, rank_failures, FailureRecord, SortOrder, TimeWindow};
use rayon::prelude::*;
use serde::Serialize;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "ram-profiling")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

#[derive(Parser, Debug)]
#[command(name = "crabtriage")]
#[command(author = "Daniel Freiermuth")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
#[command(about = "Find and group failures in CI job logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path for the DHAT heap profiling output (only used when built with --features ram-profiling)
    #[cfg(feature = "ram-profiling")]
    #[arg(
        long = "profile-output",
        value_name = "PROFILE_FILE",
        default_value = "dhat-heap.json",
        global = true
    )]
    profile_output: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze local log files ("-" reads stdin)
    Analyze {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Start of the step to look at (RFC 3339)
        #[arg(long, value_name = "TIME", requires = "completed_at")]
        started_at: Option<String>,

        /// End of the step to look at (RFC 3339)
        #[arg(long, value_name = "TIME", requires = "started_at")]
        completed_at: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Download a GitHub Actions job log and analyze its failed step
    Github {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        repo: String,

        #[arg(long = "job", value_name = "JOB_ID")]
        job_id: u64,

        /// Access token, overrides $GITHUB_TOKEN and the stored token
        #[arg(long)]
        token: Option<String>,

        /// Analyze this step instead of the first failed one
        #[arg(long, value_name = "NAME", conflicts_with = "whole_log")]
        step: Option<String>,

        /// Do not restrict the log to a step
        #[arg(long)]
        whole_log: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show or change stored settings
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct OutputArgs {
    #[arg(long, short, value_enum)]
    format: Option<OutputFormat>,

    #[arg(long, short, value_enum)]
    sort: Option<SortOrder>,
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Store a GitHub access token ("" clears it)
    #[arg(long)]
    token: Option<String>,

    /// Store a GitHub Enterprise API endpoint ("" clears it)
    #[arg(long, value_name = "URL")]
    api_base_url: Option<String>,

    /// Store the default output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Store the default sort order
    #[arg(long, value_enum)]
    sort: Option<SortOrder>,

    /// Print the settings after applying any changes
    #[arg(long)]
    show: bool,
}

impl ConfigArgs {
    /// Write the given settings into `config`. Returns false when nothing was given.
    fn apply(self, config: &mut GlobalConfig) -> bool {
        let mut changed = false;
        if let Some(token) = self.token {
            config.github_token = Some(token).filter(|t| !t.is_empty());
            changed = true;
        }
        if let Some(url) = self.api_base_url {
            config.api_base_url = Some(url).filter(|u| !u.is_empty());
            changed = true;
        }
        if self.format.is_some() {
            config.default_format = self.format;
            changed = true;
        }
        if self.sort.is_some() {
            config.sort = self.sort;
            changed = true;
        }
        changed
    }
}

#[derive(Debug, Serialize)]
struct Report {
    source: String,
    failures: Option<Vec<FailureRecord>>,
}

fn main() -> Result<()> {
    // Set RUST_LOG to override (e.g., RUST_LOG=crabtriage=debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    #[cfg(feature = "ram-profiling")]
    let _profiler = {
        tracing::info!("RAM profiling enabled, output: {:?}", cli.profile_output);
        dhat::Profiler::builder()
            .file_name(cli.profile_output.clone())
            .build()
    };

    #[cfg(feature = "cpu-profiling")]
    {
        tracy_client::Client::start();
        tracing::info!("CPU profiling enabled with Tracy - run Tracy profiler to connect");
    }

    tracing::debug!(
        "crabtriage starting up (version {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let config = GlobalConfig::load();

    match cli.command {
        Command::Analyze {
            files,
            started_at,
            completed_at,
            output,
        } => {
            let window = TimeWindow::from_bounds(started_at.as_deref(), completed_at.as_deref())?;
            let reports = analyze_files(&files, window.as_ref())?;
            emit(&config, &output, reports)
        }
        Command::Github {
            owner,
            repo,
            job_id,
            token,
            step,
            whole_log,
            output,
        } => {
            let env_token = std::env::var(TOKEN_ENV).ok();
            let token = config.resolve_token(token.as_deref(), env_token.as_deref());
            if token.is_none() {
                tracing::warn!("No GitHub token configured, private repositories will fail");
            }

            let client = GithubClient::new(config.api_base_url(), token)?;
            let job = client
                .job(&owner, &repo, job_id)
                .with_context(|| format!("Failed to fetch job {job_id}"))?;

            let window = if whole_log {
                None
            } else if let Some(name) = step.as_deref() {
                let Some(step) = job.step(name) else {
                    bail!("Job {job_id} has no step named {name:?}");
                };
                step.window()
            } else if let Some(step) = job.failed_step() {
                tracing::info!("Looking at failed step #{} {:?}", step.number, step.name);
                step.window()
            } else {
                tracing::info!("Job {job_id} has no failed step, analyzing the whole log");
                None
            };

            let raw = client
                .job_logs(&owner, &repo, job_id)
                .with_context(|| format!("Failed to download log of job {job_id}"))?;
            let reports = vec![Report {
                source: job.name,
                failures: analyze_log(&raw, window.as_ref()),
            }];
            emit(&config, &output, reports)
        }
        Command::Config(args) => update_config(config, args),
    }
}

fn analyze_files(files: &[PathBuf], window: Option<&TimeWindow>) -> Result<Vec<Report>> {
    if files.iter().filter(|f| f.as_os_str() == "-").count() > 1 {
        bail!("stdin (-) can only be given once");
    }

    files
        .par_iter()
        .map(|path| {
            let raw = read_log(path)?;
            Ok(Report {
                source: path.display().to_string(),
                failures: analyze_log(&raw, window),
            })
        })
        .collect()
}

fn read_log(path: &Path) -> Result<String> {
    let mut buffer = Vec::new();
    if path.as_os_str() == "-" {
        std::io::stdin()
            .read_to_end(&mut buffer)
            .context("Cannot read log from stdin")?;
    } else {
        buffer = std::fs::read(path)
            .with_context(|| format!("Cannot read log file {}", path.display()))?;
    }
    tracing::debug!(bytes = buffer.len(), "Read {}", path.display());

    // Lossy conversion so stray binary output in a log does not abort the run
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn emit(config: &GlobalConfig, output: &OutputArgs, mut reports: Vec<Report>) -> Result<()> {
    let format = config.format(output.format);
    let order = config.sort(output.sort);

    for report in &mut reports {
        match report.failures.as_mut() {
            Some(failures) => {
                rank_failures(failures, order);
                tracing::info!("{}: {} distinct failure(s)", report.source, failures.len());
            }
            None => tracing::info!("{}: no failures found", report.source),
        }
    }

    let rendered = if let [report] = reports.as_slice() {
        export::render(format, report.failures.as_deref())?
    } else {
        render_many(format, &reports)?
    };

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Several documents: a JSON array of `{source, failures}`, CSV with a
/// `source` column, or one text section per document.
fn render_many(format: OutputFormat, reports: &[Report]) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(reports)?;
            json.push('\n');
            json
        }
        OutputFormat::Csv => export::to_csv_by_source(
            reports
                .iter()
                .map(|r| (r.source.as_str(), r.failures.as_deref())),
        )?,
        OutputFormat::Text => reports
            .iter()
            .map(|r| format!("==> {} <==\n{}", r.source, export::to_text(r.failures.as_deref())))
            .collect::<Vec<_>>()
            .join("\n"),
    })
}

fn update_config(mut config: GlobalConfig, args: ConfigArgs) -> Result<()> {
    let show = args.show;
    let changed = args.apply(&mut config);

    if changed {
        let path = config.save().context("Failed to save config")?;
        eprintln!("Saved settings to {}", path.display());
    }
    if show || !changed {
        println!("{}", shown_config(&config)?);
    }
    Ok(())
}

/// Pretty JSON of the settings with the token hidden.
fn shown_config(config: &GlobalConfig) -> Result<String> {
    let mut shown = config.clone();
    if shown.github_token.is_some() {
        shown.github_token = Some("<set>".to_string());
    }
    Ok(serde_json::to_string_pretty(&shown)?)
}
