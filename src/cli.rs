use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use log::{debug, error, info, warn};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::auth::Token;
use crate::config::{Config, OutputFormat, ProjectConfig};
use crate::error::WatchError;
use crate::notified::InMemoryNotifiedStore;
use crate::notify::{build_message, TeamsNotifier};
use crate::output::{export_report, RunProgress};
use crate::providers::optimizely::{OptimizelyClient, OptimizelyProvider};
use crate::report::{RunReport, TimeWindow};

#[derive(Parser)]
#[command(name = "launchwatch")]
#[command(
    author,
    version,
    about = "Reports Optimizely experiments launched to real users",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./launchwatch.toml or the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    /// Hide the banner and progress spinners
    #[arg(short, long, global = true, default_value_t = false)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the last window once and report launched experiments
    Run(RunArgs),

    /// Check every interval until interrupted
    Watch {
        #[command(flatten)]
        run: RunArgs,

        #[arg(short, long, default_value_t = 60)]
        interval_minutes: u64,
    },

    /// Validate the configuration and print the effective settings
    CheckConfig(RunArgs),
}

#[derive(Args, Clone)]
struct RunArgs {
    #[arg(short, long, env = "OPTLY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Tracked project as <id>:<qa-audience-id>[:<label>]; replaces configured projects
    #[arg(short = 'P', long = "project", value_name = "ID:QA_AUDIENCE[:LABEL]")]
    projects: Vec<ProjectConfig>,

    #[arg(short, long)]
    window_minutes: Option<u32>,

    /// End of the window (RFC 3339); defaults to now
    #[arg(long)]
    end: Option<DateTime<Utc>>,

    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    #[arg(long, env = "TEAMS_WEBHOOK_URL", hide_env_values = true)]
    webhook_url: Option<String>,

    /// Skip posting to the webhook even if one is configured
    #[arg(long, default_value_t = false)]
    no_notify: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(token) = &self.token {
            config.optimizely.token = Some(token.clone());
        }
        if !self.projects.is_empty() {
            config.projects.clone_from(&self.projects);
        }
        if let Some(minutes) = self.window_minutes {
            config.window.minutes = minutes;
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(url) = &self.webhook_url {
            config.notify.webhook_url = Some(url.clone());
        }
        if self.no_notify {
            config.notify.webhook_url = None;
        }
    }
}

/// Everything one run needs, built once and reused across watch ticks.
struct Runner {
    provider: OptimizelyProvider,
    notifier: Option<TeamsNotifier>,
    notified: Arc<InMemoryNotifiedStore>,
    config: Config,
    output: Option<PathBuf>,
    pretty: bool,
    show_progress: bool,
}

impl Runner {
    fn new(config: Config, output: Option<PathBuf>, pretty: bool, quiet: bool) -> Result<Self> {
        let settings = &config.optimizely;
        let request_timeout = Duration::from_secs(settings.request_timeout_secs);

        let client = OptimizelyClient::new(
            &settings.base_url,
            Token::from(settings.token.as_deref().unwrap_or_default()),
            request_timeout,
            settings.per_page,
            settings.max_pages,
        )?;

        let notifier = config
            .notify
            .webhook_url
            .as_deref()
            .map(|url| TeamsNotifier::new(url, request_timeout))
            .transpose()?;
        if notifier.is_none() {
            info!("No webhook configured, results are only written to the output");
        }

        let notified = Arc::new(InMemoryNotifiedStore::new());
        let provider = OptimizelyProvider::new(
            client,
            config.projects.clone(),
            config.targeting.clone(),
            Arc::clone(&notified) as Arc<dyn crate::notified::NotifiedStore>,
        );

        Ok(Self {
            provider,
            notifier,
            notified,
            pretty: pretty || config.output.pretty,
            config,
            output,
            show_progress: !quiet,
        })
    }

    /// Classifies one window, writes the report and delivers the card.
    ///
    /// Reported experiments are committed to the notified store only after
    /// delivery succeeds.
    async fn run_once(&self, end: Option<DateTime<Utc>>) -> Result<RunReport> {
        let window = TimeWindow::ending_at(end.unwrap_or_else(Utc::now), self.config.window.minutes);
        let deadline_secs = self.config.optimizely.run_timeout_secs;

        let progress = RunProgress::start_phase_1(self.show_progress);

        let report = match tokio::time::timeout(
            Duration::from_secs(deadline_secs),
            self.provider.collect_launches(window),
        )
        .await
        {
            Ok(report) => report,
            Err(_) => {
                progress.abandon("Phase 1/2: Run deadline exceeded");
                return Err(WatchError::RunDeadline(deadline_secs).into());
            }
        };

        let progress = progress.finish_phase_1_start_phase_2(report.experiments.len());

        self.write_report(&report)?;

        if let Err(e) = self.deliver(&report).await {
            progress.abandon("Phase 2/2: Delivery failed");
            return Err(e);
        }

        self.provider.commit(&report);
        debug!("{} notifications remembered", self.notified.len());
        progress.finish_phase_2();

        Ok(report)
    }

    /// Runs immediately, then once per `interval`, until `shutdown` resolves.
    ///
    /// `shutdown` is also polled while a run is in flight; an interrupted run
    /// commits nothing.
    async fn watch(&self, interval: Duration, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => break,
            }

            tokio::select! {
                result = self.run_once(None) => {
                    if let Err(e) = result {
                        error!("Run failed: {e:#}");
                    }
                }
                _ = &mut shutdown => {
                    warn!("Run interrupted");
                    break;
                }
            }
        }

        info!("Shutting down");
    }

    fn write_report(&self, report: &RunReport) -> Result<()> {
        let format = self.config.output.format;

        if let Some(path) = &self.output {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            export_report(report, format, self.pretty, &mut file)?;
            info!("Report written to: {}", path.display());
        } else {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            export_report(report, format, self.pretty, &mut handle)?;
        }

        Ok(())
    }

    async fn deliver(&self, report: &RunReport) -> Result<()> {
        if !report.has_launches() {
            info!("No experiments in production");
            return Ok(());
        }

        let Some(notifier) = &self.notifier else {
            return Ok(());
        };

        info!("Building notification message...");
        let message = build_message(&report.experiments, &report.window, &self.config.notify);
        notifier
            .send(&message)
            .await
            .context("Failed to deliver notification")
    }
}

impl Cli {
    pub fn quiet(&self) -> bool {
        self.quiet
    }

    fn load_config(&self, args: &RunArgs) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        args.apply(&mut config);
        config.validate()?;

        for project in &config.projects {
            info!("Tracking project {project}");
        }

        Ok(config)
    }

    async fn execute_run(&self, args: &RunArgs) -> Result<()> {
        let config = self.load_config(args)?;
        let runner = Runner::new(config, self.output.clone(), self.pretty, self.quiet)?;

        runner.run_once(args.end).await?;

        Ok(())
    }

    async fn execute_watch(&self, args: &RunArgs, interval_minutes: u64) -> Result<()> {
        let config = self.load_config(args)?;
        let runner = Runner::new(config, self.output.clone(), self.pretty, self.quiet)?;

        if args.end.is_some() {
            warn!("--end is ignored in watch mode");
        }

        info!("Checking for launches every {interval_minutes} minutes, press Ctrl-C to stop");

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        };

        runner
            .watch(Duration::from_secs(interval_minutes.max(1) * 60), shutdown)
            .await;

        Ok(())
    }

    fn execute_check_config(&self, args: &RunArgs) -> Result<()> {
        let config = self.load_config(args)?;
        let rendered = toml::to_string_pretty(&config.redacted())?;

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, rendered)?;
            info!("Effective configuration written to: {}", output_path.display());
        } else {
            println!("{rendered}");
        }

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Run(args) => self.execute_run(args).await,
            Commands::Watch {
                run,
                interval_minutes,
            } => self.execute_watch(run, *interval_minutes).await,
            Commands::CheckConfig(args) => self.execute_check_config(args),
        }
    }
}
