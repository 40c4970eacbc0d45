mod render;
mod ui;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ttydash_client::{
    ChromiumDriver, DeparturesJob, FfmpegTranscoder, ImageDecoder, SpoonsJob, StationStatusJob,
    TubeStatusJob, YtDlpSource,
};
use ttydash_core::media::{MediaCachePipeline, MediaHandle, MediaPlayer};
use ttydash_core::models::PanelRecord;
use ttydash_core::{
    CoordinatorConfig, DashboardConfig, DashboardCoordinator, ExtractionJob, FixtureSource,
    LiveSource, ManagedResource, PanelConfig, PanelSource, PanelSpec, Records, ResourceSession,
    TracingPanelReporter,
};

use crate::render::RenderOptions;

#[derive(Parser)]
#[command(name = "ttydash", version, about = "Terminal dashboard for London transport, pubs and ASCII video")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full-screen dashboard
    Run {
        /// Also play the ASCII video pane
        #[arg(long, default_value_t = false)]
        media: bool,

        /// Serve fixture data instead of launching a browser
        #[arg(long, default_value_t = false)]
        test_data: bool,
    },

    /// Extract one source once and print it
    Scrape {
        #[arg(value_enum)]
        target: Target,

        /// Print records as JSON instead of styled text
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Serve fixture data instead of launching a browser
        #[arg(long, default_value_t = false)]
        test_data: bool,
    },

    /// Fetch, convert and play one cached clip as ASCII
    Media,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Target {
    Tfl,
    Stations,
    Rail,
    Pubs,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ttydash=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = DashboardConfig::from_env().context("Invalid configuration")?;

    match cli.command {
        Commands::Run { media, test_data } => {
            config.use_test_data |= test_data;
            cmd_run(&config, media).await?;
        }
        Commands::Scrape {
            target,
            json,
            test_data,
        } => {
            config.use_test_data |= test_data;
            cmd_scrape(&config, target, json).await?;
        }
        Commands::Media => cmd_media(&config).await?,
    }

    Ok(())
}

fn render_options(config: &DashboardConfig) -> RenderOptions {
    RenderOptions {
        tty: config.tty_mode,
        show_description: config.show_tfl_description,
        max_departures: config.max_rail_departures,
    }
}

fn spoons_job(config: &DashboardConfig) -> Result<Option<SpoonsJob>> {
    config
        .pubs
        .clone()
        .map(SpoonsJob::new)
        .transpose()
        .context("Invalid pub search location")
}

/// A panel source for `job`: fixture data in test mode, the shared browser otherwise.
fn source_for<J: ExtractionJob>(
    job: J,
    session: Option<&Arc<ResourceSession<ChromiumDriver>>>,
) -> Arc<dyn PanelSource> {
    match session {
        Some(session) => Arc::new(LiveSource::new(Arc::clone(session), job)),
        None => Arc::new(FixtureSource::from_job(&job)),
    }
}

fn build_panels(
    config: &DashboardConfig,
) -> Result<(Vec<PanelSpec>, Vec<Arc<dyn ManagedResource>>)> {
    let session = (!config.use_test_data).then(|| {
        Arc::new(ResourceSession::new(
            ChromiumDriver::new(config.chrome_bin.clone()),
            config.session.clone(),
        ))
    });
    let tick = config.screen_refresh_interval;

    let mut panels = vec![
        PanelSpec::new(
            PanelConfig::new("tfl", "TFL Tube Status", config.tfl_refresh_interval).with_tick(tick),
            source_for(TubeStatusJob, session.as_ref()),
        ),
        PanelSpec::new(
            PanelConfig::new("rail", "Departures", config.rail_refresh_interval).with_tick(tick),
            source_for(DeparturesJob::new(&config.rail_station), session.as_ref()),
        ),
    ];
    if let Some(job) = spoons_job(config)? {
        panels.push(PanelSpec::new(
            PanelConfig::new("pubs", "Wetherspoons Near me", config.pubs_refresh_interval)
                .with_tick(tick),
            source_for(job, session.as_ref()),
        ));
    }

    let resources: Vec<Arc<dyn ManagedResource>> = session
        .into_iter()
        .map(|s| s as Arc<dyn ManagedResource>)
        .collect();
    Ok((panels, resources))
}

async fn start_media(
    config: &DashboardConfig,
    cancel: CancellationToken,
) -> Result<(MediaHandle, tokio::task::JoinHandle<()>)> {
    let media = &config.media;
    let pipeline = MediaCachePipeline::new(
        media.pipeline.clone(),
        YtDlpSource::new(&media.yt_dlp_bin, &media.source_url),
        FfmpegTranscoder::new(&media.ffmpeg_bin),
        ImageDecoder,
    );
    pipeline
        .cache()
        .ensure_dir()
        .await
        .with_context(|| format!("Cannot use media cache {}", media.pipeline.cache_dir.display()))?;

    Ok(MediaPlayer::spawn(pipeline, media.frame_period, cancel))
}

async fn cmd_run(config: &DashboardConfig, with_media: bool) -> Result<()> {
    let (panels, resources) = build_panels(config)?;
    let mut dashboard = DashboardCoordinator::start(
        panels,
        resources,
        Arc::new(TracingPanelReporter),
        CoordinatorConfig::default(),
    );

    let cancel = CancellationToken::new();
    let media = if with_media {
        Some(start_media(config, cancel.child_token()).await?)
    } else {
        None
    };

    let period = match &media {
        Some(_) => config.media.frame_period.min(config.screen_refresh_interval),
        None => config.screen_refresh_interval.min(Duration::from_secs(1)),
    };
    let view = ui::View {
        dashboard: Some(&dashboard),
        media: media.as_ref().map(|(handle, _)| handle),
        station: &config.rail_station,
        options: render_options(config),
        show_debug_info: config.show_debug_info,
    };
    let result = ui::run(view, period, cancel.clone()).await;

    cancel.cancel();
    if let Some((_, task)) = media
        && let Err(e) = task.await
    {
        tracing::warn!(error = %e, "Media player ended abnormally");
    }
    dashboard.stop().await;
    result
}

async fn cmd_media(config: &DashboardConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let (handle, task) = start_media(config, cancel.child_token()).await?;

    let view = ui::View {
        dashboard: None,
        media: Some(&handle),
        station: &config.rail_station,
        options: render_options(config),
        show_debug_info: config.show_debug_info,
    };
    let result = ui::run(view, config.media.frame_period, cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = task.await {
        tracing::warn!(error = %e, "Media player ended abnormally");
    }
    result
}

/// Run `job` once on a fresh browser, or return its fixture in test mode.
async fn extract_once<J: ExtractionJob>(config: &DashboardConfig, job: J) -> Result<Records> {
    if config.use_test_data {
        return Ok(J::Record::into_records(job.fixture()));
    }

    let session = ResourceSession::new(
        ChromiumDriver::new(config.chrome_bin.clone()),
        config.session.clone(),
    );
    let result = session.with_page(&job).await;
    session.release().await;

    let records = result.with_context(|| format!("{} extraction failed", job.name()))?;
    Ok(J::Record::into_records(records))
}

async fn cmd_scrape(config: &DashboardConfig, target: Target, json: bool) -> Result<()> {
    let records = match target {
        Target::Tfl => extract_once(config, TubeStatusJob).await?,
        Target::Stations => extract_once(config, StationStatusJob).await?,
        Target::Rail => extract_once(config, DeparturesJob::new(&config.rail_station)).await?,
        Target::Pubs => {
            let job = spoons_job(config)?.context("PUBS_LOCATION is not set")?;
            extract_once(config, job).await?
        }
    };

    let data_hash = records.data_hash();
    tracing::info!(
        kind = records.kind(),
        count = records.len(),
        data_hash = %&data_hash[..8],
        "Extraction complete"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        let options = RenderOptions {
            max_departures: usize::MAX,
            ..render_options(config)
        };
        for line in render::records_body(&records, &options) {
            println!("{}", render::text(&line));
        }
    }

    Ok(())
}
