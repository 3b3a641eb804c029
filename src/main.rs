use std::{process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt as _,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::CronStream;
use mecenate::{
    application::{
        aggregate::Aggregator,
        error::AppError,
        jobs::{RefreshContext, midnight_refresh_schedule, process_midnight_refresh_job},
        sources::FETCH_TIMEOUT,
        wall::WallService,
    },
    config,
    domain::policy::SponsorPolicy,
    infra::{
        avatars::AvatarStore,
        error::InfraError,
        http::{HttpState, build_router},
        raster::RasterConverter,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Generate(_) => run_generate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (wall, raster) = build_wall_service(&settings)?;

    // Initial build: a failure is logged, not fatal; read paths retry.
    if let Err(err) = wall.rebuild().await {
        warn!(target: "mecenate::startup", error = %err, "initial sponsor build failed");
    }

    let monitor_handle = spawn_refresh_monitor(wall.clone());

    let result = serve_http(&settings, wall, raster).await;

    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

async fn run_generate(settings: config::Settings) -> Result<(), AppError> {
    let (wall, _raster) = build_wall_service(&settings)?;
    wall.rebuild().await.map_err(AppError::from)?;
    info!(
        target: "mecenate::generate",
        output = %settings.output.directory.display(),
        "sponsor artifacts generated"
    );
    Ok(())
}

fn build_wall_service(
    settings: &config::Settings,
) -> Result<(Arc<WallService>, Arc<RasterConverter>), AppError> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|err| AppError::from(InfraError::HttpClient(err)))?;

    let aggregator = Aggregator::from_settings(&settings.sources, client.clone());
    if aggregator.source_count() == 0 {
        warn!(
            target: "mecenate::startup",
            "no sponsor source configured; rebuilds will fail until credentials are provided"
        );
    }

    let policy = SponsorPolicy::new(
        &settings.policy.exclude,
        &settings.policy.include,
        &settings.policy.forced_amounts,
        settings.policy.merge_accounts,
    );
    let avatars = AvatarStore::new(settings.cache.directory.clone(), client);

    let wall = Arc::new(WallService::new(
        aggregator,
        policy,
        avatars,
        settings.render.clone(),
        settings.output.directory.clone(),
        settings.scheduler.refresh_interval,
    ));
    let raster = Arc::new(RasterConverter::new(
        settings.raster.convert_path.clone(),
        settings.raster.jpeg_quality,
    ));

    Ok((wall, raster))
}

fn spawn_refresh_monitor(wall: Arc<WallService>) -> tokio::task::JoinHandle<()> {
    let context = RefreshContext { wall };
    let worker = WorkerBuilder::new("midnight-refresh-worker")
        .data(context)
        .backend(CronStream::new_with_timezone(
            midnight_refresh_schedule(),
            chrono::Local,
        ))
        .build_fn(process_midnight_refresh_job);

    let monitor = Monitor::new().register(worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "refresh monitor stopped");
        }
    })
}

async fn serve_http(
    settings: &config::Settings,
    wall: Arc<WallService>,
    raster: Arc<RasterConverter>,
) -> Result<(), AppError> {
    let router = build_router(HttpState { wall, raster });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)))?;

    info!(
        target: "mecenate::startup",
        addr = %settings.server.addr,
        "serving sponsor wall"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
