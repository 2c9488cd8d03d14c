use mimalloc::MiMalloc;
use modules::{
    common::{signal::SignalManager, Initialize},
    database::manager::DatabaseManager,
    error::MailSweepResult,
    health::HealthMonitor,
    janitors::PeriodicJanitors,
    jobs::queue::JobQueue,
    logger,
    metrics::MetricsService,
    rest::start_http_server,
    settings::dir::DataDirManager,
    trigger::TriggerScheduler,
};
use tracing::info;

mod modules;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

static LOGO: &str = r#"
  __  __       _ _ ____
 |  \/  | __ _(_) / ___|_      _____  ___ _ __
 | |\/| |/ _` | | \___ \ \ /\ / / _ \/ _ \ '_ \
 | |  | | (_| | | |___) \ V  V /  __/  __/ |_) |
 |_|  |_|\__,_|_|_|____/ \_/\_/ \___|\___| .__/
                                         |_|
"#;

#[tokio::main]
async fn main() -> MailSweepResult<()> {
    logger::initialize_logging();
    info!("{}", LOGO);
    info!("Starting mailsweep-server");
    info!("Version:  {}", mailsweep_version!());
    info!("Git:      [{}]", env!("GIT_HASH"));

    if let Err(error) = initialize().await {
        eprintln!("{:?}", error);
        return Err(error);
    }

    TriggerScheduler::start();
    PeriodicJanitors::start_background_tasks();

    start_http_server().await?;
    Ok(())
}

/// Initialize the system by validating settings and starting necessary services.
async fn initialize() -> MailSweepResult<()> {
    SignalManager::initialize().await?;
    DataDirManager::initialize().await?;
    MetricsService::initialize().await?;
    DatabaseManager::initialize().await?;
    HealthMonitor::initialize().await?;
    JobQueue::initialize().await?;
    Ok(())
}
