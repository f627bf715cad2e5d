use dbvault::config::{self, DEFAULT_LOG_LEVEL, LOG_LEVEL_KEY, Settings};
use dbvault::service::{Trigger, scheduler};
use mimalloc::MiMalloc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let settings_path = config::settings_path();
    // Startup settings only pick the log level and the schedule; every run
    // reloads them from scratch.
    let loaded = Settings::load(&settings_path);
    let settings = loaded.as_ref().cloned().unwrap_or_default();

    let loglevel = settings
        .get(LOG_LEVEL_KEY)
        .unwrap_or(DEFAULT_LOG_LEVEL)
        .to_string();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    if let Err(e) = &loaded {
        error!(
            path = %settings_path.display(),
            error = %e,
            "failed to load settings; starting with defaults"
        );
    }

    let trigger = Trigger::from_settings(&settings)?;
    info!(
        settings = %settings_path.display(),
        loglevel = %loglevel,
        run_on_startup = trigger.run_on_startup,
        run_once = trigger.run_once,
        "dbvault starting"
    );

    scheduler::serve(trigger, settings_path).await;
    Ok(())
}
