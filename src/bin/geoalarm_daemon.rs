use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;

use geoalarm::config::Config;
use geoalarm::context::AppContext;
use geoalarm::events::ForegroundObserver;
use geoalarm::registry::GeofenceRegistry;
use geoalarm::scheduler::{
    PeriodicScheduler, SchedulerAdapter, TickTask, TokioScheduler, EVALUATION_JOB_ID,
};
use geoalarm::{AlarmEngine, LocationStore, StopAction, StopOutcome};

/// Main daemon entry point for the geofence alarm monitor
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting geoalarm daemon...");

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::load_or_default(&config_path)?;
    let resync = config.scheduler.resync_interval();
    let interval = config.scheduler.interval();

    let context = AppContext::from_config(config)?;
    let engine = Arc::new(context.engine()?);
    let stop_action = Arc::new(context.stop_action());

    // Setup graceful shutdown signal handling
    let shutdown = Arc::new(Notify::new());
    let s = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        s.notify_one();
    })?;

    // Reconcile first: a tick may have fired while no daemon was running
    let mut observer = ForegroundObserver::new(
        Arc::clone(&context.store),
        Arc::clone(&context.presenter),
        &context.events,
    );
    match observer.resume() {
        Ok(Some(name)) => log::warn!("Alarm for '{}' is still active", name),
        Ok(None) => log::info!("No active alarm"),
        Err(e) => log::error!("Could not check for an active alarm: {}", e),
    }
    tokio::spawn(async move {
        while let Some(event) = observer.next_event().await {
            log::info!("{}", event);
        }
    });

    let scheduler = Arc::new(TokioScheduler::new()?);
    let tick_engine = Arc::clone(&engine);
    let task: TickTask = Arc::new(move || {
        tick_engine.run_tick();
    });
    let registry = GeofenceRegistry::with_scheduler(
        Arc::clone(&context.store),
        SchedulerAdapter::new(scheduler.clone(), interval, task),
    );

    tokio::spawn(run_console(
        Arc::clone(&engine),
        Arc::clone(&stop_action),
        Arc::clone(&context.store),
    ));

    log::info!("Daemon running. Type 'stop' to silence an alarm, Ctrl+C to quit.");

    // Follow edits made by the CLI in other processes
    loop {
        if let Err(e) = registry.resync() {
            log::error!("Failed to read geofences: {}", e);
        }

        tokio::select! {
            _ = shutdown.notified() => break,
            _ = tokio::time::sleep(resync) => {}
        }
    }

    scheduler.cancel(EVALUATION_JOB_ID)?;
    log::info!("Geoalarm daemon stopped");
    Ok(())
}

/// Read foreground commands from stdin
async fn run_console(
    engine: Arc<AlarmEngine>,
    stop_action: Arc<StopAction>,
    store: Arc<dyn LocationStore>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        let (command, argument) = match line.split_once(' ') {
            Some((command, argument)) => (command.to_string(), Some(argument.trim().to_string())),
            None => (line.clone(), None),
        };

        match command.as_str() {
            "" => {}
            "stop" => {
                let stop_action = Arc::clone(&stop_action);
                let result = tokio::task::spawn_blocking(move || match argument {
                    Some(name) => stop_action.stop(&name),
                    None => stop_action.stop_current(),
                })
                .await;

                match result {
                    Ok(Ok(StopOutcome::Stopped { name })) => {
                        println!("Alarm for '{}' stopped; re-arm it to be alerted again", name)
                    }
                    Ok(Ok(StopOutcome::NotCurrentlyAlarming)) => println!("Not currently alarming"),
                    Ok(Err(e)) => println!("{}", e),
                    Err(e) => log::error!("Stop command failed: {}", e),
                }
            }
            "tick" => {
                let engine = Arc::clone(&engine);
                match tokio::task::spawn_blocking(move || engine.evaluate_at(Utc::now())).await {
                    Ok(Ok(outcome)) => println!("{}", outcome),
                    Ok(Err(e)) => println!("{}", e),
                    Err(e) => log::error!("Tick command failed: {}", e),
                }
            }
            "status" => match store.get_active_alarm() {
                Ok(Some(name)) => println!("Alarming: {}", name),
                Ok(None) => println!("No active alarm"),
                Err(e) => println!("Store unavailable: {}", e),
            },
            other => println!("Unknown command '{}' (try: stop [name], tick, status)", other),
        }
    }
}
