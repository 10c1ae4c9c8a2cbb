use std::path::PathBuf;
use structopt::StructOpt;

use chrono::Utc;
use geoalarm::config::Config;
use geoalarm::context::AppContext;
use geoalarm::{Coordinate, ForegroundObserver, StopOutcome};

/// Geofence proximity alarm command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "geoalarm", about = "Proximity alarms for saved places")]
pub struct Cli {
    /// Path to configuration file
    #[structopt(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
pub enum Command {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Save a new place, armed
    Add {
        /// Unique name for the place
        name: String,
        /// Address to look up in the gazetteer
        #[structopt(short, long, required_unless = "lat")]
        address: Option<String>,
        /// Latitude, instead of an address
        #[structopt(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// Longitude, instead of an address
        #[structopt(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// List saved places
    List,
    /// Delete a saved place
    Remove { name: String },
    /// Arm a place's alarm
    Arm { name: String },
    /// Disarm a place's alarm
    Disarm { name: String },
    /// Evaluate the current position once
    Tick,
    /// Stop the active alarm (the notification's action button)
    Stop {
        /// Place to stop; defaults to the one currently alarming
        name: Option<String>,
    },
    /// Show and re-present the active alarm, if any
    Status,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::from_args();

    if let Command::Config { output } = &cli.command {
        Config::default().to_file(output)?;
        println!("Default configuration written to: {:?}", output);
        return Ok(());
    }

    let context = AppContext::from_config(Config::load_or_default(&cli.config)?)?;
    let registry = context.registry();

    match cli.command {
        Command::Config { .. } => {}
        Command::Add {
            name,
            address,
            lat,
            lon,
        } => {
            let geofence = match (lat, lon, address) {
                (Some(lat), Some(lon), _) => registry.add(&name, Coordinate::new(lat, lon)?)?,
                (_, _, Some(address)) => {
                    let geocoder = context.geocoder()?;
                    registry.add_from_address(&geocoder, &name, &address)?
                }
                _ => return Err("Give either --address or --lat and --lon".into()),
            };
            println!(
                "Added '{}' at ({:.5}, {:.5}), armed",
                geofence.name, geofence.latitude, geofence.longitude
            );
        }
        Command::List => {
            let locations = registry.list()?;
            let active = context.store.get_active_alarm()?;
            if locations.is_empty() {
                println!("No saved places");
            }
            for geofence in locations {
                let alarming = active.as_deref() == Some(geofence.name.as_str());
                println!(
                    "  {:<20} ({:>9.5}, {:>10.5})  {}{}",
                    geofence.name,
                    geofence.latitude,
                    geofence.longitude,
                    if geofence.armed { "armed" } else { "off" },
                    if alarming { "  ALARMING" } else { "" }
                );
            }
        }
        Command::Remove { name } => {
            registry.remove(&name)?;
            println!("Removed '{}'", name);
        }
        Command::Arm { name } => {
            registry.set_armed(&name, true)?;
            println!("Armed '{}'", name);
        }
        Command::Disarm { name } => {
            registry.set_armed(&name, false)?;
            println!("Disarmed '{}'", name);
        }
        Command::Tick => {
            let outcome = context.engine()?.evaluate_at(Utc::now())?;
            println!("{}", outcome);
        }
        Command::Stop { name } => {
            let stop_action = context.stop_action();
            let outcome = match name {
                Some(name) => stop_action.stop(&name)?,
                None => stop_action.stop_current()?,
            };
            match outcome {
                StopOutcome::Stopped { name } => {
                    println!("Alarm for '{}' stopped; arm it again to be alerted", name)
                }
                StopOutcome::NotCurrentlyAlarming => println!("Not currently alarming"),
            }
        }
        Command::Status => {
            let observer = ForegroundObserver::new(
                context.store.clone(),
                context.presenter.clone(),
                &context.events,
            );
            match observer.resume()? {
                Some(name) => println!("Alarming: {}", name),
                None => println!("No active alarm"),
            }
        }
    }

    Ok(())
}
