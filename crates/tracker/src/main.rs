use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Arg, ArgMatches, Command};
use gshare_config::{TrackerConfig, LOG_ROOT};
use gshare_core::utils::Logger;
use gshare_tracker::{Registry, TokenService, Tracker};

fn create_command() -> Command {
    Command::new("gshare-tracker")
        .about("Coordinator for group-scoped peer-to-peer file sharing")
        .arg(
            Arg::new("ADDR")
                .help("Address to listen on")
                .required(true)
                .value_name("IP:PORT"),
        )
        .arg(
            Arg::new("CONFIG")
                .help("Optional JSON configuration file")
                .long("config")
                .value_name("PATH"),
        )
}

fn run(matches: &ArgMatches) -> Result<(), String> {
    let address = matches.get_one::<String>("ADDR").unwrap();
    validate_address(address)?;

    let config_path = matches.get_one::<String>("CONFIG").map(PathBuf::from);
    let config = TrackerConfig::load(config_path.as_deref())
        .map_err(|e| format!("loading configuration: {e}"))?;

    let logger = Arc::new(
        Logger::to_file(LOG_ROOT, address, "tracker")
            .map_err(|e| format!("opening log file: {e}"))?,
    );
    let registry = Arc::new(Registry::new(TokenService::new(
        &config.secret,
        config.token_expiry_secs,
    )));

    let tracker = Tracker::new(registry, logger);
    let listener = tracker
        .bind(address)
        .map_err(|e| format!("binding {address}: {e}"))?;
    println!("tracker listening on {address}");
    tracker.serve(listener);
    Ok(())
}

fn validate_address(address: &str) -> Result<(), String> {
    let Some((host, port)) = address.split_once(':') else {
        return Err(format!("invalid ip:port: {address}"));
    };
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(format!("invalid ip:port: {address}"));
    }
    Ok(())
}

fn main() {
    let matches = create_command().get_matches();
    if let Err(e) = run(&matches) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
