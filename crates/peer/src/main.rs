use std::path::Path;
use std::process;
use std::sync::Arc;
use std::{fs, thread};

use clap::{Arg, ArgMatches, Command};
use colored::Colorize;
use gshare_config::LOG_ROOT;
use gshare_core::helpers::tokenize;
use gshare_core::utils::Logger;
use gshare_peer::{DownloadBoard, Leecher, PieceStore, Seeder};

fn create_command() -> Command {
    Command::new("gshare-peer")
        .about("Peer for group-scoped file sharing: seeder and leecher in one process")
        .arg(
            Arg::new("SEEDER")
                .help("Address this peer's seeder listens on")
                .required(true)
                .value_name("IP:PORT"),
        )
        .arg(
            Arg::new("TRACKER_INFO")
                .help("File listing tracker addresses, one ip:port per line")
                .required(true)
                .value_name("FILE"),
        )
        .arg(
            Arg::new("TRACKER_NO")
                .help("Which tracker to use, counted from 1")
                .required(true)
                .value_name("N"),
        )
}

fn run(matches: &ArgMatches) -> Result<(), String> {
    let seeder_address = matches.get_one::<String>("SEEDER").unwrap().clone();
    validate_address(&seeder_address)?;
    let tracker_address = tracker_from_info(
        Path::new(matches.get_one::<String>("TRACKER_INFO").unwrap()),
        matches.get_one::<String>("TRACKER_NO").unwrap(),
    )?;

    let general = Logger::to_file(LOG_ROOT, &seeder_address, "general")
        .map_err(|e| format!("opening log file: {e}"))?;
    let store = Arc::new(PieceStore::new());
    let board = Arc::new(DownloadBoard::new());

    // The seeder binds on the main thread so a taken port is a startup
    // failure, then serves from its own thread.
    let seeder_logger = Arc::new(
        Logger::to_file(LOG_ROOT, &seeder_address, "seeder")
            .map_err(|e| format!("opening log file: {e}"))?,
    );
    let seeder = Seeder::new(seeder_address.clone(), store.clone(), seeder_logger);
    let listener = seeder
        .bind()
        .map_err(|e| format!("binding seeder on {seeder_address}: {e}"))?;
    thread::spawn(move || seeder.serve(listener));
    general.info("seeder is accepting connections");

    let leecher_logger = Arc::new(
        Logger::to_file(LOG_ROOT, &seeder_address, "leecher")
            .map_err(|e| format!("opening log file: {e}"))?,
    );
    let leecher = Leecher::connect(
        &tracker_address,
        seeder_address,
        store,
        board,
        leecher_logger,
    )
    .map_err(|e| format!("connecting to tracker at {tracker_address}: {e}"))?;
    general.info("leecher is ready for commands");

    leecher.run_prompt();
    Ok(())
}

/// Pick the `number`th (1-based) `ip:port` line out of the tracker-info file.
fn tracker_from_info(path: &Path, number: &str) -> Result<String, String> {
    let number: usize = number
        .parse()
        .ok()
        .filter(|n| *n >= 1)
        .ok_or("tracker number must be a positive integer")?;

    let contents =
        fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
    let lines = tokenize(&contents, '\n');
    let address = lines
        .get(number - 1)
        .ok_or(format!("tracker {number} is not defined in the file"))?
        .trim()
        .to_string();
    validate_address(&address)?;
    Ok(address)
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
        eprintln!("{}", format!("Error: {e}").red());
        process::exit(1);
    }
}

#[cfg(test)]
mod unit_tests {
    use std::io::Write as _;

    use tempfile::NamedTempFile;

    use super::*;

    fn info_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_tracker_from_info_picks_by_index() {
        let file = info_file("127.0.0.1:6000\n127.0.0.1:6001\n");
        assert_eq!(
            tracker_from_info(file.path(), "1").unwrap(),
            "127.0.0.1:6000"
        );
        assert_eq!(
            tracker_from_info(file.path(), "2").unwrap(),
            "127.0.0.1:6001"
        );
    }

    #[test]
    fn test_tracker_from_info_rejects_bad_input() {
        let file = info_file("127.0.0.1:6000\n");
        assert!(tracker_from_info(file.path(), "0").is_err());
        assert!(tracker_from_info(file.path(), "2").is_err());
        assert!(tracker_from_info(file.path(), "two").is_err());
        assert!(tracker_from_info(Path::new("/definitely/missing"), "1").is_err());

        let bad = info_file("not-an-address\n");
        assert!(tracker_from_info(bad.path(), "1").is_err());
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address("127.0.0.1:5001").is_ok());
        assert!(validate_address("127.0.0.1").is_err());
        assert!(validate_address(":5001").is_err());
        assert!(validate_address("127.0.0.1:70000").is_err());
    }
}
