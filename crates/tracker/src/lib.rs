use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::{io, thread};

use gshare_core::entities::Command;
use gshare_core::error::ShareResult;
use gshare_core::utils::Logger;
use gshare_core::wire::{read_frame, render_reply, write_frame};

pub mod auth;
pub mod registry;

pub use auth::TokenService;
pub use registry::Registry;

/// The tracker server: one listener, one detached worker per connection.
pub struct Tracker {
    registry: Arc<Registry>,
    logger: Arc<Logger>,
}

impl Tracker {
    pub fn new(registry: Arc<Registry>, logger: Arc<Logger>) -> Tracker {
        Tracker { registry, logger }
    }

    pub fn bind(&self, address: &str) -> io::Result<TcpListener> {
        let listener = TcpListener::bind(address)?;
        self.logger
            .info(format!("tracker listening on {address}"));
        Ok(listener)
    }

    /// Accept leechers forever, one worker thread each.
    pub fn serve(&self, listener: TcpListener) {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let registry = self.registry.clone();
                    let logger = self.logger.clone();
                    thread::spawn(move || handle_leecher(stream, registry, logger));
                }
                Err(e) => self.logger.error(format!("accept failed: {e}")),
            }
        }
    }
}

// One connection's read -> dispatch -> respond loop. Commands on a single
// connection are processed serially; the connection stays open across
// failed commands.
fn handle_leecher(mut stream: TcpStream, registry: Arc<Registry>, logger: Arc<Logger>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    logger.info(format!("connection from {peer}"));

    loop {
        let frame = match read_frame(&mut stream) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                logger.info(format!("{peer} closed the connection"));
                break;
            }
            Err(e) => {
                logger.error(format!("{peer}: recv failed: {e}"));
                break;
            }
        };

        let line = String::from_utf8_lossy(&frame).into_owned();
        logger.command(format!("{peer} -> {line}"));

        let reply = render_reply(execute(&registry, &line).map(String::into_bytes));
        logger.command(format!("{peer} <- {}", String::from_utf8_lossy(&reply)));

        if let Err(e) = write_frame(&mut stream, &reply) {
            logger.error(format!("{peer}: send failed: {e}"));
            break;
        }
    }
}

/// Parse and run one command line against the registry.
pub fn execute(registry: &Registry, line: &str) -> ShareResult<String> {
    match Command::parse(line)? {
        Command::CreateUser { username, password } => {
            registry.create_user(&username, &password)
        }
        Command::Login {
            username,
            password,
            address,
        } => registry.login(&username, &password, &address),
        Command::Logout { token } => registry.logout(&token),
        Command::CreateGroup { group, token } => registry.create_group(&group, &token),
        Command::JoinGroup { group, token } => registry.join_group(&group, &token),
        Command::LeaveGroup { group, token } => registry.leave_group(&group, &token),
        Command::ListRequests { group, token } => registry.list_requests(&group, &token),
        Command::AcceptRequest {
            group,
            username,
            token,
        } => registry.accept_request(&group, &username, &token),
        Command::ListGroups { token } => registry.list_groups(&token),
        Command::ListFiles { group, token } => registry.list_files(&group, &token),
        Command::UploadFile {
            file,
            group,
            size,
            file_hash,
            piece_hashes,
            token,
        } => registry.upload_file(&file, &group, size, &file_hash, &piece_hashes, &token),
        Command::DownloadFile { file, group, token } => {
            registry.download_file(&file, &group, &token)
        }
        Command::StopShare { group, file, token } => {
            registry.stop_share(&group, &file, &token)
        }
    }
}

#[cfg(test)]
mod func_tests {
    use std::net::TcpStream;
    use std::sync::Arc;
    use std::thread;

    use gshare_config::TOKEN_EXPIRY_SECS;
    use gshare_core::hashing::piece_digest;
    use gshare_core::helpers::tokenize;
    use gshare_core::utils::Logger;
    use gshare_core::wire::{read_frame, write_frame};

    use super::*;

    fn spawn_tracker() -> String {
        let registry = Arc::new(Registry::new(TokenService::new(
            "func-test-secret",
            TOKEN_EXPIRY_SECS,
        )));
        let tracker = Tracker::new(registry, Arc::new(Logger::stdout("tracker")));
        let listener = tracker.bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        thread::spawn(move || tracker.serve(listener));
        address
    }

    fn send(stream: &mut TcpStream, command: &str) -> String {
        write_frame(stream, command.as_bytes()).unwrap();
        let frame = read_frame(stream).unwrap().unwrap();
        String::from_utf8(frame).unwrap()
    }

    #[test]
    fn test_two_peer_session_over_tcp() {
        let address = spawn_tracker();
        let mut alice = TcpStream::connect(&address).unwrap();
        let mut bob = TcpStream::connect(&address).unwrap();

        assert_eq!(
            send(&mut alice, "create_user alice pw"),
            "Success: user alice created"
        );
        let reply = send(&mut alice, "login alice pw 127.0.0.1:5001");
        let alice_token = tokenize(&reply, ' ')[1].clone();

        send(&mut bob, "create_user bob pw");
        let reply = send(&mut bob, "login bob pw 127.0.0.1:5002");
        let bob_token = tokenize(&reply, ' ')[1].clone();

        assert!(send(&mut alice, &format!("create_group dev {alice_token}"))
            .starts_with("Success"));
        assert!(send(&mut bob, &format!("join_group dev {bob_token}")).starts_with("Success"));
        assert!(send(&mut alice, &format!("accept_request dev bob {alice_token}"))
            .starts_with("Success"));

        // a 2500-byte file splits into three pieces
        let whole = piece_digest(b"the whole file");
        let pieces = [
            piece_digest(b"p0"),
            piece_digest(b"p1"),
            piece_digest(b"p2"),
        ];
        let upload = format!(
            "upload_file notes.txt dev 2500 {whole} {} {} {} {alice_token}",
            pieces[0], pieces[1], pieces[2]
        );
        assert!(send(&mut alice, &upload).starts_with("Success"));

        assert_eq!(
            send(&mut bob, &format!("list_files dev {bob_token}")),
            "Success: notes.txt"
        );

        let reply = send(&mut bob, &format!("download_file notes.txt dev {bob_token}"));
        let tokens = tokenize(&reply, ' ');
        assert_eq!(tokens[0], "Success:");
        assert_eq!(tokens[1], "2500");
        assert_eq!(tokens[2], whole);
        assert_eq!(tokens.last().unwrap(), "127.0.0.1:5001");
    }

    #[test]
    fn test_errors_keep_the_connection_open() {
        let address = spawn_tracker();
        let mut stream = TcpStream::connect(&address).unwrap();

        assert!(send(&mut stream, "frobnicate").starts_with("Error: "));
        assert_eq!(
            send(&mut stream, "list_groups bogus-token"),
            "Error: invalid or expired token"
        );
        // still usable afterwards
        assert!(send(&mut stream, "create_user carol pw").starts_with("Success"));
    }
}
