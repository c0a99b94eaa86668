//! The downloading side of a peer and its interactive command surface.
//!
//! One persistent conversation with the tracker carries every user command;
//! downloads run on background threads and report through the download
//! board.

use std::io::{self, Write as _};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use colored::Colorize;
use gshare_core::error::{ShareError, ShareResult};
use gshare_core::hashing::{file_digests, FileDigests};
use gshare_core::helpers::{piece_count, tokenize};
use gshare_core::utils::Logger;
use gshare_core::wire::{read_frame, split_text_reply, write_frame};

use crate::board::{DownloadBoard, DownloadState};
use crate::download::{self, DownloadJob};
use crate::store::PieceStore;

/// The shared tracker conversation: one socket, one session token. Download
/// threads hold a clone of this to re-announce completed files.
pub(crate) struct TrackerLink {
    stream: Mutex<TcpStream>,
    token: Mutex<Option<String>>,
    lost: AtomicBool,
    logger: Arc<Logger>,
}

impl TrackerLink {
    /// One framed request/response round trip. Socket failures mark the
    /// whole session as lost.
    fn send(&self, message: &str) -> ShareResult<String> {
        self.logger.command(format!("-> {message}"));

        let mut stream = self.stream.lock().unwrap();
        let frame = write_frame(&mut *stream, message.as_bytes())
            .and_then(|_| read_frame(&mut *stream))
            .map_err(|e| {
                self.lost.store(true, Ordering::SeqCst);
                ShareError::Io(e)
            })?;
        drop(stream);

        let Some(frame) = frame else {
            self.lost.store(true, Ordering::SeqCst);
            return Err(ShareError::Remote(
                "tracker closed the connection".to_string(),
            ));
        };
        let reply = split_text_reply(frame);
        if let Ok(payload) = &reply {
            self.logger.command(format!("<- {payload}"));
        }
        reply
    }

    fn token(&self) -> ShareResult<String> {
        self.token
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ShareError::auth("not logged in"))
    }

    /// Wire-level `upload_file` for a file whose digests are already known.
    fn announce(&self, file: &str, group: &str, digests: &FileDigests) -> ShareResult<String> {
        let token = self.token()?;
        self.send(&format!(
            "upload_file {file} {group} {} {} {} {token}",
            digests.size,
            digests.file_hash,
            digests.piece_hashes.join(" ")
        ))
    }
}

pub struct Leecher {
    seeder_address: String,
    link: Arc<TrackerLink>,
    store: Arc<PieceStore>,
    board: Arc<DownloadBoard>,
    logger: Arc<Logger>,
}

impl Leecher {
    /// Open the persistent tracker conversation.
    pub fn connect(
        tracker_address: &str,
        seeder_address: String,
        store: Arc<PieceStore>,
        board: Arc<DownloadBoard>,
        logger: Arc<Logger>,
    ) -> io::Result<Leecher> {
        let stream = TcpStream::connect(tracker_address)?;
        logger.info(format!("connected to tracker at {tracker_address}"));
        Ok(Leecher {
            seeder_address,
            link: Arc::new(TrackerLink {
                stream: Mutex::new(stream),
                token: Mutex::new(None),
                lost: AtomicBool::new(false),
                logger: logger.clone(),
            }),
            store,
            board,
            logger,
        })
    }

    /// The interactive loop. Returns when the tracker conversation dies;
    /// `quit` and a closed stdin terminate the process.
    pub fn run_prompt(&self) {
        let stdin = io::stdin();
        loop {
            print!(">> ");
            let _ = io::stdout().flush();

            let mut line = String::new();
            match stdin.read_line(&mut line) {
                Ok(0) => {
                    self.quit();
                }
                Ok(_) => {}
                Err(e) => {
                    self.logger.error(format!("reading the prompt failed: {e}"));
                    break;
                }
            }

            if let Err(e) = self.dispatch(line.trim()) {
                println!("{}", format!("Error: {e}").red());
            }
            if self.link.lost.load(Ordering::SeqCst) {
                println!("{}", "Error: tracker connection lost".red());
                break;
            }
        }
    }

    /// Run one user command. Public so the prompt shell stays a thin loop.
    pub fn dispatch(&self, line: &str) -> ShareResult<()> {
        let tokens = tokenize(line, ' ');
        let Some(name) = tokens.first() else {
            return Ok(());
        };

        match name.as_str() {
            "quit" | "exit" => self.quit(),
            "create_user" => self.create_user(&tokens),
            "login" => self.login(&tokens),
            "logout" => self.logout(),
            "create_group" | "join_group" | "leave_group" => self.forward(&tokens, 1),
            "accept_request" | "stop_share" => self.forward(&tokens, 2),
            "list_groups" => self.list(&tokens, 0, "no groups in the system yet", "Groups:"),
            "list_requests" => {
                self.list(&tokens, 1, "no pending join requests", "Pending requests:")
            }
            "list_files" => self.list(&tokens, 1, "no files in the group yet", "Files:"),
            "upload_file" => self.upload_file(&tokens),
            "download_file" => self.download_file(&tokens),
            "show_downloads" => self.show_downloads(),
            _ => Err(ShareError::input("unknown command")),
        }
    }

    // --- session commands ----------------------------------------------------

    fn create_user(&self, tokens: &[String]) -> ShareResult<()> {
        expect_arity(tokens, 3)?;
        let reply = self.link.send(&tokens.join(" "))?;
        println!("{}", reply.green());
        Ok(())
    }

    fn login(&self, tokens: &[String]) -> ShareResult<()> {
        expect_arity(tokens, 3)?;
        if self.link.token.lock().unwrap().is_some() {
            return Err(ShareError::conflict("already logged in"));
        }

        let message = format!("login {} {} {}", tokens[1], tokens[2], self.seeder_address);
        let reply = self.link.send(&message)?;
        let token = tokenize(&reply, ' ')
            .into_iter()
            .next()
            .ok_or_else(|| ShareError::Remote("tracker sent no token".to_string()))?;
        *self.link.token.lock().unwrap() = Some(token);
        println!("{}", "logged in".green());

        self.readvertise();
        Ok(())
    }

    fn logout(&self) -> ShareResult<()> {
        let token = self.link.token()?;
        let reply = self.link.send(&format!("logout {token}"))?;
        *self.link.token.lock().unwrap() = None;
        self.store.clear_pieces();
        println!("{}", reply.green());
        Ok(())
    }

    /// Best-effort logout, then terminate the process.
    fn quit(&self) -> ! {
        if self.link.token.lock().unwrap().is_some() {
            if let Err(e) = self.logout() {
                self.logger.error(format!("logout during quit failed: {e}"));
            }
        }
        self.logger.info("leecher quit");
        process::exit(0);
    }

    // Restore seeder status for everything registered locally. Files that
    // vanished from disk or that the tracker now refuses are logged and
    // skipped.
    fn readvertise(&self) {
        for ((file, group), path) in self.store.shared_files() {
            match self.announce_from_disk(&file, &group, &path) {
                Ok(_) => self
                    .logger
                    .info(format!("re-advertised {file} in {group}")),
                Err(e) => self
                    .logger
                    .error(format!("re-advertising {file} in {group} failed: {e}")),
            }
        }
    }

    // --- group and file commands --------------------------------------------

    // Commands that just gain a token and echo the tracker's reply.
    fn forward(&self, tokens: &[String], args: usize) -> ShareResult<()> {
        expect_arity(tokens, args + 1)?;
        let token = self.link.token()?;
        let reply = self.link.send(&format!("{} {token}", tokens.join(" ")))?;
        println!("{}", reply.green());
        Ok(())
    }

    fn list(
        &self,
        tokens: &[String],
        args: usize,
        empty_notice: &str,
        header: &str,
    ) -> ShareResult<()> {
        expect_arity(tokens, args + 1)?;
        let token = self.link.token()?;
        let reply = self.link.send(&format!("{} {token}", tokens.join(" ")))?;

        let items = tokenize(&reply, ' ');
        if items.is_empty() {
            println!("{}", empty_notice.yellow());
            return Ok(());
        }
        println!("{header}");
        for item in items {
            println!("\t{item}");
        }
        Ok(())
    }

    /// `upload_file <path> <group>`: hash the on-disk file, announce it to
    /// the tracker and register every piece for serving.
    fn upload_file(&self, tokens: &[String]) -> ShareResult<()> {
        expect_arity(tokens, 3)?;
        let path = PathBuf::from(&tokens[1]);
        if !path.is_file() {
            return Err(ShareError::input("no such file"));
        }
        let path = path.canonicalize()?;
        let file = path
            .file_name()
            .ok_or_else(|| ShareError::input("path has no file name"))?
            .to_string_lossy()
            .into_owned();
        let group = &tokens[2];

        let reply = self.announce_from_disk(&file, group, &path)?;
        println!("{}", reply.green());
        Ok(())
    }

    // Hash `path` and send the wire-level upload_file; on success the local
    // store serves the whole file.
    fn announce_from_disk(&self, file: &str, group: &str, path: &Path) -> ShareResult<String> {
        let digests = file_digests(path)?;
        let reply = self.link.announce(file, group, &digests)?;
        self.store.register_file(file, group, path);
        self.store.add_all_pieces(path, piece_count(digests.size));
        Ok(reply)
    }

    /// `download_file <file> <group> <dest>`: fetch the metadata, then hand
    /// the piece transfer to a background thread.
    fn download_file(&self, tokens: &[String]) -> ShareResult<()> {
        expect_arity(tokens, 4)?;
        let (file, group) = (&tokens[1], &tokens[2]);
        let mut dest = PathBuf::from(&tokens[3]);
        if dest.is_dir() {
            dest = dest.join(file);
        }

        if self.board.is_in_progress(group, file) {
            return Err(ShareError::conflict("download already in progress"));
        }

        let token = self.link.token()?;
        let reply = self
            .link
            .send(&format!("download_file {file} {group} {token}"))?;
        let job = download::parse_metadata(file, group, dest, &reply)?;

        self.board.set(group, file, DownloadState::InProgress);
        let link = self.link.clone();
        let store = self.store.clone();
        let board = self.board.clone();
        let logger = self.logger.clone();
        thread::spawn(move || run_download(job, link, store, board, logger));
        println!(
            "{}",
            format!("downloading {file} from {group}; watch show_downloads").green()
        );
        Ok(())
    }

    fn show_downloads(&self) -> ShareResult<()> {
        let entries = self.board.snapshot();
        if entries.is_empty() {
            println!("{}", "no downloads yet".yellow());
            return Ok(());
        }
        for ((group, file), state) in entries {
            println!("{} [{group}] {file}", state.tag());
        }
        Ok(())
    }
}

// The background half of download_file: run the engine, then either join
// the seeder set or record the failure.
fn run_download(
    job: DownloadJob,
    link: Arc<TrackerLink>,
    store: Arc<PieceStore>,
    board: Arc<DownloadBoard>,
    logger: Arc<Logger>,
) {
    let (file, group) = (job.file.clone(), job.group.clone());
    match download::fetch_all(&job, &store, &logger) {
        Ok(()) => {
            // Join the seeder set with the hashes the group already agreed
            // on, not a fresh local hashing pass.
            let digests = FileDigests {
                size: job.size,
                file_hash: job.file_hash.clone(),
                piece_hashes: job.piece_hashes.clone(),
            };
            if let Err(e) = link.announce(&file, &group, &digests) {
                logger.error(format!("re-announcing {file} in {group} failed: {e}"));
            }
            board.set(&group, &file, DownloadState::Completed);
            logger.info(format!("downloaded {file} from {group}"));
            println!("{}", format!("downloaded {file} from {group}").green());
        }
        Err(e) => {
            board.set(&group, &file, DownloadState::Failed);
            logger.error(format!("download of {file} from {group} failed: {e}"));
            println!(
                "{}",
                format!("download of {file} from {group} failed: {e}").red()
            );
        }
    }
}

fn expect_arity(tokens: &[String], arity: usize) -> ShareResult<()> {
    if tokens.len() != arity {
        return Err(ShareError::Input(format!(
            "wrong number of arguments to {}",
            tokens[0]
        )));
    }
    Ok(())
}
