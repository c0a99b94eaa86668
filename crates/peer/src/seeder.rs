//! The serving side of a peer: answers piece-availability queries and ships
//! raw piece bytes to other peers' leechers.

use std::fs::File;
use std::net::{TcpListener, TcpStream};
use std::os::unix::fs::FileExt;
use std::sync::Arc;
use std::time::Duration;
use std::{io, thread};

use gshare_config::{PIECE_SIZE, SOCKET_TIMEOUT_SECS};
use gshare_core::entities::PeerCommand;
use gshare_core::error::{ShareError, ShareResult};
use gshare_core::utils::Logger;
use gshare_core::wire::{read_frame, render_reply, write_frame};

use crate::store::PieceStore;

pub struct Seeder {
    address: String,
    store: Arc<PieceStore>,
    logger: Arc<Logger>,
}

impl Seeder {
    pub fn new(address: String, store: Arc<PieceStore>, logger: Arc<Logger>) -> Seeder {
        Seeder {
            address,
            store,
            logger,
        }
    }

    pub fn bind(&self) -> io::Result<TcpListener> {
        let listener = TcpListener::bind(&self.address)?;
        self.logger
            .info(format!("seeder listening on {}", self.address));
        Ok(listener)
    }

    /// Accept leechers forever, one worker thread each.
    pub fn serve(&self, listener: TcpListener) {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let store = self.store.clone();
                    let logger = self.logger.clone();
                    thread::spawn(move || handle_leecher(stream, store, logger));
                }
                Err(e) => self.logger.error(format!("accept failed: {e}")),
            }
        }
    }
}

fn handle_leecher(mut stream: TcpStream, store: Arc<PieceStore>, logger: Arc<Logger>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let timeout = Some(Duration::from_secs(SOCKET_TIMEOUT_SECS));
    if stream.set_read_timeout(timeout).is_err() || stream.set_write_timeout(timeout).is_err() {
        logger.error(format!("{peer}: setting socket timeouts failed"));
        return;
    }

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

        let reply = render_reply(execute(&store, &line));
        if let Err(e) = write_frame(&mut stream, &reply) {
            logger.error(format!("{peer}: send failed: {e}"));
            break;
        }
    }
}

fn execute(store: &PieceStore, line: &str) -> ShareResult<Vec<u8>> {
    match PeerCommand::parse(line)? {
        PeerCommand::GivePieceInfo { file, group } => {
            // A single space means "I do not hold that file at all".
            match store.available_pieces(&file, &group) {
                None => Ok(b" ".to_vec()),
                Some(pieces) => Ok(pieces
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<String>>()
                    .join(" ")
                    .into_bytes()),
            }
        }
        PeerCommand::GivePiece { file, group, piece } => {
            let path = store
                .file_path(&file, &group)
                .ok_or_else(|| ShareError::conflict("file is not shared here"))?;
            if !store.has_piece(&path, piece) {
                return Err(ShareError::conflict("piece is not available here"));
            }
            read_piece(&path, piece)
        }
    }
}

// Read piece bytes straight from the on-disk copy at the piece offset; the
// final piece of a file comes back short.
fn read_piece(path: &std::path::Path, piece: u32) -> ShareResult<Vec<u8>> {
    let file = File::open(path)?;
    let offset = piece as u64 * PIECE_SIZE as u64;
    let mut buf = vec![0u8; PIECE_SIZE];
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64)? {
            0 => break,
            n => filled += n,
        }
    }
    if filled == 0 {
        return Err(ShareError::integrity("piece lies beyond the end of the file"));
    }
    buf.truncate(filled);
    Ok(buf)
}
