//! SHA-256 digests for whole files and individual pieces.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use gshare_config::PIECE_SIZE;
use sha2::{Digest, Sha256};

/// Digests of one on-disk file: the whole-file hash plus one hash per piece,
/// all hex-lowercase.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDigests {
    pub size: u64,
    pub file_hash: String,
    pub piece_hashes: Vec<String>,
}

/// Hash `path` in one streaming pass of PIECE_SIZE chunks.
pub fn file_digests(path: &Path) -> io::Result<FileDigests> {
    let mut file = File::open(path)?;
    let mut whole = Sha256::new();
    let mut piece_hashes = Vec::new();
    let mut size: u64 = 0;
    let mut buf = vec![0u8; PIECE_SIZE];

    loop {
        let read = fill_piece(&mut file, &mut buf)?;
        if read == 0 {
            break;
        }
        whole.update(&buf[..read]);
        piece_hashes.push(piece_digest(&buf[..read]));
        size += read as u64;
        if read < PIECE_SIZE {
            break;
        }
    }

    Ok(FileDigests {
        size,
        file_hash: hex::encode(whole.finalize()),
        piece_hashes,
    })
}

/// Hex SHA-256 of one piece's bytes.
pub fn piece_digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

// Read until the buffer is full or the file ends; a plain read() may return
// less than a full piece.
fn fill_piece(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
