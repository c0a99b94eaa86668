//! The leecher's parallel download engine.
//!
//! A download surveys every advertised seeder, plans pieces rarest-first,
//! fans the fetches out over a fixed worker pool, verifies each piece
//! against its SHA-256, writes it at its offset and re-shares it locally,
//! then verifies the whole file.

use std::fs::OpenOptions;
use std::net::TcpStream;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gshare_config::{PIECE_SIZE, POOL_SIZE, SOCKET_TIMEOUT_SECS};
use gshare_core::error::{ShareError, ShareResult};
use gshare_core::hashing::piece_digest;
use gshare_core::helpers::{piece_count, piece_len, tokenize};
use gshare_core::utils::Logger;
use gshare_core::wire::{read_frame, split_reply, split_text_reply, write_frame};
use rand::Rng;
use threadpool::ThreadPool;

use crate::store::PieceStore;

/// Everything a download needs, assembled from the tracker's metadata reply.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub file: String,
    pub group: String,
    pub dest: PathBuf,
    pub size: u64,
    pub file_hash: String,
    pub piece_hashes: Vec<String>,
    pub peers: Vec<String>,
}

/// Interpret a tracker `download_file` payload: size, whole-file hash,
/// per-piece hashes, then however many seeder addresses are live.
pub fn parse_metadata(
    file: &str,
    group: &str,
    dest: PathBuf,
    payload: &str,
) -> ShareResult<DownloadJob> {
    let tokens = tokenize(payload, ' ');
    if tokens.len() < 2 {
        return Err(ShareError::integrity("malformed tracker metadata"));
    }
    let size: u64 = tokens[0]
        .parse()
        .map_err(|_| ShareError::integrity("malformed tracker metadata"))?;
    let pieces = piece_count(size) as usize;
    if tokens.len() < 2 + pieces {
        return Err(ShareError::integrity("malformed tracker metadata"));
    }

    Ok(DownloadJob {
        file: file.to_string(),
        group: group.to_string(),
        dest,
        size,
        file_hash: tokens[1].clone(),
        piece_hashes: tokens[2..2 + pieces].to_vec(),
        peers: tokens[2 + pieces..].to_vec(),
    })
}

/// Run the download to completion; on `Ok` the destination file exists with
/// the advertised whole-file hash. A failed download leaves the partial file
/// on disk for diagnosis.
pub fn fetch_all(
    job: &DownloadJob,
    store: &Arc<PieceStore>,
    logger: &Arc<Logger>,
) -> ShareResult<()> {
    let total = piece_count(job.size) as usize;
    if job.piece_hashes.len() != total {
        return Err(ShareError::integrity("tracker metadata does not match file size"));
    }
    if job.peers.is_empty() {
        return Err(ShareError::conflict("no peers are sharing this file right now"));
    }

    let piece_to_seeders = survey_peers(job, total, logger);
    if let Some(missing) = piece_to_seeders.iter().position(|s| s.is_empty()) {
        return Err(ShareError::Integrity(format!(
            "piece {missing} is not advertised by any peer"
        )));
    }

    let dest_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&job.dest)?;
    dest_file.set_len(job.size)?;

    // Register the destination right away so freshly verified pieces are
    // served to other leechers while this download is still running.
    store.register_file(&job.file, &job.group, &job.dest);

    let context = Arc::new(FetchContext {
        job: job.clone(),
        dest_file,
        store: store.clone(),
        logger: logger.clone(),
    });
    let failures: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let pool = ThreadPool::new(POOL_SIZE);
    for piece in rarest_first(&piece_to_seeders) {
        let seeders = piece_to_seeders[piece as usize].clone();
        let context = context.clone();
        let failures = failures.clone();
        pool.execute(move || {
            if let Err(e) = fetch_piece(piece, &seeders, &context) {
                context
                    .logger
                    .error(format!("piece {piece} failed: {e}"));
                failures.lock().unwrap().push(format!("piece {piece}: {e}"));
            }
        });
    }
    pool.join();

    let failures = failures.lock().unwrap();
    if let Some(first) = failures.first() {
        return Err(ShareError::Integrity(format!(
            "{} of {} pieces failed ({first})",
            failures.len(),
            total
        )));
    }
    drop(failures);

    let digests = gshare_core::hashing::file_digests(&job.dest)?;
    if digests.file_hash != job.file_hash {
        return Err(ShareError::integrity("whole-file hash mismatch"));
    }
    Ok(())
}

/// Fetch ordering: ascending advertiser count, ties broken by piece index.
pub(crate) fn rarest_first(piece_to_seeders: &[Vec<String>]) -> Vec<u32> {
    let mut order: Vec<u32> = (0..piece_to_seeders.len() as u32).collect();
    order.sort_by_key(|&piece| (piece_to_seeders[piece as usize].len(), piece));
    order
}

// Ask every seeder which pieces it holds; unreachable or empty-handed peers
// drop out of the plan.
fn survey_peers(job: &DownloadJob, total: usize, logger: &Logger) -> Vec<Vec<String>> {
    let mut piece_to_seeders: Vec<Vec<String>> = vec![Vec::new(); total];
    for peer in &job.peers {
        match query_piece_info(peer, &job.file, &job.group) {
            Ok(pieces) => {
                for piece in pieces {
                    if (piece as usize) < total {
                        piece_to_seeders[piece as usize].push(peer.clone());
                    }
                }
            }
            Err(e) => logger.error(format!("excluding peer {peer}: {e}")),
        }
    }
    piece_to_seeders
}

struct FetchContext {
    job: DownloadJob,
    dest_file: std::fs::File,
    store: Arc<PieceStore>,
    logger: Arc<Logger>,
}

// Fetch one piece, starting from a uniformly random advertiser and walking
// the rest on failure. Hash mismatches count as failures of that advertiser.
fn fetch_piece(piece: u32, seeders: &[String], context: &FetchContext) -> ShareResult<()> {
    let job = &context.job;
    let offset = piece as u64 * PIECE_SIZE as u64;
    let expected_len = piece_len(job.size, piece);
    let expected_hash = &job.piece_hashes[piece as usize];

    let start = rand::thread_rng().gen_range(0..seeders.len());
    for attempt in 0..seeders.len() {
        let peer = &seeders[(start + attempt) % seeders.len()];
        let bytes = match fetch_from_peer(peer, &job.file, &job.group, piece) {
            Ok(bytes) => bytes,
            Err(e) => {
                context
                    .logger
                    .error(format!("piece {piece} from {peer}: {e}"));
                continue;
            }
        };
        if bytes.len() != expected_len || piece_digest(&bytes) != *expected_hash {
            context
                .logger
                .error(format!("piece {piece} from {peer}: hash mismatch"));
            continue;
        }

        context.dest_file.write_all_at(&bytes, offset)?;
        context.store.add_piece(&job.dest, piece);
        context
            .logger
            .debug(format!("piece {piece} fetched from {peer}"));
        return Ok(());
    }
    Err(ShareError::integrity("every advertising peer failed"))
}

fn connect_peer(peer: &str) -> ShareResult<TcpStream> {
    let stream = TcpStream::connect(peer)?;
    let timeout = Some(Duration::from_secs(SOCKET_TIMEOUT_SECS));
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;
    Ok(stream)
}

/// One `give_piece_info` round trip.
pub(crate) fn query_piece_info(peer: &str, file: &str, group: &str) -> ShareResult<Vec<u32>> {
    let mut stream = connect_peer(peer)?;
    write_frame(&mut stream, format!("give_piece_info {file} {group}").as_bytes())?;
    let frame = read_frame(&mut stream)?
        .ok_or_else(|| ShareError::Remote("peer closed the connection".to_string()))?;
    let reply = split_text_reply(frame)?;

    let mut pieces = Vec::new();
    for token in tokenize(&reply, ' ') {
        let piece: u32 = token
            .parse()
            .map_err(|_| ShareError::Remote("malformed piece list".to_string()))?;
        pieces.push(piece);
    }
    Ok(pieces)
}

fn fetch_from_peer(peer: &str, file: &str, group: &str, piece: u32) -> ShareResult<Vec<u8>> {
    let mut stream = connect_peer(peer)?;
    write_frame(
        &mut stream,
        format!("give_piece {file} {group} {piece}").as_bytes(),
    )?;
    let frame = read_frame(&mut stream)?
        .ok_or_else(|| ShareError::Remote("peer closed the connection".to_string()))?;
    split_reply(frame)
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn seeders(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rarest_first_ordering() {
        let piece_to_seeders = vec![
            seeders(&["a", "b", "c"]), // piece 0: 3 advertisers
            seeders(&["a"]),           // piece 1: 1
            seeders(&["a", "b"]),      // piece 2: 2
            seeders(&["b"]),           // piece 3: 1
        ];
        assert_eq!(rarest_first(&piece_to_seeders), vec![1, 3, 2, 0]);
    }

    #[test]
    fn test_rarest_first_ties_break_by_index() {
        let piece_to_seeders = vec![seeders(&["a"]), seeders(&["b"]), seeders(&["c"])];
        assert_eq!(rarest_first(&piece_to_seeders), vec![0, 1, 2]);
    }

    #[test]
    fn test_parse_metadata() {
        let h = "a".repeat(64);
        let payload = format!("2500 {h} {h} {h} {h} 127.0.0.1:5001 127.0.0.1:5002");
        let job =
            parse_metadata("notes.txt", "dev", PathBuf::from("/tmp/notes.txt"), &payload).unwrap();

        assert_eq!(job.size, 2500);
        assert_eq!(job.piece_hashes.len(), 3);
        assert_eq!(job.peers, vec!["127.0.0.1:5001", "127.0.0.1:5002"]);
    }

    #[test]
    fn test_parse_metadata_without_seeders() {
        let h = "a".repeat(64);
        let payload = format!("100 {h} {h}");
        let job =
            parse_metadata("notes.txt", "dev", PathBuf::from("/tmp/notes.txt"), &payload).unwrap();
        assert!(job.peers.is_empty());
    }

    #[test]
    fn test_parse_metadata_rejects_short_payload() {
        let h = "a".repeat(64);
        assert!(parse_metadata(
            "notes.txt",
            "dev",
            PathBuf::from("/tmp/notes.txt"),
            &format!("2500 {h} {h}")
        )
        .is_err());
        assert!(parse_metadata("n", "g", PathBuf::from("/tmp/n"), "").is_err());
        assert!(parse_metadata("n", "g", PathBuf::from("/tmp/n"), "notanumber x").is_err());
    }
}

#[cfg(test)]
mod func_tests {
    use std::fs;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    use gshare_core::hashing::file_digests;
    use gshare_core::wire::render_reply;
    use tempfile::TempDir;

    use super::*;
    use crate::seeder::Seeder;

    fn write_fixture(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::File::create(&path).unwrap().write_all(bytes).unwrap();
        path
    }

    fn spawn_full_seeder(path: &PathBuf, pieces: u32) -> String {
        let store = Arc::new(PieceStore::new());
        store.register_file("notes.txt", "dev", path);
        store.add_all_pieces(path, pieces);
        let seeder = Seeder::new(
            "127.0.0.1:0".to_string(),
            store,
            Arc::new(Logger::stdout("seeder")),
        );
        let listener = seeder.bind().unwrap();
        let address = listener.local_addr().unwrap().to_string();
        thread::spawn(move || seeder.serve(listener));
        address
    }

    // A hostile seeder: advertises everything, then serves garbage bytes.
    fn spawn_corrupt_seeder(pieces: u32) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                thread::spawn(move || {
                    while let Ok(Some(frame)) = read_frame(&mut stream) {
                        let line = String::from_utf8_lossy(&frame).into_owned();
                        let reply = if line.starts_with("give_piece_info") {
                            let all: Vec<String> =
                                (0..pieces).map(|p| p.to_string()).collect();
                            render_reply(Ok(all.join(" ").into_bytes()))
                        } else {
                            render_reply(Ok(vec![0u8; PIECE_SIZE]))
                        };
                        if write_frame(&mut stream, &reply).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        address
    }

    #[test]
    fn test_download_from_two_seeders() {
        let dir = TempDir::new().unwrap();
        let bytes: Vec<u8> = (0..2500u32).map(|i| (i % 233) as u8).collect();
        let source = write_fixture(&dir, "source.txt", &bytes);
        let digests = file_digests(&source).unwrap();

        let peer_a = spawn_full_seeder(&source, 3);
        let peer_b = spawn_full_seeder(&source, 3);

        let dest = dir.path().join("downloaded.txt");
        let job = DownloadJob {
            file: "notes.txt".to_string(),
            group: "dev".to_string(),
            dest: dest.clone(),
            size: 2500,
            file_hash: digests.file_hash.clone(),
            piece_hashes: digests.piece_hashes.clone(),
            peers: vec![peer_a, peer_b],
        };

        let store = Arc::new(PieceStore::new());
        let logger = Arc::new(Logger::stdout("leecher"));
        fetch_all(&job, &store, &logger).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), bytes);
        // every piece was re-registered for re-sharing as it landed
        assert_eq!(
            store.available_pieces("notes.txt", "dev").unwrap(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_corrupt_seeder_is_retried_elsewhere() {
        let dir = TempDir::new().unwrap();
        let bytes: Vec<u8> = (0..2500u32).map(|i| (i % 229) as u8).collect();
        let source = write_fixture(&dir, "source.txt", &bytes);
        let digests = file_digests(&source).unwrap();

        let honest = spawn_full_seeder(&source, 3);
        let corrupt = spawn_corrupt_seeder(3);

        let dest = dir.path().join("downloaded.txt");
        let job = DownloadJob {
            file: "notes.txt".to_string(),
            group: "dev".to_string(),
            dest: dest.clone(),
            size: 2500,
            file_hash: digests.file_hash.clone(),
            piece_hashes: digests.piece_hashes.clone(),
            peers: vec![corrupt, honest],
        };

        let store = Arc::new(PieceStore::new());
        let logger = Arc::new(Logger::stdout("leecher"));
        fetch_all(&job, &store, &logger).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), bytes);
        assert_eq!(
            file_digests(&dest).unwrap().file_hash,
            digests.file_hash
        );
    }

    #[test]
    fn test_only_corrupt_seeders_fails_the_download() {
        let dir = TempDir::new().unwrap();
        let bytes = vec![9u8; 1500];
        let source = write_fixture(&dir, "source.txt", &bytes);
        let digests = file_digests(&source).unwrap();

        let corrupt = spawn_corrupt_seeder(2);

        let dest = dir.path().join("downloaded.txt");
        let job = DownloadJob {
            file: "notes.txt".to_string(),
            group: "dev".to_string(),
            dest: dest.clone(),
            size: 1500,
            file_hash: digests.file_hash,
            piece_hashes: digests.piece_hashes,
            peers: vec![corrupt],
        };

        let store = Arc::new(PieceStore::new());
        let logger = Arc::new(Logger::stdout("leecher"));
        assert!(fetch_all(&job, &store, &logger).is_err());
        // the partial file stays on disk for diagnosis
        assert!(dest.exists());
    }

    #[test]
    fn test_unreachable_peers_abort_before_any_write() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("downloaded.txt");
        let h = "a".repeat(64);
        let job = DownloadJob {
            file: "notes.txt".to_string(),
            group: "dev".to_string(),
            dest: dest.clone(),
            size: 100,
            file_hash: h.clone(),
            piece_hashes: vec![h],
            // nothing is listening here
            peers: vec!["127.0.0.1:1".to_string()],
        };

        let store = Arc::new(PieceStore::new());
        let logger = Arc::new(Logger::stdout("leecher"));
        assert!(fetch_all(&job, &store, &logger).is_err());
        assert!(!dest.exists());
        assert!(store.available_pieces("notes.txt", "dev").is_none());
    }
}
