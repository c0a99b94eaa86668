use gshare_config::PIECE_SIZE;

/// Split `buffer` on `separator`, dropping empty tokens the way the command
/// surface expects (runs of separators collapse).
pub fn tokenize(buffer: &str, separator: char) -> Vec<String> {
    buffer
        .split(separator)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Number of pieces a file of `file_size` bytes splits into.
pub fn piece_count(file_size: u64) -> u32 {
    ((file_size + PIECE_SIZE as u64 - 1) / PIECE_SIZE as u64) as u32
}

/// Byte length of piece `piece` in a file of `file_size` bytes.
pub fn piece_len(file_size: u64, piece: u32) -> usize {
    let offset = piece as u64 * PIECE_SIZE as u64;
    std::cmp::min(PIECE_SIZE as u64, file_size.saturating_sub(offset)) as usize
}
