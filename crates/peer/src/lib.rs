pub mod board;
pub mod download;
pub mod leecher;
pub mod seeder;
pub mod store;

pub use board::{DownloadBoard, DownloadState};
pub use leecher::Leecher;
pub use seeder::Seeder;
pub use store::PieceStore;
