use crate::error::{ShareError, ShareResult};
use crate::helpers::tokenize;

/// A leecher-to-seeder command on the peer wire.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerCommand {
    /// Which pieces of (file, group) does this peer hold?
    GivePieceInfo { file: String, group: String },
    /// Send the raw bytes of one piece.
    GivePiece {
        file: String,
        group: String,
        piece: u32,
    },
}

impl PeerCommand {
    pub fn parse(line: &str) -> ShareResult<PeerCommand> {
        let tokens = tokenize(line, ' ');
        let Some(name) = tokens.first() else {
            return Err(ShareError::input("empty command"));
        };

        match name.as_str() {
            "give_piece_info" => {
                if tokens.len() != 3 {
                    return Err(ShareError::input(
                        "wrong number of arguments to give_piece_info",
                    ));
                }
                Ok(PeerCommand::GivePieceInfo {
                    file: tokens[1].clone(),
                    group: tokens[2].clone(),
                })
            }
            "give_piece" => {
                if tokens.len() != 4 {
                    return Err(ShareError::input("wrong number of arguments to give_piece"));
                }
                let piece: u32 = tokens[3]
                    .parse()
                    .map_err(|_| ShareError::input("piece index is not a number"))?;
                Ok(PeerCommand::GivePiece {
                    file: tokens[1].clone(),
                    group: tokens[2].clone(),
                    piece,
                })
            }
            _ => Err(ShareError::input("unknown command")),
        }
    }
}
