mod command;
mod peer_command;

pub use command::Command;
pub use peer_command::PeerCommand;
