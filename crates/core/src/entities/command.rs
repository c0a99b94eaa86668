use crate::error::{ShareError, ShareResult};
use crate::helpers::{piece_count, tokenize};

/// A leecher-to-tracker command, parsed from the space-delimited wire text.
///
/// Authenticated commands carry their session token as the trailing argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateUser {
        username: String,
        password: String,
    },
    Login {
        username: String,
        password: String,
        address: String,
    },
    Logout {
        token: String,
    },
    CreateGroup {
        group: String,
        token: String,
    },
    JoinGroup {
        group: String,
        token: String,
    },
    LeaveGroup {
        group: String,
        token: String,
    },
    ListRequests {
        group: String,
        token: String,
    },
    AcceptRequest {
        group: String,
        username: String,
        token: String,
    },
    ListGroups {
        token: String,
    },
    ListFiles {
        group: String,
        token: String,
    },
    UploadFile {
        file: String,
        group: String,
        size: u64,
        file_hash: String,
        piece_hashes: Vec<String>,
        token: String,
    },
    DownloadFile {
        file: String,
        group: String,
        token: String,
    },
    StopShare {
        group: String,
        file: String,
        token: String,
    },
}

impl Command {
    /// Parse one command line; arity and format problems come back as
    /// `Input` errors.
    pub fn parse(line: &str) -> ShareResult<Command> {
        let tokens = tokenize(line, ' ');
        let Some(name) = tokens.first() else {
            return Err(ShareError::input("empty command"));
        };

        match name.as_str() {
            "create_user" => {
                expect_arity(&tokens, 3)?;
                Ok(Command::CreateUser {
                    username: tokens[1].clone(),
                    password: tokens[2].clone(),
                })
            }
            "login" => {
                expect_arity(&tokens, 4)?;
                Ok(Command::Login {
                    username: tokens[1].clone(),
                    password: tokens[2].clone(),
                    address: tokens[3].clone(),
                })
            }
            "logout" => {
                expect_arity(&tokens, 2)?;
                Ok(Command::Logout {
                    token: tokens[1].clone(),
                })
            }
            "create_group" => {
                expect_arity(&tokens, 3)?;
                Ok(Command::CreateGroup {
                    group: tokens[1].clone(),
                    token: tokens[2].clone(),
                })
            }
            "join_group" => {
                expect_arity(&tokens, 3)?;
                Ok(Command::JoinGroup {
                    group: tokens[1].clone(),
                    token: tokens[2].clone(),
                })
            }
            "leave_group" => {
                expect_arity(&tokens, 3)?;
                Ok(Command::LeaveGroup {
                    group: tokens[1].clone(),
                    token: tokens[2].clone(),
                })
            }
            "list_requests" => {
                expect_arity(&tokens, 3)?;
                Ok(Command::ListRequests {
                    group: tokens[1].clone(),
                    token: tokens[2].clone(),
                })
            }
            "accept_request" => {
                expect_arity(&tokens, 4)?;
                Ok(Command::AcceptRequest {
                    group: tokens[1].clone(),
                    username: tokens[2].clone(),
                    token: tokens[3].clone(),
                })
            }
            "list_groups" => {
                expect_arity(&tokens, 2)?;
                Ok(Command::ListGroups {
                    token: tokens[1].clone(),
                })
            }
            "list_files" => {
                expect_arity(&tokens, 3)?;
                Ok(Command::ListFiles {
                    group: tokens[1].clone(),
                    token: tokens[2].clone(),
                })
            }
            "upload_file" => parse_upload(&tokens),
            "download_file" => {
                expect_arity(&tokens, 4)?;
                Ok(Command::DownloadFile {
                    file: tokens[1].clone(),
                    group: tokens[2].clone(),
                    token: tokens[3].clone(),
                })
            }
            "stop_share" => {
                expect_arity(&tokens, 4)?;
                Ok(Command::StopShare {
                    group: tokens[1].clone(),
                    file: tokens[2].clone(),
                    token: tokens[3].clone(),
                })
            }
            _ => Err(ShareError::input("unknown command")),
        }
    }
}

// upload_file F G size sha_full sha_0 .. sha_{P-1} token
fn parse_upload(tokens: &[String]) -> ShareResult<Command> {
    if tokens.len() < 6 {
        return Err(ShareError::input("wrong number of arguments to upload_file"));
    }
    let size: u64 = tokens[3]
        .parse()
        .map_err(|_| ShareError::input("file size is not a number"))?;

    let file_hash = tokens[4].clone();
    let piece_hashes: Vec<String> = tokens[5..tokens.len() - 1].to_vec();
    let token = tokens[tokens.len() - 1].clone();

    if piece_hashes.len() != piece_count(size) as usize {
        return Err(ShareError::input("piece hash count does not match file size"));
    }
    for hash in std::iter::once(&file_hash).chain(piece_hashes.iter()) {
        if !looks_like_sha256(hash) {
            return Err(ShareError::input("hashes must be 64 hex characters"));
        }
    }

    Ok(Command::UploadFile {
        file: tokens[1].clone(),
        group: tokens[2].clone(),
        size,
        file_hash,
        piece_hashes,
        token,
    })
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

fn looks_like_sha256(hash: &str) -> bool {
    hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::hashing::piece_digest;

    #[test]
    fn test_parse_create_user() {
        assert_eq!(
            Command::parse("create_user alice pw").unwrap(),
            Command::CreateUser {
                username: "alice".into(),
                password: "pw".into()
            }
        );
    }

    #[test]
    fn test_parse_login() {
        assert_eq!(
            Command::parse("login alice pw 127.0.0.1:5001").unwrap(),
            Command::Login {
                username: "alice".into(),
                password: "pw".into(),
                address: "127.0.0.1:5001".into()
            }
        );
    }

    #[test]
    fn test_parse_collapses_extra_spaces() {
        assert_eq!(
            Command::parse("  create_group   dev   tok ").unwrap(),
            Command::CreateGroup {
                group: "dev".into(),
                token: "tok".into()
            }
        );
    }

    #[test]
    fn test_parse_upload_file() {
        let p0 = piece_digest(b"piece zero");
        let p1 = piece_digest(b"piece one");
        let whole = piece_digest(b"whole");
        let line = format!("upload_file notes.txt dev 1500 {whole} {p0} {p1} tok");

        match Command::parse(&line).unwrap() {
            Command::UploadFile {
                file,
                group,
                size,
                file_hash,
                piece_hashes,
                token,
            } => {
                assert_eq!(file, "notes.txt");
                assert_eq!(group, "dev");
                assert_eq!(size, 1500);
                assert_eq!(file_hash, whole);
                assert_eq!(piece_hashes, vec![p0, p1]);
                assert_eq!(token, "tok");
            }
            other => panic!("unexpected parse {:?}", other),
        }
    }

    #[test]
    fn test_upload_file_hash_count_must_match_size() {
        let h = piece_digest(b"h");
        // 1500 bytes needs two piece hashes, only one given
        let line = format!("upload_file notes.txt dev 1500 {h} {h} tok");
        assert!(matches!(
            Command::parse(&line),
            Err(ShareError::Input(_))
        ));
    }

    #[test]
    fn test_upload_file_rejects_bad_hash() {
        let line = "upload_file notes.txt dev 10 nothex nothex tok";
        assert!(matches!(Command::parse(line), Err(ShareError::Input(_))));
    }

    #[test]
    fn test_wrong_arity() {
        assert!(matches!(
            Command::parse("login alice"),
            Err(ShareError::Input(_))
        ));
        assert!(matches!(
            Command::parse("list_groups"),
            Err(ShareError::Input(_))
        ));
    }

    #[test]
    fn test_unknown_and_empty() {
        assert!(matches!(
            Command::parse("frobnicate x"),
            Err(ShareError::Input(_))
        ));
        assert!(matches!(Command::parse("   "), Err(ShareError::Input(_))));
    }
}
