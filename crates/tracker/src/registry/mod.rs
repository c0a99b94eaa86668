//! The tracker's authoritative in-memory state.
//!
//! Three coarse mutexes guard the three maps. Whenever a handler needs more
//! than one of them at a time they are acquired in the fixed order users ->
//! addresses -> groups, which keeps the lock graph acyclic.

use std::collections::HashMap;
use std::sync::Mutex;

use gshare_core::error::{ShareError, ShareResult};

use crate::auth::TokenService;

mod group;
mod user;

pub(crate) use group::Group;
pub(crate) use user::User;

pub struct Registry {
    pub(crate) users: Mutex<HashMap<String, User>>,
    pub(crate) addresses: Mutex<HashMap<String, String>>,
    pub(crate) groups: Mutex<HashMap<String, Group>>,
    pub(crate) tokens: TokenService,
}

impl Registry {
    pub fn new(tokens: TokenService) -> Registry {
        Registry {
            users: Mutex::new(HashMap::new()),
            addresses: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
            tokens,
        }
    }

    /// Resolve a token to its username.
    ///
    /// A token is live only while its user is logged in; logout removes the
    /// address entry and with it every session minted for that user.
    pub fn authenticate(&self, token: &str) -> ShareResult<String> {
        let username = self.tokens.validate(token)?;
        if !self.addresses.lock().unwrap().contains_key(&username) {
            return Err(ShareError::auth("invalid or expired token"));
        }
        Ok(username)
    }
}
