use std::collections::HashSet;

use gshare_core::error::{ShareError, ShareResult};

use super::Registry;

/// One registered account. Accounts live for the tracker process lifetime.
pub(crate) struct User {
    pub(crate) password: String,
    pub(crate) groups: HashSet<String>,
}

impl Registry {
    pub fn create_user(&self, username: &str, password: &str) -> ShareResult<String> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(username) {
            return Err(ShareError::conflict("user already exists"));
        }
        users.insert(
            username.to_string(),
            User {
                password: password.to_string(),
                groups: HashSet::new(),
            },
        );
        Ok(format!("user {username} created"))
    }

    /// Verify credentials, record the peer's seeder address and mint a
    /// session token. The token is the whole response payload.
    pub fn login(&self, username: &str, password: &str, address: &str) -> ShareResult<String> {
        {
            let users = self.users.lock().unwrap();
            let user = users
                .get(username)
                .ok_or_else(|| ShareError::conflict("no such user"))?;
            if user.password != password {
                return Err(ShareError::auth("invalid credentials"));
            }
        }

        let mut addresses = self.addresses.lock().unwrap();
        if addresses.contains_key(username) {
            return Err(ShareError::conflict("user is already logged in"));
        }
        addresses.insert(username.to_string(), address.to_string());
        Ok(self.tokens.mint(username))
    }

    /// End the session: drop the address entry and purge the user from every
    /// seeder set it appears in (a session-wide stop-share).
    pub fn logout(&self, token: &str) -> ShareResult<String> {
        let username = self.authenticate(token)?;

        let member_of: Vec<String> = {
            let users = self.users.lock().unwrap();
            users
                .get(&username)
                .map(|u| u.groups.iter().cloned().collect())
                .unwrap_or_default()
        };

        self.addresses.lock().unwrap().remove(&username);

        let mut groups = self.groups.lock().unwrap();
        for name in member_of {
            if let Some(group) = groups.get_mut(&name) {
                for record in group.files.values_mut() {
                    record.seeders.remove(&username);
                }
            }
        }
        Ok("logged out".to_string())
    }
}
