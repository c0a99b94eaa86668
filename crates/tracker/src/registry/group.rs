use std::collections::{HashMap, HashSet};

use gshare_core::error::{ShareError, ShareResult};

use super::Registry;

/// One advertised file inside a group. The record persists even when its
/// seeder set empties out.
pub(crate) struct FileRecord {
    pub(crate) size: u64,
    pub(crate) file_hash: String,
    pub(crate) piece_hashes: Vec<String>,
    pub(crate) seeders: HashSet<String>,
}

/// A sharing group. Participants are kept in join order; index 0 is the
/// current owner.
pub(crate) struct Group {
    pub(crate) participants: Vec<String>,
    pub(crate) pending: HashSet<String>,
    pub(crate) files: HashMap<String, FileRecord>,
}

impl Group {
    fn owner(&self) -> Option<&str> {
        self.participants.first().map(String::as_str)
    }

    fn is_participant(&self, username: &str) -> bool {
        self.participants.iter().any(|p| p == username)
    }
}

fn require_group<'a>(
    groups: &'a mut HashMap<String, Group>,
    name: &str,
) -> ShareResult<&'a mut Group> {
    groups
        .get_mut(name)
        .ok_or_else(|| ShareError::conflict("no such group"))
}

impl Registry {
    pub fn create_group(&self, group_name: &str, token: &str) -> ShareResult<String> {
        let username = self.authenticate(token)?;

        let mut users = self.users.lock().unwrap();
        let mut groups = self.groups.lock().unwrap();
        if groups.contains_key(group_name) {
            return Err(ShareError::conflict("group already exists"));
        }
        groups.insert(
            group_name.to_string(),
            Group {
                participants: vec![username.clone()],
                pending: HashSet::new(),
                files: HashMap::new(),
            },
        );
        if let Some(user) = users.get_mut(&username) {
            user.groups.insert(group_name.to_string());
        }
        Ok(format!("group {group_name} created"))
    }

    pub fn join_group(&self, group_name: &str, token: &str) -> ShareResult<String> {
        let username = self.authenticate(token)?;

        let mut groups = self.groups.lock().unwrap();
        let group = require_group(&mut groups, group_name)?;
        if group.is_participant(&username) {
            return Err(ShareError::conflict("already a participant of this group"));
        }
        if !group.pending.insert(username) {
            return Err(ShareError::conflict("join request already pending"));
        }
        Ok(format!("join request for {group_name} sent"))
    }

    /// Leaving shifts ownership to the next participant in join order and
    /// withdraws the caller's file advertisements in that group.
    pub fn leave_group(&self, group_name: &str, token: &str) -> ShareResult<String> {
        let username = self.authenticate(token)?;

        let mut users = self.users.lock().unwrap();
        let mut groups = self.groups.lock().unwrap();
        let group = require_group(&mut groups, group_name)?;
        let position = group
            .participants
            .iter()
            .position(|p| p == &username)
            .ok_or_else(|| ShareError::auth("not a participant of this group"))?;

        group.participants.remove(position);
        for record in group.files.values_mut() {
            record.seeders.remove(&username);
        }
        if let Some(user) = users.get_mut(&username) {
            user.groups.remove(group_name);
        }
        Ok(format!("left group {group_name}"))
    }

    pub fn list_requests(&self, group_name: &str, token: &str) -> ShareResult<String> {
        let username = self.authenticate(token)?;

        let mut groups = self.groups.lock().unwrap();
        let group = require_group(&mut groups, group_name)?;
        if group.owner() != Some(username.as_str()) {
            return Err(ShareError::auth(
                "only the group owner can list join requests",
            ));
        }
        let mut pending: Vec<&String> = group.pending.iter().collect();
        pending.sort();
        Ok(pending
            .into_iter()
            .cloned()
            .collect::<Vec<String>>()
            .join(" "))
    }

    pub fn accept_request(
        &self,
        group_name: &str,
        pending_user: &str,
        token: &str,
    ) -> ShareResult<String> {
        let username = self.authenticate(token)?;

        let mut users = self.users.lock().unwrap();
        let mut groups = self.groups.lock().unwrap();
        let group = require_group(&mut groups, group_name)?;
        if group.owner() != Some(username.as_str()) {
            return Err(ShareError::auth(
                "only the group owner can accept join requests",
            ));
        }
        if !group.pending.remove(pending_user) {
            return Err(ShareError::conflict("no pending request from that user"));
        }
        group.participants.push(pending_user.to_string());
        if let Some(user) = users.get_mut(pending_user) {
            user.groups.insert(group_name.to_string());
        }
        Ok(format!("{pending_user} added to {group_name}"))
    }

    pub fn list_groups(&self, token: &str) -> ShareResult<String> {
        self.authenticate(token)?;

        let groups = self.groups.lock().unwrap();
        let mut names: Vec<&String> = groups.keys().collect();
        names.sort();
        Ok(names
            .into_iter()
            .cloned()
            .collect::<Vec<String>>()
            .join(" "))
    }

    pub fn list_files(&self, group_name: &str, token: &str) -> ShareResult<String> {
        self.authenticate(token)?;

        let mut groups = self.groups.lock().unwrap();
        let group = require_group(&mut groups, group_name)?;
        let mut names: Vec<&String> = group.files.keys().collect();
        names.sort();
        Ok(names
            .into_iter()
            .cloned()
            .collect::<Vec<String>>()
            .join(" "))
    }

    /// Create the file record on first upload, or check the caller's copy
    /// against the stored one; either way the caller becomes a seeder.
    pub fn upload_file(
        &self,
        file_name: &str,
        group_name: &str,
        size: u64,
        file_hash: &str,
        piece_hashes: &[String],
        token: &str,
    ) -> ShareResult<String> {
        let username = self.authenticate(token)?;

        let mut groups = self.groups.lock().unwrap();
        let group = require_group(&mut groups, group_name)?;
        if !group.is_participant(&username) {
            return Err(ShareError::auth("not a participant of this group"));
        }

        match group.files.get_mut(file_name) {
            Some(record) => {
                if record.size != size
                    || record.file_hash != file_hash
                    || record.piece_hashes != piece_hashes
                {
                    return Err(ShareError::conflict(
                        "file already exists in the group with different contents",
                    ));
                }
                record.seeders.insert(username);
            }
            None => {
                let mut seeders = HashSet::new();
                seeders.insert(username);
                group.files.insert(
                    file_name.to_string(),
                    FileRecord {
                        size,
                        file_hash: file_hash.to_string(),
                        piece_hashes: piece_hashes.to_vec(),
                        seeders,
                    },
                );
            }
        }
        Ok(format!("{file_name} shared in {group_name}"))
    }

    /// Metadata lookup for a download: size, whole-file hash, per-piece
    /// hashes, then the seeder addresses. Piece transfer itself is between
    /// peers.
    pub fn download_file(
        &self,
        file_name: &str,
        group_name: &str,
        token: &str,
    ) -> ShareResult<String> {
        let username = self.authenticate(token)?;

        // Addresses are snapshotted before taking the groups lock so the
        // acquisition order stays users -> addresses -> groups.
        let addresses = self.addresses.lock().unwrap().clone();

        let mut groups = self.groups.lock().unwrap();
        let group = require_group(&mut groups, group_name)?;
        if !group.is_participant(&username) {
            return Err(ShareError::auth("not a participant of this group"));
        }
        let record = group
            .files
            .get(file_name)
            .ok_or_else(|| ShareError::conflict("no such file in the group"))?;

        let mut seeders: Vec<&String> = record.seeders.iter().collect();
        seeders.sort();
        let mut payload = format!("{} {}", record.size, record.file_hash);
        for hash in &record.piece_hashes {
            payload.push(' ');
            payload.push_str(hash);
        }
        for seeder in seeders {
            if let Some(address) = addresses.get(seeder) {
                payload.push(' ');
                payload.push_str(address);
            }
        }
        Ok(payload)
    }

    pub fn stop_share(
        &self,
        group_name: &str,
        file_name: &str,
        token: &str,
    ) -> ShareResult<String> {
        let username = self.authenticate(token)?;

        let mut groups = self.groups.lock().unwrap();
        let group = require_group(&mut groups, group_name)?;
        let record = group
            .files
            .get_mut(file_name)
            .ok_or_else(|| ShareError::conflict("no such file in the group"))?;
        record.seeders.remove(&username);
        Ok(format!("stopped sharing {file_name} in {group_name}"))
    }
}
