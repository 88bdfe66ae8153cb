//! User and permission model.
//!
//! Users are loaded once at startup (see `infrastructure::users`) and are
//! read-only afterwards.

use std::collections::BTreeSet;

use serde::Serialize;

use super::message::{Message, PUBLIC_RECIPIENT};

/// A single permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perm {
    /// Read the message history.
    Read,
    /// Receive messages live over the websocket.
    ReadLive,
    /// Post public messages.
    Write,
    /// Delete the most recent message.
    Delete,
}

impl Perm {
    pub const ALL: [Perm; 4] = [Perm::Read, Perm::ReadLive, Perm::Write, Perm::Delete];

    fn bit(self) -> u8 {
        match self {
            Perm::Read => 1 << 0,
            Perm::ReadLive => 1 << 1,
            Perm::Write => 1 << 2,
            Perm::Delete => 1 << 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Perm::Read => "read",
            Perm::ReadLive => "read_live",
            Perm::Write => "write",
            Perm::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Perm> {
        Perm::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

/// A set of permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Perms(u8);

impl Perms {
    pub const NONE: Perms = Perms(0);

    /// `read`, `read_live` and `write`.
    pub fn default_set() -> Self {
        Perms::NONE
            .with(Perm::Read)
            .with(Perm::ReadLive)
            .with(Perm::Write)
    }

    pub fn all() -> Self {
        Perm::ALL.into_iter().fold(Perms::NONE, Perms::with)
    }

    pub fn with(self, perm: Perm) -> Self {
        Perms(self.0 | perm.bit())
    }

    pub fn toggled(self, perm: Perm) -> Self {
        Perms(self.0 ^ perm.bit())
    }

    pub fn has(self, perm: Perm) -> bool {
        self.0 & perm.bit() == perm.bit()
    }

    pub fn names(self) -> Vec<&'static str> {
        Perm::ALL
            .into_iter()
            .filter(|p| self.has(*p))
            .map(Perm::as_str)
            .collect()
    }
}

/// A configured user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    /// 24-bit RGB color.
    pub color: u32,
    pub perms: Perms,
    /// Whisper targets whose messages this user may read.
    pub read_whispers: BTreeSet<String>,
    /// Whisper targets this user may send to.
    pub write_whispers: BTreeSet<String>,
    /// Set when `read_whispers` covers every configured user.
    pub read_all_whispers: bool,
    /// Hidden users are left out of the public user list.
    pub hidden: bool,
    pub token: String,
}

/// Public view of a user's permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermsView {
    pub name: String,
    pub color: u32,
    pub perms: Vec<&'static str>,
    pub read_all_whispers: bool,
    pub read_whispers: Vec<String>,
    pub write_whispers: Vec<String>,
}

impl User {
    /// A user with default permissions and the default whisper sets.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            read_whispers: BTreeSet::from([name.clone()]),
            write_whispers: BTreeSet::new(),
            name,
            color: 0xffffff,
            perms: Perms::default_set(),
            read_all_whispers: false,
            hidden: false,
            token: String::new(),
        }
    }

    /// A reader that sees every message, used by the export command.
    pub fn omniscient() -> Self {
        Self {
            read_all_whispers: true,
            perms: Perms::all(),
            read_whispers: BTreeSet::new(),
            ..Self::new("")
        }
    }

    /// A reader that only sees public messages.
    pub fn public_only() -> Self {
        Self {
            read_whispers: BTreeSet::new(),
            ..Self::new("")
        }
    }

    pub fn has_perm(&self, perm: Perm) -> bool {
        self.perms.has(perm)
    }

    /// Whether this user may see `msg`.
    pub fn can_read(&self, msg: &Message) -> bool {
        msg.is_public() || self.read_all_whispers || self.read_whispers.contains(&msg.to)
    }

    /// Whether this user may post a message addressed to `to`.
    pub fn can_write_to(&self, to: &str) -> bool {
        if to == PUBLIC_RECIPIENT {
            self.has_perm(Perm::Write)
        } else {
            self.write_whispers.contains(to)
        }
    }

    pub fn perms_view(&self) -> PermsView {
        PermsView {
            name: self.name.clone(),
            color: self.color,
            perms: self.perms.names(),
            read_all_whispers: self.read_all_whispers,
            read_whispers: self.read_whispers.iter().cloned().collect(),
            write_whispers: self.write_whispers.iter().cloned().collect(),
        }
    }
}
