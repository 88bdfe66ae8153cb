//! User configuration loading.
//!
//! ## 設定ファイル（YAML）
//!
//! ```yaml
//! alice:
//!   color: "#f0a"
//!   perms: [delete]            # デフォルト (read, read_live, write) を反転
//!   readWhispers: ["*"]        # "*" を含むと「列挙したユーザー以外の全員」
//!   writeWhispers: [bob]
//!   token: "env:ALICE_TOKEN"   # env: で環境変数から読み込む
//!   hidden: false
//! ```

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::{PUBLIC_RECIPIENT, Perm, Perms, User};

const DEFAULT_COLOR: u32 = 0xffffff;
const ENV_TOKEN_PREFIX: &str = "env:";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Users config '{path}' could not be read: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Users config is invalid: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("A 0-len user has been detected. This is not allowed.")]
    EmptyName,

    #[error("User '*' is special - you cannot name your user like this.")]
    ReservedName,

    #[error("User '{0}' needs to have a token!")]
    MissingToken(String),

    #[error("Spaces are not allowed in tokens, but user '{0}' uses them!")]
    TokenContainsSpace(String),

    #[error("User '{user}' has an invalid color '{color}'")]
    InvalidColor { user: String, color: String },

    #[error("User '{user}' has unrecognized perm '{perm}'")]
    UnknownPerm { user: String, perm: String },

    #[error("User '{user}' tries to {op} whispers from user '{target}', who doesn't exist!")]
    UnknownWhisperTarget {
        user: String,
        op: &'static str,
        target: String,
    },

    #[error("No users loaded")]
    NoUsers,
}

/// One user entry as written in the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ConfUser {
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    perms: Vec<String>,
    #[serde(default)]
    read_whispers: Option<Vec<String>>,
    #[serde(default)]
    write_whispers: Option<Vec<String>>,
    #[serde(default)]
    token: String,
    #[serde(default)]
    hidden: bool,
}

/// All configured users, by name.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, Arc<User>>,
}

impl UserDirectory {
    /// Load and validate the users file.
    pub fn load(path: impl AsRef<Path>, check_tokens: bool) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let directory = Self::from_yaml(&raw, check_tokens, |var| std::env::var(var).ok())?;

        tracing::info!("Loaded {} users:", directory.users.len());
        let mut names: Vec<_> = directory.users.keys().collect();
        names.sort();
        for name in names {
            let user = &directory.users[name];
            tracing::info!(
                "\t{}#{:06X}: ({})",
                user.name,
                user.color,
                user.perms.names().join(", ")
            );
        }

        Ok(directory)
    }

    /// Parse a users config. `env` resolves `env:VAR` tokens.
    pub fn from_yaml(
        raw: &str,
        check_tokens: bool,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Err(ConfigError::NoUsers);
        }
        let conf: Option<HashMap<String, ConfUser>> = serde_yaml::from_str(raw)?;
        let conf = conf
            .filter(|conf| !conf.is_empty())
            .ok_or(ConfigError::NoUsers)?;

        let names: BTreeSet<String> = conf.keys().cloned().collect();
        let mut users = HashMap::with_capacity(conf.len());

        for (name, entry) in conf {
            let user = build_user(name, entry, &names, check_tokens, &env)?;
            users.insert(user.name.clone(), Arc::new(user));
        }

        Ok(Self { users })
    }

    pub fn get(&self, name: &str) -> Option<Arc<User>> {
        self.users.get(name).cloned()
    }

    /// The user named `name` if `token` matches theirs.
    pub fn authenticate(&self, name: &str, token: &str) -> Option<Arc<User>> {
        self.users
            .get(name)
            .filter(|user| user.token == token)
            .cloned()
    }

    /// Users sorted by name.
    pub fn all(&self) -> Vec<Arc<User>> {
        let mut users: Vec<_> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        users
    }
}

fn build_user(
    name: String,
    entry: ConfUser,
    names: &BTreeSet<String>,
    check_tokens: bool,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<User, ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::EmptyName);
    }
    if name == PUBLIC_RECIPIENT {
        return Err(ConfigError::ReservedName);
    }

    let token = match entry.token.strip_prefix(ENV_TOKEN_PREFIX) {
        Some(var) => env(var).unwrap_or_default(),
        None => entry.token,
    };
    if check_tokens {
        if token.is_empty() {
            return Err(ConfigError::MissingToken(name));
        }
        if token.contains(' ') {
            return Err(ConfigError::TokenContainsSpace(name));
        }
    }

    let color = match entry.color.as_deref() {
        Some(raw) => parse_color(raw).ok_or_else(|| ConfigError::InvalidColor {
            user: name.clone(),
            color: raw.to_string(),
        })?,
        None => DEFAULT_COLOR,
    };

    let mut perms = Perms::default_set();
    for raw in &entry.perms {
        let perm = Perm::parse(raw).ok_or_else(|| ConfigError::UnknownPerm {
            user: name.clone(),
            perm: raw.clone(),
        })?;
        perms = perms.toggled(perm);
    }

    let read_list = entry.read_whispers.unwrap_or_else(|| vec![name.clone()]);
    let write_list = entry
        .write_whispers
        .unwrap_or_else(|| vec![PUBLIC_RECIPIENT.to_string()]);
    let read_whispers = resolve_whisper_set(&name, "read", &read_list, names)?;
    let write_whispers = resolve_whisper_set(&name, "write", &write_list, names)?;
    let read_all_whispers = read_whispers.len() == names.len();

    Ok(User {
        name,
        color,
        perms,
        read_whispers,
        write_whispers,
        read_all_whispers,
        hidden: entry.hidden,
        token,
    })
}

/// Resolve a whisper list into the set of target users.
///
/// Without `"*"` the set is exactly the listed users. With `"*"` it is every
/// configured user except the other listed names.
fn resolve_whisper_set(
    user: &str,
    op: &'static str,
    list: &[String],
    names: &BTreeSet<String>,
) -> Result<BTreeSet<String>, ConfigError> {
    let mut listed = BTreeSet::new();
    let mut wildcard = false;

    for target in list {
        if target == PUBLIC_RECIPIENT {
            wildcard = true;
        } else if names.contains(target) {
            listed.insert(target.clone());
        } else {
            return Err(ConfigError::UnknownWhisperTarget {
                user: user.to_string(),
                op,
                target: target.clone(),
            });
        }
    }

    if wildcard {
        Ok(names.difference(&listed).cloned().collect())
    } else {
        Ok(listed)
    }
}

/// Parse `#rgb`, `#rrggbb`, `0xrrggbb` or a bare hex color.
fn parse_color(raw: &str) -> Option<u32> {
    let hex = raw
        .strip_prefix('#')
        .or_else(|| raw.strip_prefix("0x"))
        .unwrap_or(raw);

    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };

    u32::from_str_radix(&expanded, 16).ok()
}
