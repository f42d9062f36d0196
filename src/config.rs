//! Profile configuration and option resolution.
//!
//! Profiles live in an INI file, one section per profile:
//!
//! ```ini
//! [DEFAULT]
//! session_ttl = 15
//!
//! [work]
//! domain = acme
//! vault = Private
//! debug = false
//! temp_file = ~/.cache/oppy/work-items
//!
//! [personal]
//! domain = my
//! vault = null
//! ```
//!
//! Each value is resolved with the following precedence, highest first:
//! explicit command-line flag, the profile section, the `[DEFAULT]` section,
//! then the built-in default.

use crate::error::ConfigError;
use ini::{Ini, Properties};
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the profile file.
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/op.py/config.ini";

/// Default lifetime of a cached session when `op` reports none.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Longest accepted `session_ttl`, in minutes (one week).
pub const MAX_SESSION_TTL_MINUTES: u64 = 7 * 24 * 60;

/// Default name of the 1Password CLI binary.
pub const DEFAULT_OP_PATH: &str = "op";

/// Section whose keys act as fallbacks for every profile.
const DEFAULT_SECTION: &str = "DEFAULT";

/// Vault value meaning "no vault restriction".
const NULL_VAULT: &str = "null";

/// A named profile as declared in the config file.
///
/// Values from `[DEFAULT]` and built-in defaults are already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Section name
    pub name: String,
    /// 1Password account shorthand or sign-in address
    pub domain: String,
    /// Default vault, `None` when unrestricted
    pub vault: Option<String>,
    /// Verbose logging
    pub debug: bool,
    /// Local lifetime of a session token
    pub session_ttl: Duration,
    /// Base path of the encrypted item-list cache (`temp_file`)
    pub item_cache: Option<PathBuf>,
}

impl Profile {
    /// Builds a profile from its INI section, validating every typed field.
    ///
    /// Keys are matched case-insensitively. Unknown keys are ignored.
    pub fn from_section(
        name: &str,
        section: &Properties,
        defaults: Option<&Properties>,
    ) -> Result<Self, ConfigError> {
        let lookup = |key: &str| -> Option<String> {
            find_key(section, key).or_else(|| defaults.and_then(|d| find_key(d, key)))
        };

        let domain = lookup("domain")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                profile: name.to_string(),
                key: "domain",
            })?;

        let vault = lookup("vault").and_then(|v| parse_vault(&v));

        let debug = match lookup("debug") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                profile: name.to_string(),
                key: "debug",
                value: raw.clone(),
                expected: "a boolean (true/false, yes/no, on/off, 1/0)",
            })?,
            None => false,
        };

        let session_ttl = match lookup("session_ttl") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(minutes) if (1..=MAX_SESSION_TTL_MINUTES).contains(&minutes) => {
                    Duration::from_secs(minutes * 60)
                }
                _ => {
                    return Err(ConfigError::InvalidValue {
                        profile: name.to_string(),
                        key: "session_ttl",
                        value: raw.clone(),
                        expected: "a number of minutes between 1 and 10080",
                    })
                }
            },
            None => DEFAULT_SESSION_TTL,
        };

        let item_cache = lookup("temp_file")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(|v| expand_home(&v));

        Ok(Self {
            name: name.to_string(),
            domain,
            vault,
            debug,
            session_ttl,
            item_cache,
        })
    }
}

/// Every profile declared in one config file.
#[derive(Debug, Clone)]
pub struct ProfileSet {
    path: PathBuf,
    profiles: Vec<Profile>,
}

impl ProfileSet {
    /// Reads and validates the config file at `path`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NotFound`] if the file does not exist
    /// - [`ConfigError::Unreadable`] for any other I/O failure
    /// - [`ConfigError::Malformed`] if the file is not valid INI
    /// - [`ConfigError::MissingKey`] / [`ConfigError::InvalidValue`] if any
    ///   profile section fails validation
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path))
            }
            Err(e) => return Err(ConfigError::Unreadable { path, source: e }),
        };

        Self::parse(&content, path)
    }

    /// Parses config content already in memory. `path` is only used in errors.
    pub fn parse(content: &str, path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let ini = Ini::load_from_str(content).map_err(|e| ConfigError::Malformed {
            path: path.clone(),
            message: e.to_string(),
        })?;

        reject_duplicates(&ini, &path)?;
        let defaults = ini.section(Some(DEFAULT_SECTION));

        let mut profiles = Vec::new();
        for (name, section) in ini.iter() {
            let Some(name) = name else { continue };
            if name == DEFAULT_SECTION {
                continue;
            }
            profiles.push(Profile::from_section(name, section, defaults)?);
        }

        Ok(Self { path, profiles })
    }

    /// Looks up a profile by exact name.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.to_string(),
                path: self.path.clone(),
            })
    }
}

/// Values given explicitly on the command line.
///
/// ```
/// use oppy::config::Overrides;
///
/// let overrides = Overrides::default().with_debug(true).with_vault("Shared");
/// assert_eq!(overrides.vault.as_deref(), Some("Shared"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// `--vault`
    pub vault: Option<String>,
    /// `--debug`; only ever forces debug on
    pub debug: bool,
    /// `--op-path`
    pub op_path: Option<String>,
}

impl Overrides {
    /// Sets the vault override.
    pub fn with_vault(mut self, vault: impl Into<String>) -> Self {
        self.vault = Some(vault.into());
        self
    }

    /// Sets the debug flag.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the `op` binary override.
    pub fn with_op_path(mut self, op_path: impl Into<String>) -> Self {
        self.op_path = Some(op_path.into());
        self
    }
}

/// Final option set for one shell session.
///
/// Values are never mutated in place; shell commands that change the vault
/// or debug mode derive a new value with [`with_vault`](Self::with_vault) or
/// [`with_debug`](Self::with_debug).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveOptions {
    pub profile: String,
    pub domain: String,
    pub vault: Option<String>,
    pub debug: bool,
    pub config_path: PathBuf,
    #[serde(rename = "session_ttl_minutes", serialize_with = "serialize_minutes")]
    pub session_ttl: Duration,
    pub op_path: String,
    pub item_cache: Option<PathBuf>,
}

impl EffectiveOptions {
    /// Merges a profile with command-line overrides.
    pub fn merge(profile: &Profile, overrides: &Overrides, config_path: impl Into<PathBuf>) -> Self {
        let vault = match &overrides.vault {
            Some(v) => parse_vault(v),
            None => profile.vault.clone(),
        };

        Self {
            profile: profile.name.clone(),
            domain: profile.domain.clone(),
            vault,
            debug: overrides.debug || profile.debug,
            config_path: config_path.into(),
            session_ttl: profile.session_ttl,
            op_path: overrides
                .op_path
                .clone()
                .unwrap_or_else(|| DEFAULT_OP_PATH.to_string()),
            item_cache: profile.item_cache.clone(),
        }
    }

    /// Returns a copy with the vault changed. `null`, `None` and the empty
    /// string clear the restriction.
    pub fn with_vault(&self, vault: &str) -> Self {
        Self {
            vault: parse_vault(vault),
            ..self.clone()
        }
    }

    /// Returns a copy with debug mode changed.
    pub fn with_debug(&self, debug: bool) -> Self {
        Self {
            debug,
            ..self.clone()
        }
    }
}

/// Loads `path` and resolves `profile` against `overrides`.
///
/// # Example
///
/// ```no_run
/// use oppy::config::{self, Overrides};
///
/// let options = config::resolve("/home/me/.config/op.py/config.ini", "work", &Overrides::default())?;
/// println!("signing in to {}", options.domain);
/// # Ok::<(), oppy::ConfigError>(())
/// ```
pub fn resolve(
    path: impl AsRef<Path>,
    profile: &str,
    overrides: &Overrides,
) -> Result<EffectiveOptions, ConfigError> {
    let path = path.as_ref();
    let profiles = ProfileSet::load(path)?;
    let profile = profiles.profile(profile)?;
    Ok(EffectiveOptions::merge(profile, overrides, path))
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parses the boolean literals accepted by INI files.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

fn parse_vault(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == NULL_VAULT || raw == "None" {
        None
    } else {
        Some(raw.to_string())
    }
}

/// A repeated section or a repeated key within a section is ambiguous, so
/// the whole file is rejected.
fn reject_duplicates(ini: &Ini, path: &Path) -> Result<(), ConfigError> {
    let malformed = |message: String| ConfigError::Malformed {
        path: path.to_path_buf(),
        message,
    };

    let mut sections = HashSet::new();
    for (name, section) in ini.iter() {
        if let Some(name) = name {
            if !sections.insert(name) {
                return Err(malformed(format!("duplicate section [{name}]")));
            }
        }

        let mut keys = HashSet::new();
        for (key, _) in section.iter() {
            if !keys.insert(key.to_ascii_lowercase()) {
                return Err(malformed(format!(
                    "duplicate key '{key}' in section [{}]",
                    name.unwrap_or("general")
                )));
            }
        }
    }
    Ok(())
}

fn find_key(section: &Properties, key: &str) -> Option<String> {
    section
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.to_string())
}

fn serialize_minutes<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(ttl.as_secs() / 60)
}
