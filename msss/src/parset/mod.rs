//! Parameter-set store.
//!
//! A parameter set ("parset") is an ordered mapping of dotted keys to text
//! values. The pipeline reads one top-level set, slices it into per-stage
//! subsets, and hands each external tool its own patched copy written to
//! scratch. The loaded set is never modified in memory or on disk.

mod value;

pub use value::{format_vector, parse_vector};

use crate::scratch::{ScratchContext, ScratchFile};
use msss_shared::errors::{MsssError, MsssResult};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Hierarchical key-value configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: BTreeMap<String, String>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a parameter set from a file.
    pub fn load(path: impl AsRef<Path>) -> MsssResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MsssError::FileNotFound(path.to_path_buf()),
            _ => MsssError::Io(e),
        })?;
        Self::parse(&text, path)
    }

    /// Parse parameter-set text. `origin` is only used in error messages.
    pub fn parse(text: &str, origin: &Path) -> MsssResult<Self> {
        let mut entries = BTreeMap::new();
        for (index, raw) in text.lines().enumerate() {
            let line = value::strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| MsssError::parse(origin, index + 1, "expected key = value"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(MsssError::parse(origin, index + 1, "empty key"));
            }
            entries.insert(key.to_string(), value::unquote(value.trim()).to_string());
        }
        Ok(Self { entries })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Raw text value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> MsssResult<&str> {
        self.get(key)
            .ok_or_else(|| MsssError::MissingKey(key.to_string()))
    }

    pub fn get_string(&self, key: &str) -> MsssResult<String> {
        self.require(key).map(str::to_string)
    }

    pub fn get_int(&self, key: &str) -> MsssResult<i64> {
        value::parse_int(key, self.require(key)?)
    }

    pub fn get_float(&self, key: &str) -> MsssResult<f64> {
        value::parse_float(key, self.require(key)?)
    }

    pub fn get_bool(&self, key: &str) -> MsssResult<bool> {
        value::parse_bool(key, self.require(key)?)
    }

    pub fn get_string_vec(&self, key: &str) -> MsssResult<Vec<String>> {
        parse_vector(key, self.require(key)?)
    }

    /// Keys under `prefix.`, with that prefix removed. An empty result is
    /// not an error.
    pub fn subset(&self, prefix: &str) -> ParameterSet {
        let dotted = format!("{}.", prefix);
        Self {
            entries: self
                .entries
                .range(dotted.clone()..)
                .take_while(|(k, _)| k.starts_with(&dotted))
                .map(|(k, v)| (k[dotted.len()..].to_string(), v.clone()))
                .collect(),
        }
    }

    /// Copy of this set with `overrides` applied. Every override key must
    /// already be defined.
    pub fn patched(&self, overrides: &[(&str, String)]) -> MsssResult<ParameterSet> {
        let mut entries = self.entries.clone();
        for (key, value) in overrides {
            match entries.get_mut(*key) {
                Some(slot) => *slot = value.clone(),
                None => return Err(MsssError::UnknownKey((*key).to_string())),
            }
        }
        Ok(Self { entries })
    }

    /// Write a patched copy to a fresh scratch file.
    ///
    /// The returned file is removed when dropped; hold it for exactly the
    /// invocation that reads it.
    pub fn patch(
        &self,
        overrides: &[(&str, String)],
        scratch: &ScratchContext,
    ) -> MsssResult<ScratchFile> {
        let patched = self.patched(overrides)?;
        let file = scratch.file()?;
        patched.write_to(file.path())?;
        Ok(file)
    }

    /// Write this set unchanged to a fresh scratch file.
    pub fn write_scratch(&self, scratch: &ScratchContext) -> MsssResult<ScratchFile> {
        let file = scratch.file()?;
        self.write_to(file.path())?;
        Ok(file)
    }

    /// Write the subset under `prefix` to a fresh scratch file.
    pub fn write_subset(&self, prefix: &str, scratch: &ScratchContext) -> MsssResult<ScratchFile> {
        self.subset(prefix).write_scratch(scratch)
    }

    pub fn write_to(&self, path: &Path) -> MsssResult<()> {
        if let Some((key, _)) = self
            .entries
            .iter()
            .find(|(_, value)| quote_for(value).is_none())
        {
            return Err(MsssError::Config(format!(
                "value of {} cannot be written: it needs quoting but contains both quote characters",
                key
            )));
        }
        std::fs::write(path, self.to_string()).map_err(|e| {
            MsssError::Storage(format!("failed to write parset {}: {}", path.display(), e))
        })
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            match quote_for(value).unwrap_or(Some('"')) {
                Some(q) => writeln!(f, "{}={}{}{}", key, q, value, q)?,
                None => writeln!(f, "{}={}", key, value)?,
            }
        }
        Ok(())
    }
}

impl FromStr for ParameterSet {
    type Err = MsssError;

    fn from_str(text: &str) -> MsssResult<Self> {
        Self::parse(text, Path::new("<string>"))
    }
}

/// Quote character that makes `value` read back unchanged. `Some(None)` means
/// no quoting is needed; `None` means no single quote character will do.
fn quote_for(value: &str) -> Option<Option<char>> {
    let needs_quotes = value.contains('#')
        || value.trim() != value
        || value::unquote(value) != value;
    if !needs_quotes {
        return Some(None);
    }
    ['"', '\''].into_iter().find(|q| !value.contains(*q)).map(Some)
}
