//! Common Portability Library helpers
//!
//! Provides [`CslStringList`], the `KEY=VALUE` option list passed to layer
//! operations such as the overlay methods.

use std::fmt::{Debug, Formatter};

use crate::config::cpl_test_bool;
use crate::errors::{GdalError, Result};

/// An ordered list of `KEY=VALUE` options.
///
/// Keys are matched case-insensitively, like `CSLFetchNameValue`. Setting an
/// existing key replaces its value in place, keeping the original position.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CslStringList {
    entries: Vec<(String, String)>,
}

impl CslStringList {
    /// Creates an empty string list.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Assigns `value` to `name`.
    ///
    /// Overwrites duplicate `name`s.
    ///
    /// Returns `Ok<()>` on success, `Err<GdalError>` if `name` has non alphanumeric
    /// characters, or `value` has newline characters.
    pub fn set_name_value(&mut self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(GdalError::BadArgument(format!(
                "Invalid characters in name: '{}'",
                name
            )));
        }
        if value.contains(['\n', '\r', '\0']) {
            return Err(GdalError::BadArgument(format!(
                "Invalid characters in value: '{}'",
                value
            )));
        }

        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }

        Ok(())
    }

    /// Looks up the value corresponding to `key`.
    pub fn fetch_name_value(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Looks up the value corresponding to `key`, falling back to `default`.
    pub fn fetch_name_value_def<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.fetch_name_value(key).unwrap_or(default)
    }

    /// Looks up `key` and interprets it as a boolean, see [`cpl_test_bool`].
    pub fn fetch_bool(&self, key: &str, default: bool) -> bool {
        self.fetch_name_value(key)
            .map(cpl_test_bool)
            .unwrap_or(default)
    }

    /// Determine the number of entries in the list.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Determine if the list has any values
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an iterator over the name/value elements of the list.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Debug for CslStringList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (k, v) in self.iter() {
            f.write_fmt(format_args!("{k}={v}\n"))?;
        }
        Ok(())
    }
}

/// Convenience shorthand for specifying an empty `CslStringList` to functions accepting
/// `Into<CslStringList>`.
impl From<()> for CslStringList {
    fn from(_: ()) -> Self {
        CslStringList::default()
    }
}

/// Creates a [`CslStringList`] from a slice of _key_/_value_ tuples.
///
/// Pairs with an invalid key or value are skipped.
impl<const N: usize> From<&[(&str, &str); N]> for CslStringList {
    fn from(pairs: &[(&str, &str); N]) -> Self {
        let mut result = Self::default();
        for (k, v) in pairs {
            if let Err(e) = result.set_name_value(k, v) {
                tracing::error!("{e}");
            }
        }
        result
    }
}
