//! A flat `key = value` settings store.
//!
//! Both `world.mt` and `map_meta.txt` use this format; `map_meta.txt`
//! additionally ends with an `[end_of_params]` tag so readers can tell a
//! complete file from a truncated one.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;

use anyhow::{Result, bail};
use flexstr::SharedStr;

use crate::fs_util::safe_write;

/// Terminator tag of `map_meta.txt`.
pub const END_OF_PARAMS: &str = "[end_of_params]";

/// A flat, string-typed key/value store with typed accessors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<SharedStr, SharedStr>,
}

impl Settings {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses settings from text, one `key = value` per line. Blank lines
    /// and `#` comments are skipped. Parsing stops silently at
    /// `[end_of_params]`.
    ///
    /// # Errors
    /// A line that is neither blank, a comment, the terminator nor a
    /// key/value pair.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut settings = Self::new();
        for line in text.lines() {
            if !settings.parse_line(line)? {
                break;
            }
        }
        Ok(settings)
    }

    /// Loads a settings file from disk.
    ///
    /// # Errors
    /// I/O errors and malformed lines.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_text(&text)
    }

    /// Parses a single line into the store. Returns `false` once the
    /// terminator tag has been seen.
    fn parse_line(&mut self, line: &str) -> Result<bool> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(true);
        }
        if trimmed == END_OF_PARAMS {
            return Ok(false);
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            bail!("invalid settings line: {line}");
        };
        self.set(key.trim(), value.trim());
        Ok(true)
    }

    /// Serializes the store, optionally appending the terminator tag.
    #[must_use]
    pub fn to_text(&self, with_end_tag: bool) -> String {
        let mut out = String::new();
        for (key, value) in &self.values {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
        if with_end_tag {
            out.push_str(END_OF_PARAMS);
            out.push('\n');
        }
        out
    }

    /// Writes the store to disk via the safe-write path.
    ///
    /// # Errors
    /// I/O errors of the underlying write.
    pub fn save(&self, path: &Path, with_end_tag: bool) -> Result<()> {
        safe_write(path, self.to_text(with_end_tag).as_bytes())?;
        Ok(())
    }

    /// Stores a value, displacing any previous one.
    pub fn set(&mut self, key: &str, value: impl Display) {
        self.values
            .insert(key.into(), value.to_string().into());
    }

    /// Raw string lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(SharedStr::as_str)
    }

    /// Whether the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// String lookup with a default.
    #[must_use]
    pub fn get_str_or<'settings>(
        &'settings self,
        key: &str,
        default: &'settings str,
    ) -> &'settings str {
        self.get(key).unwrap_or(default)
    }

    /// Boolean lookup accepting `true/false`, `yes/no`, `on/off` and
    /// numbers; anything unparsable falls back to the default.
    #[must_use]
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(str::to_ascii_lowercase).as_deref() {
            Some("true" | "yes" | "on" | "1") => true,
            Some("false" | "no" | "off" | "0") => false,
            Some(other) => other.parse::<i64>().map_or(default, |number| number != 0),
            None => default,
        }
    }

    /// Integer lookup with a default for missing or unparsable values.
    #[must_use]
    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }

    /// `i32` convenience wrapper over [`Self::get_i64_or`].
    #[must_use]
    pub fn get_i32_or(&self, key: &str, default: i32) -> i32 {
        i32::try_from(self.get_i64_or(key, i64::from(default))).unwrap_or(default)
    }

    /// `i16` convenience wrapper over [`Self::get_i64_or`].
    #[must_use]
    pub fn get_i16_or(&self, key: &str, default: i16) -> i16 {
        i16::try_from(self.get_i64_or(key, i64::from(default))).unwrap_or(default)
    }

    /// `u64` lookup with a default.
    #[must_use]
    pub fn get_u64_or(&self, key: &str, default: u64) -> u64 {
        self.get(key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }

    /// Float lookup with a default.
    #[must_use]
    pub fn get_f32_or(&self, key: &str, default: f32) -> f32 {
        self.get(key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }

    /// Iterates all key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&SharedStr, &SharedStr)> {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_blanks_and_pairs() {
        let text = "# a world\n\nseed = 42\nmg_name = v7\nwater_level=1\n";
        let settings = Settings::from_text(text).unwrap();
        assert_eq!(settings.get("seed"), Some("42"));
        assert_eq!(settings.get_str_or("mg_name", "v5"), "v7");
        assert_eq!(settings.get_i16_or("water_level", 0), 1);
    }

    #[test]
    fn stops_at_end_tag() {
        let text = "seed = 7\n[end_of_params]\ngarbage that is not a pair\n";
        let settings = Settings::from_text(text).unwrap();
        assert_eq!(settings.get_u64_or("seed", 0), 7);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Settings::from_text("no equals sign here\n").is_err());
    }

    #[test]
    fn bool_flavours() {
        let settings =
            Settings::from_text("a = true\nb = off\nc = 1\nd = nonsense\n").unwrap();
        assert!(settings.get_bool_or("a", false));
        assert!(!settings.get_bool_or("b", true));
        assert!(settings.get_bool_or("c", false));
        assert!(settings.get_bool_or("d", true), "unparsable keeps default");
        assert!(!settings.get_bool_or("missing", false));
    }

    #[test]
    fn text_round_trip() {
        let mut settings = Settings::new();
        settings.set("seed", 1234_u64);
        settings.set("mg_name", "carpathian");
        let text = settings.to_text(true);
        assert!(text.ends_with("[end_of_params]\n"));
        let reparsed = Settings::from_text(&text).unwrap();
        assert_eq!(reparsed, settings);
    }
}
