//! Compiled pattern cache.
//!
//! Keyed by the exact pattern string. Only successful compilations are kept,
//! so a broken pattern yields the same error on every call.

use dashmap::DashMap;
use regex::Regex;

/// Entries beyond this are dropped wholesale; patterns only change on restart.
const MAX_ENTRIES: usize = 64;

#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: DashMap<String, Regex>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the compiled form of `pattern`, compiling it on a miss.
    pub fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        if let Some(regex) = self.compiled.get(pattern) {
            return Ok(regex.clone());
        }

        let regex = Regex::new(pattern)?;
        if self.compiled.len() >= MAX_ENTRIES {
            self.compiled.clear();
        }
        self.compiled.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}
