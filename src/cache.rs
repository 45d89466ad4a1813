//! Thread-local compilation cache for patch patterns.
//!
//! The validator and the substitution engine compile the same patterns for
//! every module; caching avoids compiling each one twice per run.
//! Cache is capped at 256 entries; it is cleared when full.

use regex::{Regex, RegexBuilder};
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_CACHE_ENTRIES: usize = 256;

/// Compiled program size limit. Bundle patterns can be long literal runs,
/// so this is well above the regex crate's default.
const REGEX_SIZE_LIMIT: usize = 64 * (1 << 20);

thread_local! {
    static PATTERN_CACHE: RefCell<HashMap<String, Regex>> =
        RefCell::new(HashMap::new());
}

/// Get a compiled pattern from cache, or compile and cache it.
///
/// Compilation errors are not cached; a bad pattern is recompiled (and fails
/// again) on every call.
pub fn get_or_compile(pattern: &str) -> Result<Regex, regex::Error> {
    PATTERN_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();

        if let Some(re) = cache.get(pattern) {
            return Ok(re.clone());
        }

        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = RegexBuilder::new(pattern)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()?;
        cache.insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    })
}

/// Clear the pattern cache (mainly for testing).
pub fn clear_cache() {
    PATTERN_CACHE.with(|cache| {
        cache.borrow_mut().clear();
    });
}

pub fn cache_size() -> usize {
    PATTERN_CACHE.with(|cache| cache.borrow().len())
}
