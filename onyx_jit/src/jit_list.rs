//! The jit-list: an allow-list of functions eligible for compilation.
//!
//! The list is loaded from a UTF-8 text file with one `module:qualname`
//! entry per line; `#` begins a comment and blank lines are ignored. It is
//! stored as a map from module to the set of qualnames allowed in it.
//!
//! When wildcards are enabled, a `*` module token places the qualname in a
//! module-independent bucket; lookups that miss the exact table fall
//! through to that bucket, as do lookups for modules the table has never
//! seen.

use std::fs;
use std::path::Path;

use onyx_core::{JitError, JitResult};
use rustc_hash::{FxHashMap, FxHashSet};

/// Allow-list of `module:qualname` pairs.
#[derive(Debug, Default)]
pub struct JitList {
    by_module: FxHashMap<String, FxHashSet<String>>,
    any_module: FxHashSet<String>,
    allow_wildcards: bool,
}

impl JitList {
    /// An empty list matching exact entries only.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty list that also accepts `*` module tokens.
    pub fn with_wildcards() -> Self {
        Self {
            allow_wildcards: true,
            ..Self::default()
        }
    }

    /// Parse a jit-list file, adding every entry to the list.
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> JitResult<()> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            JitError::JitListParseFailure(format!("{}: {}", path.display(), err))
        })?;
        for (lineno, line) in text.lines().enumerate() {
            self.parse_line(line).map_err(|err| {
                JitError::JitListParseFailure(format!(
                    "{}:{}: {}",
                    path.display(),
                    lineno + 1,
                    err
                ))
            })?;
        }
        Ok(())
    }

    /// Parse a single `module:qualname` line.
    ///
    /// Comments and blank lines parse successfully as no-ops.
    pub fn parse_line(&mut self, line: &str) -> Result<(), String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        let (module, qualname) = line
            .split_once(':')
            .ok_or_else(|| format!("expected module:qualname, got {:?}", line))?;
        let (module, qualname) = (module.trim(), qualname.trim());
        if module.is_empty() || qualname.is_empty() {
            return Err(format!("empty module or qualname in {:?}", line));
        }
        if qualname.contains(':') {
            return Err(format!("too many ':' in {:?}", line));
        }

        if self.allow_wildcards && module == "*" {
            self.any_module.insert(qualname.to_owned());
        } else {
            self.by_module
                .entry(module.to_owned())
                .or_default()
                .insert(qualname.to_owned());
        }
        Ok(())
    }

    /// Is `module:qualname` on the list?
    pub fn lookup(&self, module: &str, qualname: &str) -> bool {
        if let Some(quals) = self.by_module.get(module) {
            if quals.contains(qualname) {
                return true;
            }
        }
        self.any_module.contains(qualname)
    }

    /// Number of entries on the list.
    pub fn len(&self) -> usize {
        self.any_module.len() + self.by_module.values().map(FxHashSet::len).sum::<usize>()
    }

    /// Is the list empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the list as `(module, sorted qualnames)` pairs, sorted by
    /// module, with wildcard entries under `*`.
    pub fn entries(&self) -> Vec<(String, Vec<String>)> {
        let mut out: Vec<(String, Vec<String>)> = self
            .by_module
            .iter()
            .map(|(module, quals)| {
                let mut quals: Vec<String> = quals.iter().cloned().collect();
                quals.sort();
                (module.clone(), quals)
            })
            .collect();
        if !self.any_module.is_empty() {
            let mut quals: Vec<String> = self.any_module.iter().cloned().collect();
            quals.sort();
            out.push(("*".to_owned(), quals));
        }
        out.sort();
        out
    }
}

// =============================================================================
// Tests
// =============================================================================
