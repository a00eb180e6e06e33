//! Test parameter store.
//!
//! Calibration procedures are configured from a plain-text file holding
//! named parameter blocks, one block per test. The store keeps tests and
//! their parameters in encounter order and exposes the mutation surface
//! the bench uses at runtime: in-place overwrite, guarded append, bulk
//! replacement and a `name=value;...` merge syntax.
//!
//! File format:
//!
//! ```text
//! -- ph
//! ntrig 10
//! dac vcal
//! ```
//!
//! A line containing `--` starts a new block; the test name is the rest
//! of the line with spaces stripped. Each following line is one
//! parameter: runs of spaces collapse to one, the line splits at the
//! first remaining space into a lower-cased name and a verbatim value.
//! A line with no space ends the block early.

use std::path::Path;

use thiserror::Error;
use tracing::debug;

/// Error raised when a parameter file cannot be read.
///
/// Loading is all-or-nothing: a failed read yields no store at all.
#[derive(Error, Debug)]
#[error("cannot read parameter file {path}: {source}")]
pub struct ParameterFileError {
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

/// One named parameter of one test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct TestEntry {
    name: String,
    parameters: Vec<Parameter>,
}

/// Ordered store of named tests and their parameter lists.
#[derive(Debug, Clone, Default)]
pub struct TestParameters {
    tests: Vec<TestEntry>,
}

impl TestParameters {
    /// Parse a parameter definition. The grammar itself cannot fail;
    /// malformed lines end the current block and are otherwise skipped.
    pub fn parse(text: &str) -> Self {
        let mut store = Self::default();
        let mut current: Option<TestEntry> = None;

        for line in text.lines() {
            if line.contains("--") {
                if let Some(entry) = current.take() {
                    store.commit(entry);
                }
                let name = match line.find(' ') {
                    Some(idx) => line[idx + 1..].replace(' ', ""),
                    None => String::new(),
                };
                current = Some(TestEntry {
                    name,
                    parameters: Vec::new(),
                });
                continue;
            }

            if current.is_none() {
                // Content before the first block header is ignored.
                continue;
            }

            let collapsed = collapse_spaces(line);
            match collapsed.find(' ') {
                Some(idx) => {
                    let name = collapsed[..idx].to_lowercase();
                    let value = collapsed[idx + 1..].to_string();
                    if let Some(entry) = current.as_mut() {
                        entry.parameters.push(Parameter::new(name, value));
                    }
                }
                None => {
                    // A line with no space ends the block early.
                    if let Some(entry) = current.take() {
                        store.commit(entry);
                    }
                }
            }
        }

        if let Some(entry) = current.take() {
            store.commit(entry);
        }

        store
    }

    /// Load a parameter file from disk.
    pub fn from_file(path: &Path) -> Result<Self, ParameterFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ParameterFileError {
            path: path.display().to_string(),
            source,
        })?;
        let store = Self::parse(&text);
        debug!(
            "loaded {} tests from {}",
            store.tests.len(),
            path.display()
        );
        Ok(store)
    }

    fn commit(&mut self, entry: TestEntry) {
        if entry.name.is_empty() {
            return;
        }
        // First block with a given name wins; later ones are dropped.
        if self.tests.iter().any(|t| t.name == entry.name) {
            debug!("duplicate test block {:?} ignored", entry.name);
            return;
        }
        self.tests.push(entry);
    }

    fn entry_mut(&mut self, test: &str) -> Option<&mut TestEntry> {
        self.tests.iter_mut().find(|t| t.name == test)
    }

    /// All test names, in insertion order of first encounter.
    pub fn test_names(&self) -> Vec<&str> {
        self.tests.iter().map(|t| t.name.as_str()).collect()
    }

    /// The parameter list of one test; empty for unknown tests.
    pub fn parameters(&self, test: &str) -> &[Parameter] {
        self.tests
            .iter()
            .find(|t| t.name == test)
            .map(|t| t.parameters.as_slice())
            .unwrap_or(&[])
    }

    /// Overwrite the value of the first parameter with a matching name,
    /// in place. Returns false if the test or the name does not exist;
    /// never inserts.
    pub fn set_parameter(&mut self, test: &str, name: &str, value: &str) -> bool {
        let Some(entry) = self.entry_mut(test) else {
            return false;
        };
        for parameter in &mut entry.parameters {
            if parameter.name == name {
                debug!("setting {test}/{name} to {value}");
                parameter.value = value.to_string();
                return true;
            }
        }
        false
    }

    /// Append a new (name, value) parameter unless an identical pair is
    /// already present. Duplicate detection is by the pair, not the
    /// name, so repeated names with distinct values are allowed.
    /// Returns false only when the test does not exist.
    pub fn add_parameter(&mut self, test: &str, name: &str, value: &str) -> bool {
        let Some(entry) = self.entry_mut(test) else {
            return false;
        };
        let already_in = entry
            .parameters
            .iter()
            .any(|p| p.name == name && p.value == value);
        if !already_in {
            debug!("adding {test}/{name} with value {value}");
            entry.parameters.push(Parameter::new(name, value));
        }
        true
    }

    /// Replace the whole parameter list of one test.
    pub fn replace_parameters(&mut self, test: &str, parameters: Vec<Parameter>) -> bool {
        let Some(entry) = self.entry_mut(test) else {
            return false;
        };
        entry.parameters = parameters;
        true
    }

    /// Apply a `name=value;name=value;...` override string through
    /// [`set_parameter`](Self::set_parameter). Whitespace is stripped
    /// first; names not already present are silently skipped (the merge
    /// path never grows the set). Returns false if the test is unknown.
    pub fn merge_from_str(&mut self, test: &str, overrides: &str) -> bool {
        if !self.tests.iter().any(|t| t.name == test) {
            return false;
        }
        let cleaned: String = overrides
            .chars()
            .filter(|c| *c != ' ' && *c != '\t')
            .collect();
        for piece in cleaned.split(';') {
            if let Some((name, value)) = piece.split_once('=') {
                self.set_parameter(test, name, value);
            }
        }
        true
    }

    /// Log the whole store at debug level.
    pub fn dump(&self) {
        for entry in &self.tests {
            debug!("test ->{}<-", entry.name);
            for parameter in &entry.parameters {
                debug!("  {}: {}", parameter.name, parameter.value);
            }
        }
    }
}

/// Collapse runs of consecutive spaces into a single space.
fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut previous_space = false;
    for c in line.chars() {
        if c == ' ' {
            if !previous_space {
                out.push(c);
            }
            previous_space = true;
        } else {
            out.push(c);
            previous_space = false;
        }
    }
    out
}
