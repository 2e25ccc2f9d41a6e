//! Ordered key/value blocks in `wg-quick` configuration syntax.
//!
//! A [`ConfigBlock`] is a value: adding a key yields a new block, and rendering
//! is a pure function of the entries. A [`ConfigDocument`] is a list of blocks.

use std::fmt::{self, Write as _};

/// One `[Section]` of a configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlock {
    name: String,
    entries: Vec<(String, String)>,
}

impl ConfigBlock {
    /// Creates an empty block with the given section name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Returns a block with `key` set to `value`.
    ///
    /// A key that is already present keeps its position and takes the new value.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl fmt::Display) -> Self {
        let value = value.to_string();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
        self
    }

    /// Like [`ConfigBlock::with`], leaving the block untouched for `None`.
    #[must_use]
    pub fn with_opt(self, key: &str, value: Option<impl fmt::Display>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    /// Section name, without brackets.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up the value stored for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Entries in insertion order, including empty ones.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ConfigBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}]", self.name)?;
        for (key, value) in &self.entries {
            if value.is_empty() {
                continue;
            }
            writeln!(f, "{key} = {value}")?;
        }
        Ok(())
    }
}

/// A complete configuration file: blocks separated by one blank line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    blocks: Vec<ConfigBlock>,
}

impl ConfigDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a document with `block` appended.
    #[must_use]
    pub fn with_block(mut self, block: ConfigBlock) -> Self {
        self.blocks.push(block);
        self
    }

    /// Blocks in order.
    #[must_use]
    pub fn blocks(&self) -> &[ConfigBlock] {
        &self.blocks
    }

    /// Renders the document to text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut output = String::new();
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                output.push('\n');
            }
            let _ = write!(output, "{block}");
        }
        output
    }
}

impl FromIterator<ConfigBlock> for ConfigDocument {
    fn from_iter<I: IntoIterator<Item = ConfigBlock>>(iter: I) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Joins list values the way `wg-quick` expects them (`a, b, c`).
#[must_use]
pub fn join_list<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
