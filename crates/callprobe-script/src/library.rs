//! Registry of dialog scripts addressed by URI.

use std::collections::HashMap;
use std::sync::Arc;

use callprobe_core::Result;

use crate::script::DialogScript;

/// Dialog documents a scripted session can call or jump to.
#[derive(Debug, Clone, Default)]
pub struct DialogLibrary {
    scripts: HashMap<String, Arc<DialogScript>>,
}

impl DialogLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a library from `(uri, script)` pairs, validating each script.
    pub fn from_scripts<I, S>(scripts: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, DialogScript)>,
        S: Into<String>,
    {
        let mut library = Self::new();
        for (uri, script) in scripts {
            library.insert(uri, script)?;
        }
        Ok(library)
    }

    /// Register `script` under `uri`, replacing any previous one.
    pub fn insert(&mut self, uri: impl Into<String>, script: DialogScript) -> Result<()> {
        script.validate()?;
        self.scripts.insert(uri.into(), Arc::new(script));
        Ok(())
    }

    /// Look up the script at `uri`.
    pub fn get(&self, uri: &str) -> Option<Arc<DialogScript>> {
        self.scripts.get(uri).cloned()
    }

    /// Whether a script is registered at `uri`.
    pub fn contains(&self, uri: &str) -> bool {
        self.scripts.contains_key(uri)
    }

    /// Registered URIs, sorted.
    pub fn uris(&self) -> Vec<&str> {
        let mut uris: Vec<&str> = self.scripts.keys().map(String::as_str).collect();
        uris.sort_unstable();
        uris
    }

    /// Number of registered scripts.
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Whether the library is empty.
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}
