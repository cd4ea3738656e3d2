//! Auto-identifier: a run-spanning counter persisted as a single text value.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::config::IdentifierOptions;
use crate::value::{stringify, Record};

pub trait IdentifierStore: Send + Sync {
    /// The last persisted identifier, or `None` when nothing has been stored.
    fn load(&self) -> io::Result<Option<String>>;

    fn save(&self, value: &str) -> io::Result<()>;
}

/// Plain-text file holding the last issued identifier.
#[derive(Debug, Clone)]
pub struct FileIdentifierStore {
    path: PathBuf,
}

impl FileIdentifierStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_options(options: &IdentifierOptions) -> Self {
        Self::new(options.store_path())
    }
}

impl IdentifierStore for FileIdentifierStore {
    fn load(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, value: &str) -> io::Result<()> {
        fs::write(&self.path, value)
    }
}

#[derive(Debug, Default)]
pub struct MemoryIdentifierStore {
    value: Mutex<Option<String>>,
}

impl MemoryIdentifierStore {
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(value.into())),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.value.lock().ok().and_then(|v| v.clone())
    }
}

impl IdentifierStore for MemoryIdentifierStore {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self.get())
    }

    fn save(&self, value: &str) -> io::Result<()> {
        let mut slot = self
            .value
            .lock()
            .map_err(|_| io::Error::other("identifier store poisoned"))?;
        *slot = Some(value.to_string());
        Ok(())
    }
}

/// Result of identifier resolution: the value to type and the record carrying it.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedIdentifier {
    pub value: String,
    pub record: Record,
}

/// Decide the identifier for this run.
///
/// A record that already carries one wins and re-synchronizes the store.
/// Otherwise a numeric persisted value is incremented, else the configured
/// start seeds the sequence. With none of those the value is empty.
pub fn next_identifier(
    record: &Record,
    options: &IdentifierOptions,
    store: &dyn IdentifierStore,
) -> IssuedIdentifier {
    let existing = record
        .as_value()
        .get(&options.key)
        .map(stringify)
        .unwrap_or_default();
    if !existing.is_empty() {
        persist(store, &existing);
        return IssuedIdentifier {
            value: existing,
            record: record.clone(),
        };
    }

    let last = store.load().unwrap_or_else(|e| {
        warn!("Could not read last identifier: {e}");
        None
    });
    let next = last
        .as_deref()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .and_then(|n| {
            let next = n.checked_add(1);
            if next.is_none() {
                warn!("Last identifier {n} cannot be incremented");
            }
            next
        })
        .map(|n| n.to_string())
        .or_else(|| options.start.clone().filter(|s| !s.is_empty()));

    match next {
        Some(value) => {
            debug!(key = %options.key, %value, "issued identifier");
            persist(store, &value);
            IssuedIdentifier {
                record: record.with_field(&options.key, value.clone()),
                value,
            }
        }
        None => IssuedIdentifier {
            value: String::new(),
            record: record.clone(),
        },
    }
}

fn persist(store: &dyn IdentifierStore, value: &str) {
    if let Err(e) = store.save(value) {
        warn!("Could not save last identifier value: {e}");
    }
}
