use crate::csv_io::read_rows;
use quotation_domain::repositories::instruments::InstrumentLookup;
use quotation_domain::repositories::FetchError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct InstrumentRecord {
    pub code: String,
    pub name: String,
}

/// In-memory code -> name table.
#[derive(Debug, Clone, Default)]
pub struct StaticInstrumentLookup {
    names: BTreeMap<String, String>,
}

impl StaticInstrumentLookup {
    pub fn new(names: BTreeMap<String, String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(String, String)> for StaticInstrumentLookup {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Codes without an entry are left out of the result; the caller decides whether that is fatal.
impl InstrumentLookup for StaticInstrumentLookup {
    fn resolve_names(&self, codes: &[String]) -> Result<BTreeMap<String, String>, FetchError> {
        Ok(codes
            .iter()
            .filter_map(|code| {
                self.names
                    .get(code)
                    .map(|name| (code.clone(), name.clone()))
            })
            .collect())
    }
}

/// `code,name` CSV, re-read on every lookup so edits are picked up by a running engine.
#[derive(Debug, Clone)]
pub struct CsvInstrumentLookup {
    path: PathBuf,
}

impl CsvInstrumentLookup {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<StaticInstrumentLookup, FetchError> {
        load_instruments_csv(&self.path)
    }
}

impl InstrumentLookup for CsvInstrumentLookup {
    fn resolve_names(&self, codes: &[String]) -> Result<BTreeMap<String, String>, FetchError> {
        self.load()
            .map_err(|err| FetchError::Lookup(err.to_string()))?
            .resolve_names(codes)
    }
}

pub fn load_instruments_csv(path: &Path) -> Result<StaticInstrumentLookup, FetchError> {
    let records: Vec<InstrumentRecord> = read_rows("instruments", path)?;
    let mut names = BTreeMap::new();
    for record in records {
        if names.insert(record.code.clone(), record.name).is_some() {
            tracing::warn!(code = %record.code, "duplicate instrument code; keeping last row");
        }
    }
    Ok(StaticInstrumentLookup::new(names))
}
