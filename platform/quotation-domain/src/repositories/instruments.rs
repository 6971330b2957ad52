use crate::repositories::FetchError;
use std::collections::BTreeMap;

pub trait InstrumentLookup {
    /// Resolves display names for `codes`. Codes unknown to the store are simply absent from
    /// the returned map.
    fn resolve_names(&self, codes: &[String]) -> Result<BTreeMap<String, String>, FetchError>;
}
