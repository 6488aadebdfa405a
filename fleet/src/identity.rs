use std::collections::HashMap;

/// Mapping from a device's transient update-mode identifier back to the
/// serial number it reported before the mode transition.
///
/// Built once from the pre-transition enumeration and read-only afterwards.
/// Only ever used for display labels, never for correctness decisions.
#[derive(Debug, Default)]
pub struct IdentityMap {
    map: HashMap<String, String>,
}

impl IdentityMap {
    pub fn new() -> Self {
        IdentityMap::default()
    }

    pub fn record(
        &mut self,
        update_id: impl Into<String>,
        serial: impl Into<String>,
    ) {
        self.map.insert(update_id.into(), serial.into());
    }

    /// Display label for a device currently reporting `update_id`: its
    /// captured serial number, or the raw id when unmapped.
    pub fn label<'a>(&'a self, update_id: &'a str) -> &'a str {
        self.map
            .get(update_id)
            .map(String::as_str)
            .unwrap_or(update_id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
