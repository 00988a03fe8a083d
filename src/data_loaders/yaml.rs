use std::{fs, path::Path};

use serde_yaml::Value;

use crate::warn;

/// Reads and parses a YAML file. `None` when the file is missing or not
/// valid YAML; a parse error is logged, a missing file is not.
pub fn load_yaml(path: &Path) -> Option<Value> {
    let txt = fs::read_to_string(path).ok()?;
    match serde_yaml::from_str(&txt) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("[CONFIG] Ignoring unparsable {}: {e}", path.display());
            None
        }
    }
}
