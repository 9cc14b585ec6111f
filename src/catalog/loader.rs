use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;

use super::{Additive, BaseSolution};
use crate::error::{TpnError, TpnResult};

/// Reads an ordered list of base solutions from a JSON array.
pub fn load_base_solutions<P: AsRef<Path>>(path: P) -> TpnResult<Vec<BaseSolution>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let solutions: Vec<BaseSolution> = serde_json::from_str(&content)?;

    if solutions.is_empty() {
        return Err(TpnError::InvalidCatalog(format!(
            "No base solutions defined in {:?}",
            path.as_ref()
        )));
    }

    for solution in &solutions {
        solution.validate()?;
        debug!("Loaded base solution '{}'", solution.name);
    }
    info!("Loaded {} base solutions from {:?}", solutions.len(), path.as_ref());
    Ok(solutions)
}

/// Reads the additive catalog from a JSON array, keyed by name.
pub fn load_additives<P: AsRef<Path>>(path: P) -> TpnResult<HashMap<String, Additive>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let entries: Vec<Additive> = serde_json::from_str(&content)?;

    let mut additives = HashMap::with_capacity(entries.len());
    for additive in entries {
        if additives.contains_key(&additive.name) {
            return Err(TpnError::InvalidCatalog(format!(
                "Duplicate additive '{}' in {:?}",
                additive.name,
                path.as_ref()
            )));
        }
        additive.validate()?;
        debug!("Loaded additive '{}'", additive.name);
        additives.insert(additive.name.clone(), additive);
    }

    info!("Loaded {} additives from {:?}", additives.len(), path.as_ref());
    Ok(additives)
}

pub fn find_base_solution<'a>(solutions: &'a [BaseSolution], name: &str) -> TpnResult<&'a BaseSolution> {
    solutions
        .iter()
        .find(|solution| solution.name == name)
        .ok_or_else(|| TpnError::UnknownSolution(name.to_string()))
}
