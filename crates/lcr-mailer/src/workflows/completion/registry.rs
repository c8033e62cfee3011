use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::domain::{RecordKey, Unit, UnitId, UnitState};

/// Units known to the current run, populated by staging and consulted by
/// reconciliation and dispatch.
#[derive(Debug, Clone, Default)]
pub struct UnitRegistry {
    units: BTreeMap<UnitId, Unit>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: UnitId, key: RecordKey, folder: PathBuf, state: UnitState) {
        self.units.insert(
            id.clone(),
            Unit {
                id,
                key,
                folder,
                state,
                attachment: None,
            },
        );
    }

    pub fn get(&self, id: &UnitId) -> Option<&Unit> {
        self.units.get(id)
    }

    pub fn get_mut(&mut self, id: &UnitId) -> Option<&mut Unit> {
        self.units.get_mut(id)
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    pub fn in_state(&self, state: UnitState) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |unit| unit.state == state)
    }

    pub fn ids_in_state(&self, state: UnitState) -> Vec<UnitId> {
        self.in_state(state).map(|unit| unit.id.clone()).collect()
    }

    pub fn count(&self, state: UnitState) -> usize {
        self.in_state(state).count()
    }

    /// Whether `folder` belongs to a registered unit.
    pub fn owns_folder(&self, folder: &Path) -> bool {
        self.units.values().any(|unit| unit.folder == folder)
    }

    /// Move every unit in `from` to `to`.
    pub fn transition_all(&mut self, from: UnitState, to: UnitState) {
        for unit in self.units.values_mut() {
            if unit.state == from {
                unit.state = to;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
