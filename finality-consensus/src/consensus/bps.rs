use std::sync::{PoisonError, RwLock};

use finality_common::BpSet;

use crate::ports::BpSetProvider;

/// BP committee held in memory and swapped by whoever runs elections.
#[derive(Debug, Default)]
pub struct StaticBpSet {
    bps: RwLock<BpSet>,
}

impl StaticBpSet {
    pub fn new(bps: BpSet) -> Self {
        Self { bps: RwLock::new(bps) }
    }

    /// Installs the committee for upcoming rounds.
    pub fn replace(&self, bps: BpSet) {
        *self.bps.write().unwrap_or_else(PoisonError::into_inner) = bps;
    }
}

impl BpSetProvider for StaticBpSet {
    fn current_bps(&self) -> BpSet {
        self.bps.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
