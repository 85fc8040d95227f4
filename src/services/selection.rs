// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exclusive service-to-peripheral bindings.

use crate::models::{SensorIdentity, ServiceId};
use std::collections::BTreeMap;

/// At most one peripheral bound per service.
///
/// Rebinding hands back the evicted peripheral so the caller can tear its
/// connection down.
#[derive(Debug, Clone, Default)]
pub struct SensorSelection {
    bindings: BTreeMap<ServiceId, SensorIdentity>,
}

impl SensorSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to `service`, returning the peripheral it replaced.
    ///
    /// Rebinding the peripheral that is already bound evicts nothing.
    #[must_use = "the evicted peripheral's connection must be torn down"]
    pub fn rebind(&mut self, service: ServiceId, identity: SensorIdentity) -> Option<SensorIdentity> {
        match self.bindings.insert(service, identity) {
            Some(previous) if previous != identity => Some(previous),
            _ => None,
        }
    }

    /// Remove the binding for `service`, returning the peripheral that was bound.
    #[must_use = "the unbound peripheral's connection must be torn down"]
    pub fn unbind(&mut self, service: ServiceId) -> Option<SensorIdentity> {
        self.bindings.remove(&service)
    }

    pub fn get(&self, service: ServiceId) -> Option<SensorIdentity> {
        self.bindings.get(&service).copied()
    }

    pub fn bindings(&self) -> impl Iterator<Item = (ServiceId, SensorIdentity)> + '_ {
        self.bindings.iter().map(|(s, i)| (*s, *i))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
