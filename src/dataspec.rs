//! Data requirement sets.
//!
//! A [`DataSpec`] names the stream and service types a consumer needs (or a
//! producer provides). Compatibility is a pure subset test over the union of
//! both name sets, used identically for local dispatch fan-out and for
//! admitting remote session requests.

use std::collections::BTreeSet;
use std::hash::Hash;
use std::hash::Hasher;
use std::ops::AddAssign;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSpec {
    streams: BTreeSet<String>,
    services: BTreeSet<String>,
}

impl DataSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stream(
        &mut self,
        data_type: impl Into<String>,
    ) {
        self.streams.insert(data_type.into());
    }

    pub fn add_service(
        &mut self,
        data_type: impl Into<String>,
    ) {
        self.services.insert(data_type.into());
    }

    /// Builder-style variant of [`add_stream`](Self::add_stream)
    pub fn with_stream(
        mut self,
        data_type: impl Into<String>,
    ) -> Self {
        self.add_stream(data_type);
        self
    }

    /// Builder-style variant of [`add_service`](Self::add_service)
    pub fn with_service(
        mut self,
        data_type: impl Into<String>,
    ) -> Self {
        self.add_service(data_type);
        self
    }

    pub fn streams(&self) -> &BTreeSet<String> {
        &self.streams
    }

    pub fn services(&self) -> &BTreeSet<String> {
        &self.services
    }

    /// Sorted union of the stream and service type names.
    ///
    /// Identity and hashing are defined over this union: a spec naming "A" as
    /// a stream equals one naming "A" as a service.
    pub fn all_types(&self) -> BTreeSet<&str> {
        self.streams
            .iter()
            .chain(self.services.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty() && self.services.is_empty()
    }

    /// True iff every type this spec names is offered by `available`.
    ///
    /// Reflexive: any spec is compatible with itself.
    pub fn is_compatible(
        &self,
        available: &DataSpec,
    ) -> bool {
        let offered = available.all_types();
        self.all_types().iter().all(|t| offered.contains(t))
    }
}

impl PartialEq for DataSpec {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.all_types() == other.all_types()
    }
}

impl Eq for DataSpec {}

impl Hash for DataSpec {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        for t in self.all_types() {
            t.hash(state);
        }
    }
}

impl AddAssign for DataSpec {
    /// Merge `rhs` into `self`, keeping each name in its original role.
    fn add_assign(
        &mut self,
        rhs: Self,
    ) {
        self.streams.extend(rhs.streams);
        self.services.extend(rhs.services);
    }
}
