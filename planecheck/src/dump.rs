//! Fixed-schema dump records, snapshots and filters.
//!
//! Records are decoded once when a snapshot is taken and never
//! re-interpreted afterwards. Snapshots are immutable; every assertion
//! works on a fresh one, nothing is cached across lifecycle transitions.

use ipnet::Ipv4Net;
use serde::Serialize;

/// Index of the always-present management interface.
pub const MGMT_INDEX: u32 = 0;

/// Wire value of the all-interfaces wildcard.
pub const INDEX_WILDCARD: u32 = u32::MAX;

/// Identifier of the default routing table.
pub const DEFAULT_TABLE: u32 = 0;

/// Index selection for an interface dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum IndexFilter {
    /// No index given. Resolves to the management interface at index 0,
    /// never to an error.
    #[default]
    Unset,
    /// Match every existing interface.
    Any,
    /// Match exactly this index; zero or one records.
    Exact(u32),
}

impl IndexFilter {
    /// Decode the wire encoding: `u32::MAX` is the wildcard, anything
    /// else selects one index.
    pub fn from_wire(raw: u32) -> Self {
        if raw == INDEX_WILDCARD {
            IndexFilter::Any
        } else {
            IndexFilter::Exact(raw)
        }
    }

    /// Whether `index` falls inside this selection.
    pub fn matches(&self, index: u32) -> bool {
        match self {
            IndexFilter::Unset => index == MGMT_INDEX,
            IndexFilter::Any => true,
            IndexFilter::Exact(want) => index == *want,
        }
    }
}

/// Filter for an interface dump. Index and name criteria intersect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DumpFilter {
    /// Index selection; defaults to the unset sentinel.
    pub index: IndexFilter,
    /// Substring match against interface names, if given.
    pub name_substring: Option<String>,
}

impl DumpFilter {
    /// Match every interface.
    pub fn all() -> Self {
        DumpFilter {
            index: IndexFilter::Any,
            name_substring: None,
        }
    }

    /// Match exactly one index.
    pub fn index(index: u32) -> Self {
        DumpFilter {
            index: IndexFilter::Exact(index),
            name_substring: None,
        }
    }

    /// Match interfaces whose name contains `pattern`.
    pub fn name(pattern: impl Into<String>) -> Self {
        DumpFilter {
            index: IndexFilter::Any,
            name_substring: Some(pattern.into()),
        }
    }

    /// Whether `record` passes this filter.
    pub fn matches(&self, record: &InterfaceRecord) -> bool {
        if !self.index.matches(record.index) {
            return false;
        }
        if let Some(pattern) = &self.name_substring
            && !record.name.contains(pattern.as_str())
        {
            return false;
        }
        true
    }
}

/// One interface as reported by a control-plane dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceRecord {
    /// Engine-assigned interface index.
    pub index: u32,
    /// Interface name, e.g. `loop0`.
    pub name: String,
    /// Administrative flag at dump time.
    pub admin_up: bool,
    /// Addresses bound to the interface at dump time.
    pub addresses: Vec<Ipv4Net>,
}

/// One FIB entry as reported by a route dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteRecord {
    /// Routing table this entry lives in.
    pub table_id: u32,
    /// Destination prefix.
    pub prefix: Ipv4Net,
    /// Index of the interface the prefix is attached to, if any.
    pub iface_index: Option<u32>,
}

/// Point-in-time result of an interface dump.
#[derive(Debug, Clone, Serialize)]
pub struct DumpSnapshot {
    records: Vec<InterfaceRecord>,
}

impl DumpSnapshot {
    /// Capture a snapshot from dump records, preserving their order.
    pub fn new(records: Vec<InterfaceRecord>) -> Self {
        DumpSnapshot { records }
    }

    /// All records in dump order.
    pub fn records(&self) -> &[InterfaceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record with `index`, if any.
    pub fn get(&self, index: u32) -> Option<&InterfaceRecord> {
        self.records.iter().find(|r| r.index == index)
    }

    /// How many records carry `index`. A consistent dump reports each
    /// existing interface exactly once.
    pub fn count_index(&self, index: u32) -> usize {
        self.records.iter().filter(|r| r.index == index).count()
    }

    pub fn contains_index(&self, index: u32) -> bool {
        self.count_index(index) > 0
    }
}

/// Point-in-time result of a route dump, scoped to one table.
///
/// Records from other tables are discarded at capture time, so entries
/// in a different table can never satisfy a check against this snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSnapshot {
    table_id: u32,
    records: Vec<RouteRecord>,
}

impl RouteSnapshot {
    /// Capture a snapshot of `table_id`, dropping records of other tables.
    pub fn new(table_id: u32, mut records: Vec<RouteRecord>) -> Self {
        records.retain(|r| r.table_id == table_id);
        RouteSnapshot { table_id, records }
    }

    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    /// All records of the scoped table.
    pub fn records(&self) -> &[RouteRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Entry for exactly `prefix`, if present.
    pub fn find_prefix(&self, prefix: &Ipv4Net) -> Option<&RouteRecord> {
        self.records.iter().find(|r| r.prefix == *prefix)
    }

    pub fn contains_prefix(&self, prefix: &Ipv4Net) -> bool {
        self.find_prefix(prefix).is_some()
    }
}
