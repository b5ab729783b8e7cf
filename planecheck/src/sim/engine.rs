//! In-process simulated packet engine.
//!
//! Control plane: authoritative interface rows behind a mutex, mutated
//! one call at a time. Data plane: a forwarding view derived from the
//! rows and published through `ArcSwap`, so port threads route without
//! taking the lock.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use ipnet::Ipv4Net;
use prefix_trie::PrefixMap;
use tracing::debug;

use crate::client::{ControlPlane, EngineError, InterfaceKind, Result};
use crate::dump::{DEFAULT_TABLE, DumpFilter, InterfaceRecord, MGMT_INDEX, RouteRecord};

/// Name of the management interface the engine always carries.
pub const MGMT_NAME: &str = "mgmt0";

/// Interface that answers probes: its index and configured address.
#[derive(Debug, Clone, Copy)]
pub struct Responder {
    pub index: u32,
    pub addr: Ipv4Addr,
}

/// Published forwarding view: the prefixes that currently forward.
///
/// Rebuilt from scratch on every control-plane mutation; port threads
/// only ever read a consistent snapshot.
pub struct ForwardingState {
    routes: PrefixMap<Ipv4Net, Responder>,
}

impl ForwardingState {
    fn new() -> Self {
        ForwardingState {
            routes: PrefixMap::new(),
        }
    }

    /// Longest-prefix match for `addr`.
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<Responder> {
        let prefix = Ipv4Net::new(addr, 32).ok()?;
        self.routes
            .get_lpm(&prefix)
            .map(|(_, responder)| *responder)
    }
}

impl Default for ForwardingState {
    fn default() -> Self {
        Self::new()
    }
}

/// One interface row in the authoritative table.
#[derive(Debug, Clone)]
struct IfaceRow {
    index: u32,
    name: String,
    admin_up: bool,
    address: Option<Ipv4Net>,
}

struct EngineState {
    interfaces: BTreeMap<u32, IfaceRow>,
    /// Next index to hand out. Indices are never reused.
    next_index: u32,
    /// Next instance number for generated names. Never reused either,
    /// so names stay unique across delete/create cycles.
    next_instance: u32,
    capacity: usize,
}

/// Simulated engine. Cheaply cloneable; clones share the same state.
#[derive(Clone)]
pub struct SimEngine {
    state: Arc<Mutex<EngineState>>,
    forwarding: Arc<ArcSwap<ForwardingState>>,
}

impl SimEngine {
    /// Engine with no interface limit.
    pub fn new() -> Self {
        Self::with_capacity(usize::MAX)
    }

    /// Engine that refuses creation beyond `capacity` interfaces, the
    /// management interface not counted.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut interfaces = BTreeMap::new();
        interfaces.insert(
            MGMT_INDEX,
            IfaceRow {
                index: MGMT_INDEX,
                name: MGMT_NAME.to_string(),
                admin_up: true,
                address: None,
            },
        );
        SimEngine {
            state: Arc::new(Mutex::new(EngineState {
                interfaces,
                next_index: MGMT_INDEX + 1,
                next_instance: 0,
                capacity,
            })),
            forwarding: Arc::new(ArcSwap::from_pointee(ForwardingState::new())),
        }
    }

    /// Shared handle to the published forwarding view, for port threads.
    pub(crate) fn forwarding_handle(&self) -> Arc<ArcSwap<ForwardingState>> {
        Arc::clone(&self.forwarding)
    }

    /// Rebuild and publish the forwarding view from the current rows.
    /// An interface forwards only while it is admin-up and addressed.
    fn publish(&self, state: &EngineState) {
        let mut next = ForwardingState::new();
        for row in state.interfaces.values() {
            if row.admin_up
                && let Some(addr) = row.address
            {
                next.routes.insert(
                    addr.trunc(),
                    Responder {
                        index: row.index,
                        addr: addr.addr(),
                    },
                );
            }
        }
        self.forwarding.store(Arc::new(next));
    }
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlPlane for SimEngine {
    async fn create_interfaces(&self, kind: InterfaceKind, count: u32) -> Result<Vec<u32>> {
        let mut state = self.state.lock().unwrap();
        let existing = state.interfaces.len() - 1;
        if existing + count as usize > state.capacity {
            return Err(EngineError::rejected(
                "create_interfaces",
                format!("interface capacity {} exhausted", state.capacity),
            ));
        }

        let mut indices = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let index = state.next_index;
            state.next_index += 1;
            let instance = state.next_instance;
            state.next_instance += 1;

            let name = format!("{}{instance}", kind.name_prefix());
            state.interfaces.insert(
                index,
                IfaceRow {
                    index,
                    name,
                    admin_up: false,
                    address: None,
                },
            );
            indices.push(index);
        }
        debug!(?kind, count, "interfaces created");
        Ok(indices)
    }

    async fn dump_interfaces(&self, filter: &DumpFilter) -> Result<Vec<InterfaceRecord>> {
        let state = self.state.lock().unwrap();
        let records = state
            .interfaces
            .values()
            .map(|row| InterfaceRecord {
                index: row.index,
                name: row.name.clone(),
                admin_up: row.admin_up,
                addresses: row.address.into_iter().collect(),
            })
            .filter(|record| filter.matches(record))
            .collect();
        Ok(records)
    }

    async fn dump_routes(&self, table_id: u32) -> Result<Vec<RouteRecord>> {
        // Only the default table exists; any other table dumps empty.
        if table_id != DEFAULT_TABLE {
            return Ok(Vec::new());
        }
        let state = self.state.lock().unwrap();
        let records = state
            .interfaces
            .values()
            .filter(|row| row.admin_up)
            .filter_map(|row| {
                row.address.map(|addr| RouteRecord {
                    table_id: DEFAULT_TABLE,
                    prefix: addr.trunc(),
                    iface_index: Some(row.index),
                })
            })
            .collect();
        Ok(records)
    }

    async fn set_address(&self, index: u32, addr: Ipv4Net) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let row = state.interfaces.get_mut(&index).ok_or_else(|| {
            EngineError::rejected("set_address", format!("no interface with index {index}"))
        })?;
        row.address = Some(addr);
        self.publish(&state);
        Ok(())
    }

    async fn clear_address(&self, index: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let row = state.interfaces.get_mut(&index).ok_or_else(|| {
            EngineError::rejected("clear_address", format!("no interface with index {index}"))
        })?;
        // Clearing an interface that has no address is a no-op.
        row.address = None;
        self.publish(&state);
        Ok(())
    }

    async fn set_admin_state(&self, index: u32, up: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let row = state.interfaces.get_mut(&index).ok_or_else(|| {
            EngineError::rejected(
                "set_admin_state",
                format!("no interface with index {index}"),
            )
        })?;
        row.admin_up = up;
        self.publish(&state);
        Ok(())
    }

    async fn delete_interface(&self, index: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if index == MGMT_INDEX {
            return Err(EngineError::rejected(
                "delete_interface",
                "management interface cannot be deleted",
            ));
        }
        if state.interfaces.remove(&index).is_none() {
            return Err(EngineError::rejected(
                "delete_interface",
                format!("no interface with index {index}"),
            ));
        }
        self.publish(&state);
        debug!(index, "interface deleted");
        Ok(())
    }
}
