//! Sessions: explicit ownership scopes for engine-side interfaces.
//!
//! Every interface is created inside a session, and the session deletes
//! whatever is still alive when the scenario ends, pass or fail. All
//! control-plane calls funnel through here so the call trace sees them.

use std::collections::BTreeSet;

use ipnet::Ipv4Net;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::{ControlPlane, EngineError, InterfaceKind, Result};
use crate::dump::{DumpFilter, DumpSnapshot, RouteSnapshot};
use crate::iface::IfaceHandle;
use crate::trace::{CallOutcome, CallTrace};

/// Ownership scope for a batch of engine-side interfaces.
///
/// The session tracks which indices it created and not yet deleted, and
/// releases them on `run` completion. Interfaces created outside the
/// session are never touched.
pub struct Session<C: ControlPlane> {
    id: Uuid,
    engine: C,
    live: BTreeSet<u32>,
    trace: CallTrace,
}

impl<C: ControlPlane> Session<C> {
    pub fn new(engine: C) -> Self {
        let id = Uuid::new_v4();
        info!(session = %id, "session opened");
        Session {
            id,
            engine,
            live: BTreeSet::new(),
            trace: CallTrace::new(),
        }
    }

    /// Session id, the correlation key for this session's log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Trace of every control-plane call issued so far.
    pub fn trace(&self) -> &CallTrace {
        &self.trace
    }

    /// Indices created by this session and not yet deleted, ascending.
    pub fn live_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.live.iter().copied()
    }

    fn traced<T>(&mut self, call: &'static str, detail: String, result: Result<T>) -> Result<T> {
        let outcome = match &result {
            Ok(_) => CallOutcome::Ok,
            Err(EngineError::Rejected { reason, .. }) => CallOutcome::Rejected(reason.clone()),
        };
        self.trace.record(call, detail, outcome);
        result
    }

    /// Create `count` interfaces of `kind` and wrap them in handles.
    ///
    /// Names are assigned engine-side, so a follow-up dump reads them
    /// back. A count of zero is an empty batch and issues no engine call.
    pub async fn create_interfaces(
        &mut self,
        kind: InterfaceKind,
        count: u32,
    ) -> Result<Vec<IfaceHandle>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let result = self.engine.create_interfaces(kind, count).await;
        let indices = self.traced(
            "create_interfaces",
            format!("kind={kind:?} count={count}"),
            result,
        )?;
        // Ownership is tracked before the follow-up dump; a failed dump
        // must not leak the already-created indices past release_all.
        for &index in &indices {
            self.live.insert(index);
        }

        let dump = self.dump_interfaces(&DumpFilter::all()).await?;
        let mut handles = Vec::with_capacity(indices.len());
        for index in indices {
            let name = match dump.get(index) {
                Some(record) => record.name.clone(),
                None => {
                    warn!(index, "created interface missing from dump, synthesizing name");
                    format!("{}{index}", kind.name_prefix())
                }
            };
            handles.push(IfaceHandle::new(index, name, kind));
        }
        info!(session = %self.id, count = handles.len(), "interfaces created");
        Ok(handles)
    }

    /// Take a fresh interface snapshot. Nothing is cached; every
    /// assertion that needs current state takes its own snapshot.
    pub async fn dump_interfaces(&mut self, filter: &DumpFilter) -> Result<DumpSnapshot> {
        let result = self.engine.dump_interfaces(filter).await;
        let records = self.traced("dump_interfaces", format!("{filter:?}"), result)?;
        Ok(DumpSnapshot::new(records))
    }

    /// Take a fresh route snapshot scoped to `table_id`.
    pub async fn dump_routes(&mut self, table_id: u32) -> Result<RouteSnapshot> {
        let result = self.engine.dump_routes(table_id).await;
        let records = self.traced("dump_routes", format!("table={table_id}"), result)?;
        Ok(RouteSnapshot::new(table_id, records))
    }

    pub(crate) async fn set_address(&mut self, index: u32, addr: Ipv4Net) -> Result<()> {
        let result = self.engine.set_address(index, addr).await;
        self.traced("set_address", format!("index={index} addr={addr}"), result)
    }

    pub(crate) async fn clear_address(&mut self, index: u32) -> Result<()> {
        let result = self.engine.clear_address(index).await;
        self.traced("clear_address", format!("index={index}"), result)
    }

    pub(crate) async fn set_admin_state(&mut self, index: u32, up: bool) -> Result<()> {
        let result = self.engine.set_admin_state(index, up).await;
        self.traced("set_admin_state", format!("index={index} up={up}"), result)
    }

    pub(crate) async fn delete_interface(&mut self, index: u32) -> Result<()> {
        let result = self.engine.delete_interface(index).await;
        let result = self.traced("delete_interface", format!("index={index}"), result);
        if result.is_ok() {
            self.live.remove(&index);
        }
        result
    }

    /// Delete every interface the session still owns. Failures are
    /// logged and skipped so one stuck interface cannot leak the rest.
    pub async fn release_all(&mut self) {
        let indices: Vec<u32> = self.live.iter().copied().collect();
        for index in indices {
            if let Err(e) = self.delete_interface(index).await {
                warn!(session = %self.id, index, error = %e, "release failed, skipping");
            }
        }
    }

    /// Run `scenario` against this session and release every interface
    /// it still owns afterwards, whether the scenario passed or failed.
    pub async fn run<F, T, E>(&mut self, scenario: F) -> std::result::Result<T, E>
    where
        F: AsyncFnOnce(&mut Self) -> std::result::Result<T, E>,
    {
        let result = scenario(self).await;
        self.release_all().await;
        result
    }
}

impl<C: ControlPlane> Drop for Session<C> {
    fn drop(&mut self) {
        if !self.live.is_empty() {
            warn!(
                session = %self.id,
                live = self.live.len(),
                "session dropped with live interfaces"
            );
        }
    }
}
