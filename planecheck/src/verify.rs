//! Consistency checks between declared handle state and observed state.
//!
//! Checks never panic and never stop at the first finding. Each one
//! walks its snapshot, collects every mismatch into a report, and the
//! caller decides whether a non-empty report is fatal.

use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::Serialize;
use thiserror::Error;

use crate::dump::{DumpSnapshot, RouteSnapshot};
use crate::iface::IfaceHandle;

/// One observed deviation from declared state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum Mismatch {
    #[error("Interface {index} ({name}) missing from dump")]
    MissingFromDump { index: u32, name: String },

    #[error("Interface {index} ({name}) appears {count} times in dump")]
    DuplicateInDump {
        index: u32,
        name: String,
        count: usize,
    },

    #[error("Deleted interface {index} ({name}) still present in dump")]
    UnexpectedInDump { index: u32, name: String },

    #[error("Interface {index} dumped as {actual:?}, handle says {expected:?}")]
    NameMismatch {
        index: u32,
        expected: String,
        actual: String,
    },

    #[error("Interface {index} ({name}) leaked through name filter {pattern:?}")]
    FilterLeak {
        index: u32,
        name: String,
        pattern: String,
    },

    #[error("Table {table_id} is missing route {prefix} for interface {index}")]
    MissingRoute {
        table_id: u32,
        prefix: Ipv4Net,
        index: u32,
    },

    #[error("Table {table_id} still has route {prefix} for interface {index}")]
    UnexpectedRoute {
        table_id: u32,
        prefix: Ipv4Net,
        index: u32,
    },

    #[error("No reply from interface {index} ({addr}, token {token})")]
    MissingReply {
        index: u32,
        addr: Ipv4Addr,
        token: u16,
    },

    #[error("Reply with token {token} has wrong {field}: expected {expected}, got {actual}")]
    ReplyFieldMismatch {
        token: u16,
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Interface {index} ({name}) could not have been probed: {reason}")]
    Unprobeable {
        index: u32,
        name: String,
        reason: &'static str,
    },

    #[error("Captured {count} frame(s) where none were expected")]
    CaptureNotEmpty { count: usize },
}

/// Outcome of one or more checks. Empty means everything matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    mismatches: Vec<Mismatch>,
}

impl VerifyReport {
    pub fn new() -> Self {
        VerifyReport {
            mismatches: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, mismatch: Mismatch) {
        self.mismatches.push(mismatch);
    }

    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Every finding, in check order.
    pub fn mismatches(&self) -> &[Mismatch] {
        &self.mismatches
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: VerifyReport) {
        self.mismatches.extend(other.mismatches);
    }

    /// Turn the report into a hard failure if anything mismatched.
    pub fn into_result(self) -> std::result::Result<(), VerifyError> {
        if self.passed() {
            Ok(())
        } else {
            Err(VerifyError(self))
        }
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mismatches.is_empty() {
            return write!(f, "all checks passed");
        }
        write!(f, "{} mismatch(es)", self.mismatches.len())?;
        for mismatch in &self.mismatches {
            write!(f, "; {mismatch}")?;
        }
        Ok(())
    }
}

/// Verification failure carrying the full report.
#[derive(Debug, Clone, Error)]
#[error("verification failed: {0}")]
pub struct VerifyError(pub VerifyReport);

fn presence_of(report: &mut VerifyReport, dump: &DumpSnapshot, handle: &IfaceHandle) {
    let count = dump.count_index(handle.index());
    if count == 0 {
        report.push(Mismatch::MissingFromDump {
            index: handle.index(),
            name: handle.name().to_string(),
        });
        return;
    }
    if count > 1 {
        report.push(Mismatch::DuplicateInDump {
            index: handle.index(),
            name: handle.name().to_string(),
            count,
        });
    }
    if let Some(record) = dump.get(handle.index())
        && record.name != handle.name()
    {
        report.push(Mismatch::NameMismatch {
            index: handle.index(),
            expected: handle.name().to_string(),
            actual: record.name.clone(),
        });
    }
}

fn absence_of(report: &mut VerifyReport, dump: &DumpSnapshot, handle: &IfaceHandle) {
    if dump.contains_index(handle.index()) {
        report.push(Mismatch::UnexpectedInDump {
            index: handle.index(),
            name: handle.name().to_string(),
        });
    }
}

fn route_of(report: &mut VerifyReport, routes: &RouteSnapshot, handle: &IfaceHandle) {
    if handle.state().in_fib() {
        let Some(addr) = handle.address() else {
            return;
        };
        let prefix = addr.trunc();
        let attached = routes
            .records()
            .iter()
            .any(|r| r.prefix == prefix && r.iface_index == Some(handle.index()));
        if !attached {
            report.push(Mismatch::MissingRoute {
                table_id: routes.table_id(),
                prefix,
                index: handle.index(),
            });
        }
    } else if let Some(addr) = handle.last_address() {
        let prefix = addr.trunc();
        if routes.contains_prefix(&prefix) {
            report.push(Mismatch::UnexpectedRoute {
                table_id: routes.table_id(),
                prefix,
                index: handle.index(),
            });
        }
    }
}

/// Check that every handle is reported exactly once, under its name.
pub fn check_presence(dump: &DumpSnapshot, handles: &[IfaceHandle]) -> VerifyReport {
    let mut report = VerifyReport::new();
    for handle in handles {
        presence_of(&mut report, dump, handle);
    }
    report
}

/// Check that none of the handles is reported anymore.
pub fn check_absence(dump: &DumpSnapshot, handles: &[IfaceHandle]) -> VerifyReport {
    let mut report = VerifyReport::new();
    for handle in handles {
        absence_of(&mut report, dump, handle);
    }
    report
}

/// Check that a name-filtered dump only returned matching records.
pub fn check_name_filtered(dump: &DumpSnapshot, pattern: &str) -> VerifyReport {
    let mut report = VerifyReport::new();
    for record in dump.records() {
        if !record.name.contains(pattern) {
            report.push(Mismatch::FilterLeak {
                index: record.index,
                name: record.name.clone(),
                pattern: pattern.to_string(),
            });
        }
    }
    report
}

/// Check connected routes: every forwarding handle's host prefix must
/// sit in the table attached to it, every other known binding must not.
pub fn check_routes(routes: &RouteSnapshot, handles: &[IfaceHandle]) -> VerifyReport {
    let mut report = VerifyReport::new();
    for handle in handles {
        route_of(&mut report, routes, handle);
    }
    report
}

/// Check the full observable contract of every handle in one pass:
/// dump visibility per lifecycle state plus route visibility.
pub fn check_lifecycle(
    dump: &DumpSnapshot,
    routes: &RouteSnapshot,
    handles: &[IfaceHandle],
) -> VerifyReport {
    let mut report = VerifyReport::new();
    for handle in handles {
        if handle.state().in_dump() {
            presence_of(&mut report, dump, handle);
        } else {
            absence_of(&mut report, dump, handle);
        }
        route_of(&mut report, routes, handle);
    }
    report
}
