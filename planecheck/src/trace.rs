//! Call trace for control-plane operations.
//!
//! Every call a session issues is recorded with its outcome, so a failed
//! scenario can be reconstructed after the fact without re-running it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Outcome of a traced call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CallOutcome {
    /// The engine accepted the call.
    Ok,
    /// The engine refused; carries the reason verbatim.
    Rejected(String),
}

/// One control-plane call as issued by a session.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    /// When the call returned.
    pub at: DateTime<Utc>,
    /// Operation name, e.g. `set_admin_state`.
    pub call: &'static str,
    /// Key arguments, rendered for humans.
    pub detail: String,
    /// How the call ended.
    pub outcome: CallOutcome,
}

/// Ordered record of every control-plane call in a session.
#[derive(Debug, Default, Serialize)]
pub struct CallTrace {
    entries: Vec<TraceEntry>,
}

impl CallTrace {
    pub fn new() -> Self {
        CallTrace {
            entries: Vec::new(),
        }
    }

    /// Append one entry, stamped now.
    pub(crate) fn record(&mut self, call: &'static str, detail: String, outcome: CallOutcome) {
        debug!(call, %detail, ?outcome, "control-plane call");
        self.entries.push(TraceEntry {
            at: Utc::now(),
            call,
            detail,
            outcome,
        });
    }

    /// All entries in call order.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Operation names in call order.
    pub fn calls(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.call)
    }

    /// Render the trace as pretty-printed JSON for attachment to reports.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_keeps_call_order() {
        let mut trace = CallTrace::new();
        trace.record("create_interfaces", "count=2".to_string(), CallOutcome::Ok);
        trace.record(
            "delete_interface",
            "index=1".to_string(),
            CallOutcome::Rejected("no interface with index 1".to_string()),
        );

        assert_eq!(trace.len(), 2);
        let calls: Vec<_> = trace.calls().collect();
        assert_eq!(calls, vec!["create_interfaces", "delete_interface"]);
        assert_eq!(trace.entries()[0].outcome, CallOutcome::Ok);
        assert!(matches!(
            trace.entries()[1].outcome,
            CallOutcome::Rejected(_)
        ));
    }

    #[test]
    fn test_trace_exports_json() {
        let mut trace = CallTrace::new();
        trace.record("dump_interfaces", "all".to_string(), CallOutcome::Ok);

        let json = trace.to_json().unwrap();
        assert!(json.contains("dump_interfaces"));
        assert!(json.contains("\"outcome\""));
    }
}
