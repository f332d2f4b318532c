//! Schema preflight: one probe per expected table before any sync pass
//! mutates anything.

use crate::config::RemoteConfig;
use crate::error::Error;
use crate::models::EntityKind;
use crate::remote::RemoteAdapter;

/// What the preflight found out about the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Every expected table and column is present.
    Ready,
    /// No endpoint or credentials; local-only mode continues.
    Unconfigured,
    /// Backend reachable but missing an expected table or column; the
    /// caller owns the guided repair flow.
    Uninitialized {
        /// Table the probe failed on
        table: String,
        /// Column the probe failed on
        column: String,
    },
    /// Backend unreachable.
    Network(String),
    /// The backend answered something the probe cannot classify.
    Unknown(String),
}

/// Probe every expected table. Stops at the first failure; the
/// classification decides whether a pass may proceed.
pub async fn run<R: RemoteAdapter>(remote: &R, config: &RemoteConfig) -> ProbeStatus {
    if !config.is_configured() {
        return ProbeStatus::Unconfigured;
    }

    for kind in EntityKind::ALL {
        let table = kind.table();
        let column = kind.probe_column();
        match remote.probe(table, column).await {
            Ok(()) => {}
            Err(Error::Schema { table, column }) => {
                tracing::warn!(table, column, "schema probe found a gap");
                return ProbeStatus::Uninitialized { table, column };
            }
            Err(Error::Network(message)) => return ProbeStatus::Network(message),
            Err(error) => return ProbeStatus::Unknown(error.to_string()),
        }
    }

    ProbeStatus::Ready
}
