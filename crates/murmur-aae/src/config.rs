// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Static cluster configuration.
//!
//! Loaded from JSON by the node binary; the shape matches the config file:
//!
//! ```json
//! { "current":   { "snapshot_receiver": {"addr": "0.0.0.0", "port": 50001},
//!                  "document_receiver": {"addr": "0.0.0.0", "port": 50002} },
//!   "neighbors": [ { "snapshot_receiver": {...}, "document_receiver": {...} } ] }
//! ```
//!
//! Membership is static: the neighbor list never changes at runtime.

use serde::{Deserialize, Serialize};

/// One socket address in config form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host or interface address.
    pub addr: String,
    /// TCP/UDP port; zero asks the OS for an ephemeral port.
    pub port: u16,
}

impl Endpoint {
    /// The `host:port` form accepted by the socket binders.
    pub fn to_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

/// The pair of endpoints every node exposes to its neighbors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEndpoints {
    /// UDP socket answering fingerprint checks.
    pub snapshot_receiver: Endpoint,
    /// TCP listener accepting document pushes.
    pub document_receiver: Endpoint,
}

/// This node's endpoints plus its static neighbor list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AaeConfig {
    /// Endpoints this node binds.
    pub current: NodeEndpoints,
    /// Peers this node reconciles with.
    pub neighbors: Vec<NodeEndpoints>,
}
