//! Identifiers shared across the gateway

use serde::{Deserialize, Serialize};
use std::fmt;

/// The backend services the gateway can dispatch to.
///
/// The set is closed: the registry maps every tool onto exactly one of these,
/// and dispatch selects the connector by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Snowflake data warehouse
    Warehouse,
    /// Asana task tracker
    TaskTracker,
    /// Make.com automation platform
    Automation,
    /// GitHub source host
    SourceHost,
    /// ElevenLabs voice platform
    Voice,
    /// Hive Mind shared memory (stored in the warehouse)
    SharedMemory,
    /// The gateway itself (status tool)
    Gateway,
}

impl BackendKind {
    /// All kinds, in the order they are reported.
    pub const ALL: [BackendKind; 7] = [
        BackendKind::Warehouse,
        BackendKind::TaskTracker,
        BackendKind::Automation,
        BackendKind::SourceHost,
        BackendKind::Voice,
        BackendKind::SharedMemory,
        BackendKind::Gateway,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Warehouse => "warehouse",
            BackendKind::TaskTracker => "task_tracker",
            BackendKind::Automation => "automation",
            BackendKind::SourceHost => "source_host",
            BackendKind::Voice => "voice",
            BackendKind::SharedMemory => "shared_memory",
            BackendKind::Gateway => "gateway",
        }
    }

    /// The concrete service behind this kind.
    pub fn service(&self) -> &'static str {
        match self {
            BackendKind::Warehouse => "snowflake",
            BackendKind::TaskTracker => "asana",
            BackendKind::Automation => "make",
            BackendKind::SourceHost => "github",
            BackendKind::Voice => "elevenlabs",
            BackendKind::SharedMemory => "hivemind",
            BackendKind::Gateway => "gateway",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which transport adapter owns a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Request/response per exchange (HTTP POST)
    Streaming,
    /// Server-push event stream (SSE)
    Push,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Streaming => write!(f, "streaming"),
            TransportKind::Push => write!(f, "push"),
        }
    }
}
