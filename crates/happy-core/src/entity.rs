//! Logical entities whose traffic is encrypted under independent data keys.

use std::fmt;

/// Kind of a logical entity addressed over a server connection.
///
/// Sessions and machines additionally expose an RPC surface; artifacts only
/// have data keys discovered for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Session,
    Machine,
    Artifact,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Session => "session",
            EntityKind::Machine => "machine",
            EntityKind::Artifact => "artifact",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the composite method name that multiplexes one entity's RPC traffic
/// over the shared socket: `{entityId}:{method}`.
pub fn composite_method(entity_id: &str, method: &str) -> String {
    format!("{entity_id}:{method}")
}
