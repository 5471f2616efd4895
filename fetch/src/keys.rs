use std::fmt::{Display, Formatter};

/// A key addressing one block in the content-addressed overlay.
///
/// Only the structure this crate needs is modelled here: enough to pass the key on to a
///  child block fetcher and to tell the key families apart. Parsing keys out of URIs and
///  deriving routing keys is the key layer's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKey {
    /// Immutable block addressed by the hash of its content.
    ContentHash { routing_key: [u8; 32] },
    /// Block in a signed subspace, addressed by public key and document name.
    SignedSubspace {
        routing_key: [u8; 32],
        doc_name: String,
    },
    /// Updatable subspace key: points at the latest edition of a document. These may not
    ///  appear inside a splitfile - a splitfile must address immutable blocks.
    UpdatableSubspace {
        routing_key: [u8; 32],
        doc_name: String,
        edition: u64,
    },
}

impl BlockKey {
    pub fn kind(&self) -> &'static str {
        match self {
            BlockKey::ContentHash { .. } => "CHK",
            BlockKey::SignedSubspace { .. } => "SSK",
            BlockKey::UpdatableSubspace { .. } => "USK",
        }
    }

    pub fn is_updatable(&self) -> bool {
        matches!(self, BlockKey::UpdatableSubspace { .. })
    }

    pub fn routing_key(&self) -> &[u8; 32] {
        match self {
            BlockKey::ContentHash { routing_key } => routing_key,
            BlockKey::SignedSubspace { routing_key, .. } => routing_key,
            BlockKey::UpdatableSubspace { routing_key, .. } => routing_key,
        }
    }
}

impl Display for BlockKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@", self.kind())?;
        for byte in &self.routing_key()[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "…")
    }
}
