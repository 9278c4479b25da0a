//! Tree projection engine.
//!
//! Projects object-storage semantics onto the tree service.  The
//! [`backend::TreeBackend`] trait defines the six-RPC wire contract;
//! [`TreeClient`] is the engine entry point, with its operations split
//! across the version, multipart, system, and listing modules.

pub mod backend;
pub mod codec;
pub mod gateway;
pub mod listing;
pub mod memory;
pub mod multipart;
pub mod path;
pub mod system;
pub mod versions;

use std::sync::Arc;

use crate::auth::Signer;
use crate::tree::backend::TreeBackend;
use crate::tree::gateway::TreeGateway;

/// Engine entry point: object-storage operations over one backend handle.
///
/// The client holds no mutable state of its own; every operation is a
/// self-contained sequence of gateway calls, and the backend is the sole
/// serializer of concurrent writers.
pub struct TreeClient {
    gateway: TreeGateway,
}

impl TreeClient {
    /// Create a client over a backend handle and a signing key.
    pub fn new(backend: Arc<dyn TreeBackend>, signer: Signer) -> Self {
        TreeClient {
            gateway: TreeGateway::new(backend, signer),
        }
    }

    pub(crate) fn gateway(&self) -> &TreeGateway {
        &self.gateway
    }
}
