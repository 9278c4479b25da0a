//! Request signing and ambient per-request credentials.
//!
//! Every outbound tree request body is signed with the gateway's private
//! key: an HMAC-SHA256 over the body's canonical byte encoding, tagged with
//! a key identifier so the backend can select the verification key.  The
//! bearer token travels separately: the frontend resolves it into an
//! access box and hands it to the engine inside a [`RequestContext`];
//! the engine only ever reads it.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

// ── Ambient request state ───────────────────────────────────────────

/// Opaque credential bundle attached to a request by the auth frontend.
#[derive(Debug, Clone, Default)]
pub struct AccessBox {
    /// Gate section holding tokens usable against the storage backends.
    pub gate: Option<GateData>,
}

/// Gate section of an access box.
#[derive(Debug, Clone, Default)]
pub struct GateData {
    /// Serialized bearer token, forwarded verbatim on every tree RPC.
    pub bearer_token: Option<Bytes>,
}

/// Per-request state the engine reads but never writes. Passed explicitly
/// alongside every operation rather than through an ambient side channel.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Access box resolved by the frontend, if the request carried one.
    pub box_data: Option<AccessBox>,
}

impl RequestContext {
    /// A context with no credentials. Outbound requests carry no bearer.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A context carrying the given bearer token.
    pub fn with_bearer(token: Bytes) -> Self {
        RequestContext {
            box_data: Some(AccessBox {
                gate: Some(GateData {
                    bearer_token: Some(token),
                }),
            }),
        }
    }

    /// Bearer token bytes to attach to outbound tree requests, if present.
    pub fn bearer(&self) -> Option<Bytes> {
        self.box_data
            .as_ref()?
            .gate
            .as_ref()?
            .bearer_token
            .clone()
    }
}

// ── Signing ─────────────────────────────────────────────────────────

/// Signature over a request body: the signer's key identifier plus the MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Identifier of the signing key (SHA-256 of the key material).
    pub key: Bytes,
    /// MAC bytes over the body's canonical encoding.
    pub sign: Bytes,
}

/// Signs tree request bodies with the gateway private key.
#[derive(Clone)]
pub struct Signer {
    key: Vec<u8>,
    key_id: Bytes,
}

impl Signer {
    /// Create a signer from raw key material.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        let key_id = Bytes::from(Sha256::digest(&key).to_vec());
        Signer { key, key_id }
    }

    /// Create a signer from a hex-encoded key, as stored in configuration.
    pub fn from_hex(hex_key: &str) -> anyhow::Result<Self> {
        if hex_key.is_empty() {
            anyhow::bail!("signing key is empty");
        }
        let key = hex::decode(hex_key)
            .map_err(|e| anyhow::anyhow!("signing key is not valid hex: {e}"))?;
        Ok(Signer::new(key))
    }

    /// Sign a canonical body encoding.
    pub fn sign(&self, body: &[u8]) -> Signature {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any size");
        mac.update(body);
        Signature {
            key: self.key_id.clone(),
            sign: Bytes::from(mac.finalize().into_bytes().to_vec()),
        }
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}
