//! Nostr events: fixed-size identity types, kind classification, canonical
//! serialization, and signature verification.

use k256::schnorr::signature::Verifier;
use k256::schnorr::VerifyingKey;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::ProtocolError;

/// Kind number reserved for NIP-09 deletion requests.
pub const KIND_DELETION: u16 = 5;

// ---------------------------------------------------------------------------
// Fixed-size identity types
// ---------------------------------------------------------------------------

/// 32-byte event id: sha256 of the canonical serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub [u8; 32]);

/// 32-byte x-only BIP340 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pubkey(pub [u8; 32]);

/// 64-byte BIP340 Schnorr signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

fn bytes_from_hex<const N: usize>(
    s: &str,
    field: &'static str,
) -> Result<[u8; N], ProtocolError> {
    let decoded = hex::decode(s).map_err(|_| ProtocolError::InvalidHex {
        field,
        expected: N,
    })?;
    let arr: [u8; N] = decoded
        .try_into()
        .map_err(|_| ProtocolError::InvalidHex {
            field,
            expected: N,
        })?;
    Ok(arr)
}

macro_rules! hex_newtype {
    ($ty:ident, $len:expr, $field:literal) => {
        impl $ty {
            pub fn from_hex(s: &str) -> Result<Self, ProtocolError> {
                Ok(Self(bytes_from_hex::<$len>(s, $field)?))
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                $ty::from_hex(&s).map_err(D::Error::custom)
            }
        }
    };
}

hex_newtype!(EventId, 32, "id");
hex_newtype!(Pubkey, 32, "pubkey");
hex_newtype!(Signature, 64, "sig");

// ---------------------------------------------------------------------------
// Kind classification
// ---------------------------------------------------------------------------

/// Broadcast-only kinds; never persisted.
pub fn is_ephemeral(kind: u16) -> bool {
    (20_000..30_000).contains(&kind)
}

/// Kinds where a newer event by the same author supersedes older ones.
pub fn is_replaceable(kind: u16) -> bool {
    kind == 0 || kind == 3 || (10_000..20_000).contains(&kind)
}

/// Replaceable by (kind, author, d-tag) triple.
pub fn is_addressable(kind: u16) -> bool {
    (30_000..40_000).contains(&kind)
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A signed Nostr event, immutable after parse.
///
/// Relationship invariants (enforced by [`Event::verify`], not construction):
/// - `id == sha256(canonical serialization)`
/// - `sig` verifies over `id` under `pubkey`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub pubkey: Pubkey,
    pub created_at: i64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: Signature,
}

/// Outcome of structural + cryptographic verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    /// The recomputed canonical hash does not equal `id`.
    IdMismatch,
    /// The pubkey is not a valid x-only point, or the signature fails.
    BadSignature,
}

impl Event {
    /// Canonical NIP-01 serialization: `[0, pubkey, created_at, kind, tags,
    /// content]` in compact JSON. This is the sha256 preimage for the id.
    pub fn canonical_serialization(&self) -> String {
        serde_json::json!([
            0,
            self.pubkey.to_hex(),
            self.created_at,
            self.kind,
            self.tags,
            self.content,
        ])
        .to_string()
    }

    /// Recompute the id from the canonical serialization.
    pub fn compute_id(&self) -> EventId {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_serialization().as_bytes());
        EventId(hasher.finalize().into())
    }

    /// Check the id hash and the BIP340 signature.
    pub fn verify(&self) -> Result<(), VerifyError> {
        if self.compute_id() != self.id {
            return Err(VerifyError::IdMismatch);
        }
        let key =
            VerifyingKey::from_bytes(&self.pubkey.0).map_err(|_| VerifyError::BadSignature)?;
        let sig = k256::schnorr::Signature::try_from(self.sig.0.as_slice())
            .map_err(|_| VerifyError::BadSignature)?;
        key.verify(&self.id.0, &sig)
            .map_err(|_| VerifyError::BadSignature)
    }

    pub fn is_ephemeral(&self) -> bool {
        is_ephemeral(self.kind)
    }

    pub fn is_deletion(&self) -> bool {
        self.kind == KIND_DELETION
    }

    /// First value of the first tag named `name`, if any.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.len() >= 2 && t[0] == name)
            .map(|t| t[1].as_str())
    }

    /// All first values of tags named `name`.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.len() >= 2 && t[0] == name)
            .map(|t| t[1].as_str())
    }

    /// NIP-40 expiration timestamp, when carried and parseable.
    pub fn expiration(&self) -> Option<i64> {
        self.tag_value("expiration")?.parse().ok()
    }

    /// NIP-33 `d` identifier; absent tag reads as the empty string.
    pub fn d_tag(&self) -> &str {
        self.tag_value("d").unwrap_or("")
    }

    /// Leading zero bits of the id, i.e. the NIP-13 proof-of-work difficulty.
    pub fn pow_difficulty(&self) -> u32 {
        let mut bits = 0;
        for byte in self.id.0 {
            if byte == 0 {
                bits += 8;
            } else {
                bits += byte.leading_zeros();
                break;
            }
        }
        bits
    }
}
