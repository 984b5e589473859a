//! Deterministic keypairs and event signing for tests.

use k256::schnorr::signature::Signer;
use k256::schnorr::SigningKey;
use nostr_proto::{Event, EventId, Pubkey, Signature};

/// A BIP340 keypair derived from a fixed secret, so test events are
/// reproducible across runs.
pub struct TestKeys {
    signing: SigningKey,
}

impl TestKeys {
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(secret).expect("fixture secret must be a valid key");
        Self { signing }
    }

    pub fn alice() -> Self {
        Self::from_secret(&[0xa1; 32])
    }

    pub fn bob() -> Self {
        Self::from_secret(&[0xb2; 32])
    }

    pub fn carol() -> Self {
        Self::from_secret(&[0xc3; 32])
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey(self.signing.verifying_key().to_bytes().into())
    }

    pub fn pubkey_hex(&self) -> String {
        self.pubkey().to_hex()
    }
}

/// The author-controlled fields of an event; id and signature are derived.
#[derive(Debug, Clone)]
pub struct EventSpec {
    pub kind: u16,
    pub created_at: i64,
    pub content: String,
    pub tags: Vec<Vec<String>>,
}

/// Build a fully signed event: canonical id hash plus a valid signature.
pub fn signed_event(keys: &TestKeys, spec: EventSpec) -> Event {
    let mut event = Event {
        id: EventId([0; 32]),
        pubkey: keys.pubkey(),
        created_at: spec.created_at,
        kind: spec.kind,
        tags: spec.tags,
        content: spec.content,
        sig: Signature([0; 64]),
    };
    event.id = event.compute_id();
    let sig: k256::schnorr::Signature = keys.signing.sign(&event.id.0);
    event.sig = Signature(sig.to_bytes());
    event
}
