//! Packed index entries: the RAM-resident view of one stored event.
//!
//! Wire layout (little-endian, no padding), 52 bytes:
//! `event_id[32] created_at:u32 expires_at:u32 kind:u16 pubkey_prefix[4]
//! file_index:u32 flags:u8 reserved:u8`

use nostr_proto::{EventId, Filter};

/// Tombstone bit; set entries are invisible to queries until compaction.
pub const FLAG_DELETED: u8 = 0x01;

/// Size of one encoded entry.
pub const PACKED_SIZE: usize = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub event_id: [u8; 32],
    pub created_at: u32,
    /// Unix seconds; 0 means "never expires".
    pub expires_at: u32,
    pub kind: u16,
    pub pubkey_prefix: [u8; 4],
    /// Generation token embedded in the event's file name.
    pub file_index: u32,
    pub flags: u8,
}

impl IndexEntry {
    pub fn is_deleted(&self) -> bool {
        self.flags & FLAG_DELETED != 0
    }

    pub fn is_expired(&self, now: u32) -> bool {
        self.expires_at > 0 && self.expires_at < now
    }

    pub fn id(&self) -> EventId {
        EventId(self.event_id)
    }

    pub fn encode(&self) -> [u8; PACKED_SIZE] {
        let mut buf = [0u8; PACKED_SIZE];
        buf[0..32].copy_from_slice(&self.event_id);
        buf[32..36].copy_from_slice(&self.created_at.to_le_bytes());
        buf[36..40].copy_from_slice(&self.expires_at.to_le_bytes());
        buf[40..42].copy_from_slice(&self.kind.to_le_bytes());
        buf[42..46].copy_from_slice(&self.pubkey_prefix);
        buf[46..50].copy_from_slice(&self.file_index.to_le_bytes());
        buf[50] = self.flags;
        // buf[51] reserved
        buf
    }

    pub fn decode(buf: &[u8; PACKED_SIZE]) -> Self {
        let mut event_id = [0u8; 32];
        event_id.copy_from_slice(&buf[0..32]);
        let mut pubkey_prefix = [0u8; 4];
        pubkey_prefix.copy_from_slice(&buf[42..46]);
        Self {
            event_id,
            created_at: u32::from_le_bytes(buf[32..36].try_into().unwrap()),
            expires_at: u32::from_le_bytes(buf[36..40].try_into().unwrap()),
            kind: u16::from_le_bytes(buf[40..42].try_into().unwrap()),
            pubkey_prefix,
            file_index: u32::from_le_bytes(buf[46..50].try_into().unwrap()),
            flags: buf[50],
        }
    }

    /// Cheap pre-filter on index fields alone. A `true` here still requires
    /// the full match against the loaded event; a `false` is definitive.
    pub fn passes_prefilter(&self, filter: &Filter) -> bool {
        if let Some(since) = filter.since {
            if i64::from(self.created_at) < since {
                return false;
            }
        }
        if let Some(until) = filter.until {
            if i64::from(self.created_at) > until {
                return false;
            }
        }
        if !filter.kinds.is_empty() && !filter.kinds.contains(&self.kind) {
            return false;
        }
        if !filter.ids.is_empty() {
            let id_hex = hex::encode(self.event_id);
            if !filter.ids.iter().any(|p| id_hex.starts_with(p.as_str())) {
                return false;
            }
        }
        if !filter.authors.is_empty() {
            // Only 4 pubkey bytes live in the index, so compare the common
            // prefix; longer author prefixes are settled by the full match.
            let prefix_hex = hex::encode(self.pubkey_prefix);
            let admitted = filter.authors.iter().any(|p| {
                let n = p.len().min(prefix_hex.len());
                p.as_bytes()[..n].eq_ignore_ascii_case(&prefix_hex.as_bytes()[..n])
            });
            if !admitted {
                return false;
            }
        }
        true
    }
}
