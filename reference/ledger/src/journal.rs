//! Append-only event journal kept by each ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use dvp_common::{Address, LedgerEvent, LockId};

/// A single recorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the journal, starting at 0.
    pub sequence: u64,
    /// Ledger that emitted the event.
    pub ledger: Address,
    pub event: LedgerEvent,
    pub recorded_at: DateTime<Utc>,
}

/// Ordered events of one ledger.
#[derive(Debug, Clone)]
pub struct Journal {
    ledger: Address,
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new(ledger: Address) -> Self {
        Self {
            ledger,
            entries: Vec::new(),
        }
    }

    /// Append an event.
    pub fn record(&mut self, event: LedgerEvent) -> &JournalEntry {
        let sequence = self.entries.len() as u64;
        debug!(ledger = %self.ledger, sequence, event = event.name(), "Journal entry");
        self.entries.push(JournalEntry {
            sequence,
            ledger: self.ledger,
            event,
            recorded_at: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Entries with `sequence >= from`.
    pub fn since(&self, from: u64) -> &[JournalEntry] {
        let start = (from as usize).min(self.entries.len());
        &self.entries[start..]
    }

    pub fn last(&self) -> Option<&JournalEntry> {
        self.entries.last()
    }

    /// Events about one lock, in order.
    pub fn for_lock(&self, lock_id: &LockId) -> impl Iterator<Item = &LedgerEvent> + '_ {
        let lock_id = *lock_id;
        self.entries
            .iter()
            .map(|e| &e.event)
            .filter(move |e| e.lock_id() == Some(lock_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dvp_common::Digest;

    #[test]
    fn test_sequences_and_filters() {
        let mut journal = Journal::new(Address::from_label("zeto"));
        journal.record(LedgerEvent::UtxoMinted {
            outputs: vec![Digest::from_u64(1)],
        });
        let lock_id = LockId::from_bytes([7; 32]);
        journal.record(LedgerEvent::LockDelegated {
            lock_id,
            delegate: Address::from_label("atom"),
        });
        journal.record(LedgerEvent::LockWithdrawn {
            lock_id: LockId::from_bytes([8; 32]),
            owner: Address::from_label("alice"),
            released: vec![],
        });

        assert_eq!(journal.len(), 3);
        assert_eq!(journal.last().map(|e| e.sequence), Some(2));
        assert_eq!(journal.since(1).len(), 2);
        assert!(journal.since(10).is_empty());
        assert_eq!(journal.for_lock(&lock_id).count(), 1);
    }
}
