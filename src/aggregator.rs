//! Key → partner record mapping with tag accumulation.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::watch;

use crate::record::PartnerRecord;

#[derive(Debug)]
enum Slot {
    Stored(usize),
    /// A detail fetch is in flight. Dropping the sender wakes every caller
    /// waiting on it.
    Pending(watch::Sender<()>),
}

#[derive(Debug, Default)]
struct State {
    records: Vec<PartnerRecord>,
    index: HashMap<String, Slot>,
}

/// All partners gathered by one crawl run, in first-insertion order.
///
/// Every check-then-act sequence happens under one lock, so concurrent
/// rounds never extract the same key at the same time.
#[derive(Debug, Default)]
pub struct MergeAggregator {
    state: Mutex<State>,
}

/// Outcome of [`MergeAggregator::claim`].
#[derive(Debug)]
pub enum Claim<'a> {
    /// The key is stored; the sighting was recorded.
    Tagged,
    /// The caller owns the key and must fetch it.
    Reserved(Reservation<'a>),
    /// Someone else is fetching the key. Claim again once it settles.
    InFlight(InFlight),
}

/// Handle on another caller's in-flight fetch of a key.
#[derive(Debug)]
pub struct InFlight {
    settled: watch::Receiver<()>,
}

impl InFlight {
    /// Resolves once the fetch was committed or abandoned.
    pub async fn settled(mut self) {
        while self.settled.changed().await.is_ok() {}
    }
}

impl MergeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from records of an earlier run; their keys are only tagged.
    pub fn with_records<I: IntoIterator<Item = PartnerRecord>>(records: I) -> Self {
        let aggregator = Self::new();
        for record in records {
            aggregator.upsert_new(record);
        }
        aggregator
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, key: &str) -> bool {
        matches!(self.lock().index.get(key), Some(Slot::Stored(_)))
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a record under its key. No-op returning `false` if the key is
    /// already stored or reserved.
    pub fn upsert_new(&self, record: PartnerRecord) -> bool {
        let mut state = self.lock();
        if state.index.contains_key(record.key()) {
            return false;
        }
        let position = state.records.len();
        state
            .index
            .insert(record.key().to_string(), Slot::Stored(position));
        state.records.push(record);
        true
    }

    /// Adds `(section, value)` to a stored key. Returns `false` otherwise.
    pub fn tag_existing(&self, key: &str, section: &str, value: &str) -> bool {
        let mut state = self.lock();
        let State { records, index } = &mut *state;
        match index.get(key) {
            Some(Slot::Stored(position)) => {
                records[*position].add_tag(section, value);
                true
            }
            _ => false,
        }
    }

    /// Tags `key` if it is stored, reserves it for the caller if it is
    /// unknown, or hands back the fetch already in flight.
    pub fn claim(&self, key: &str, section: &str, value: &str) -> Claim<'_> {
        let mut state = self.lock();
        let State { records, index } = &mut *state;
        match index.get(key) {
            Some(Slot::Stored(position)) => {
                records[*position].add_tag(section, value);
                return Claim::Tagged;
            }
            Some(Slot::Pending(sender)) => {
                return Claim::InFlight(InFlight {
                    settled: sender.subscribe(),
                });
            }
            None => {}
        }
        let (sender, _) = watch::channel(());
        index.insert(key.to_string(), Slot::Pending(sender));
        Claim::Reserved(Reservation {
            aggregator: self,
            key: key.to_string(),
            section: section.to_string(),
            value: value.to_string(),
            committed: false,
        })
    }

    /// Copy of every stored record, in insertion order.
    pub fn snapshot(&self) -> Vec<PartnerRecord> {
        self.lock().records.clone()
    }

    pub fn into_records(self) -> Vec<PartnerRecord> {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .records
    }
}

/// Exclusive right to extract one key. Dropping it uncommitted releases the
/// key, and the next caller waiting on it reserves it instead.
#[derive(Debug)]
pub struct Reservation<'a> {
    aggregator: &'a MergeAggregator,
    key: String,
    section: String,
    value: String,
    committed: bool,
}

impl Reservation<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stores `record` under the reserved key with the reserving tag as its
    /// only discovery context. Callers waiting on the key tag it themselves.
    pub fn commit(mut self, mut record: PartnerRecord) {
        record.link = self.key.clone();
        record.found_in.clear();
        record.add_tag(&self.section, &self.value);

        let mut state = self.aggregator.lock();
        let position = state.records.len();
        state.index.insert(self.key.clone(), Slot::Stored(position));
        state.records.push(record);
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut state = self.aggregator.lock();
        if let Some(Slot::Pending(sender)) = state.index.remove(&self.key) {
            let waiting = sender.receiver_count();
            if waiting > 0 {
                tracing::debug!(key = self.key, waiting, "released reservation to waiting rounds");
            }
        }
    }
}
