//! # Shared Registry
//!
//! The thread-safe form of [`LedgerFactory`](crate::factory::LedgerFactory),
//! used by the node service.
//!
//! Each ledger lives behind its own mutex: transfers, claims and every other
//! mutation on one ledger are serialized, while different ledgers proceed
//! independently. The creation index sits behind a separate `RwLock` that is
//! held across insertion so a ledger becomes visible in the map and in the
//! index together.
//!
//! Callers get back the events an operation produced. An [`EventSink`]
//! attached with [`SharedRegistry::with_event_sink`] sees them earlier,
//! while the ledger lock is still held, so a sink observes each ledger's
//! events in sequence order even under concurrent mutation.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;

use crate::account::{Account, LedgerId};
use crate::config::DEFAULT_JOURNAL_CAPACITY;
use crate::events::EventRecord;
use crate::factory::{FactoryError, LedgerIndex};
use crate::ledger::{Ledger, LedgerError, LedgerInfo, LedgerParams, TransferReceipt};
use crate::policy::FeePolicy;

/// The result of a mutation together with the events it emitted.
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub value: T,
    pub events: Vec<EventRecord>,
}

/// Receives committed events inside the owning ledger's critical section.
///
/// Called with the lock held: implementations must not block and must not
/// call back into the registry.
pub trait EventSink: Send + Sync {
    fn publish(&self, events: &[EventRecord]);
}

/// Concurrent ledger registry with one critical section per ledger.
pub struct SharedRegistry {
    ledgers: DashMap<LedgerId, Arc<Mutex<Ledger>>>,
    index: RwLock<LedgerIndex>,
    journal_capacity: usize,
    sink: Option<Arc<dyn EventSink>>,
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self {
            ledgers: DashMap::new(),
            index: RwLock::new(LedgerIndex::default()),
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
            sink: None,
        }
    }
}

impl fmt::Debug for SharedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRegistry")
            .field("ledgers", &self.ledgers.len())
            .field("journal_capacity", &self.journal_capacity)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Journal bound applied to every ledger created from now on.
    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn publish(&self, events: &[EventRecord]) {
        if let Some(sink) = &self.sink {
            if !events.is_empty() {
                sink.publish(events);
            }
        }
    }

    /// Validates and registers a new ledger.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::Validation`]; nothing is registered then.
    pub fn create(
        &self,
        creator: &Account,
        params: LedgerParams,
    ) -> Result<Applied<LedgerId>, FactoryError> {
        let mut ledger = Ledger::create(creator.clone(), params)?;
        ledger.set_journal_capacity(self.journal_capacity);
        let events = ledger.events_since(0);

        let mut index = self.index.write();
        let id = index.register(creator, &ledger);
        // Published before the ledger is reachable, so its creation event
        // always precedes anything done to it.
        self.publish(&events);
        self.ledgers.insert(id, Arc::new(Mutex::new(ledger)));
        drop(index);

        Ok(Applied { value: id, events })
    }

    pub fn ledger_count(&self) -> usize {
        self.index.read().count()
    }

    /// # Errors
    ///
    /// Returns [`FactoryError::IndexOutOfRange`] when `index >= ledger_count()`.
    pub fn ledger_at(&self, index: usize) -> Result<LedgerId, FactoryError> {
        self.index.read().at(index)
    }

    pub fn creator_ledgers(&self, creator: &Account) -> Vec<LedgerId> {
        self.index.read().by_creator(creator).to_vec()
    }

    fn handle(&self, id: &LedgerId) -> Result<Arc<Mutex<Ledger>>, FactoryError> {
        self.ledgers
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(FactoryError::LedgerNotFound(*id))
    }

    /// Runs `op` inside the ledger's critical section and collects the events
    /// it emitted. The event sink, if any, is fed before the lock is released.
    pub fn apply<T>(
        &self,
        id: &LedgerId,
        op: impl FnOnce(&mut Ledger) -> Result<T, LedgerError>,
    ) -> Result<Applied<T>, FactoryError> {
        let handle = self.handle(id)?;
        let mut ledger = handle.lock();
        let start = ledger.next_sequence();
        let value = op(&mut *ledger)?;
        let events = ledger.events_since(start);
        self.publish(&events);
        drop(ledger);
        Ok(Applied { value, events })
    }

    /// Runs a read-only `view` inside the ledger's critical section.
    pub fn read<T>(
        &self,
        id: &LedgerId,
        view: impl FnOnce(&Ledger) -> T,
    ) -> Result<T, FactoryError> {
        let handle = self.handle(id)?;
        let ledger = handle.lock();
        Ok(view(&*ledger))
    }

    pub fn transfer(
        &self,
        id: &LedgerId,
        from: &Account,
        to: &Account,
        amount: u64,
    ) -> Result<Applied<TransferReceipt>, FactoryError> {
        self.apply(id, |ledger| ledger.transfer(from, to, amount))
    }

    pub fn transfer_from(
        &self,
        id: &LedgerId,
        spender: &Account,
        from: &Account,
        to: &Account,
        amount: u64,
    ) -> Result<Applied<TransferReceipt>, FactoryError> {
        self.apply(id, |ledger| ledger.transfer_from(spender, from, to, amount))
    }

    pub fn approve(
        &self,
        id: &LedgerId,
        owner: &Account,
        spender: &Account,
        amount: u64,
    ) -> Result<Applied<()>, FactoryError> {
        self.apply(id, |ledger| ledger.approve(owner, spender, amount))
    }

    pub fn claim(&self, id: &LedgerId, holder: &Account) -> Result<Applied<u64>, FactoryError> {
        self.apply(id, |ledger| ledger.claim(holder))
    }

    pub fn transfer_ownership(
        &self,
        id: &LedgerId,
        new_owner: Account,
    ) -> Result<Applied<()>, FactoryError> {
        self.apply(id, |ledger| ledger.transfer_ownership(new_owner))
    }

    pub fn peek(&self, id: &LedgerId, holder: &Account) -> Result<u64, FactoryError> {
        self.read(id, |ledger| ledger.peek(holder))
    }

    pub fn balance_of(&self, id: &LedgerId, holder: &Account) -> Result<u64, FactoryError> {
        self.read(id, |ledger| ledger.balance_of(holder))
    }

    pub fn fee_policy(&self, id: &LedgerId) -> Result<FeePolicy, FactoryError> {
        self.read(id, |ledger| ledger.fee_policy().clone())
    }

    pub fn current_owner(&self, id: &LedgerId) -> Result<Account, FactoryError> {
        self.read(id, |ledger| ledger.owner().clone())
    }

    pub fn info(&self, id: &LedgerId) -> Result<LedgerInfo, FactoryError> {
        self.read(id, Ledger::info)
    }
}
