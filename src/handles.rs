//! Host-side registry for engine handles.
//!
//! The engine hands out raw integers that point into its own memory. The
//! registry never gives those to the host directly: each raw handle is
//! parked in a slot and the host receives a typed token carrying the slot
//! index and a generation counter. Releasing a handle retires the slot and
//! bumps its generation, so a double free, a use after free or a handle of
//! the wrong kind is caught here as a [`HandleError`] instead of reaching
//! the engine.
//!
//! These errors are host programming errors. They never trip the panic
//! guard and never disturb other live handles.

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::native::RawHandle;

/// What an engine handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HandleKind {
    Task,
    ParseOutput,
    RunOutput,
}

impl HandleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::ParseOutput => "parse_output",
            Self::RunOutput => "run_output",
        }
    }
}

/// Who frees the engine resource behind a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The host must release it exactly once.
    Owned,
    /// The engine keeps ownership; the slot only lives for a callback.
    Borrowed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type")]
pub enum HandleError {
    #[error("unknown {} handle", .kind.as_str())]
    Unknown { kind: HandleKind },

    #[error("stale {} handle (already released)", .kind.as_str())]
    Stale { kind: HandleKind },

    #[error("expected a {} handle, got a {} handle", .expected.as_str(), .actual.as_str())]
    WrongKind {
        expected: HandleKind,
        actual: HandleKind,
    },

    #[error("{} handle is owned by the engine and cannot be released", .kind.as_str())]
    NotOwned { kind: HandleKind },

    #[error("handle table exhausted ({capacity} owned handles)")]
    Exhausted { capacity: usize },
}

/// Untyped host token: slot index plus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Handle {
    slot: u32,
    generation: u32,
}

impl Handle {
    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// A handle whose kind is known at compile time.
pub trait TypedHandle: Copy + std::fmt::Debug {
    const KIND: HandleKind;

    fn from_handle(handle: Handle) -> Self;

    fn handle(self) -> Handle;
}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident => $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub struct $name(Handle);

        impl TypedHandle for $name {
            const KIND: HandleKind = $kind;

            fn from_handle(handle: Handle) -> Self {
                Self(handle)
            }

            fn handle(self) -> Handle {
                self.0
            }
        }
    };
}

typed_handle!(
    /// Cancellation token for an in-flight run.
    TaskHandle => HandleKind::Task
);
typed_handle!(
    /// Output of `parse_script`.
    ParseHandle => HandleKind::ParseOutput
);
typed_handle!(
    /// Output of `run`, or an intermediate output during a progress callback.
    RunHandle => HandleKind::RunOutput
);

#[derive(Debug)]
struct Entry {
    kind: HandleKind,
    raw: RawHandle,
    ownership: Ownership,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Debug, Default)]
struct Table {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    owned: usize,
}

impl Table {
    fn lookup(&self, handle: Handle, kind: HandleKind) -> Result<&Entry, HandleError> {
        let slot = self
            .slots
            .get(handle.slot as usize)
            .ok_or(HandleError::Unknown { kind })?;
        if slot.generation != handle.generation {
            return Err(HandleError::Stale { kind });
        }
        let entry = slot.entry.as_ref().ok_or(HandleError::Stale { kind })?;
        if entry.kind != kind {
            return Err(HandleError::WrongKind { expected: kind, actual: entry.kind });
        }
        Ok(entry)
    }

    fn retire(&mut self, handle: Handle) -> Option<Entry> {
        let slot = &mut self.slots[handle.slot as usize];
        let entry = slot.entry.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.slot);
        self.live -= 1;
        if matches!(&entry, Some(e) if e.ownership == Ownership::Owned) {
            self.owned -= 1;
        }
        entry
    }
}

/// Thread-safe table of live engine handles.
#[derive(Debug)]
pub struct HandleRegistry {
    table: Mutex<Table>,
    capacity: usize,
}

impl HandleRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Park a raw engine handle and return a fresh typed token for it.
    ///
    /// Capacity bounds owned handles only. Borrowed slots live for a single
    /// progress callback and are always admitted.
    pub fn insert<H: TypedHandle>(
        &self,
        raw: RawHandle,
        ownership: Ownership,
    ) -> Result<H, HandleError> {
        let mut table = self.table.lock();
        if ownership == Ownership::Owned && table.owned >= self.capacity {
            return Err(HandleError::Exhausted { capacity: self.capacity });
        }
        let entry = Entry { kind: H::KIND, raw, ownership };
        let index = match table.free.pop() {
            Some(index) => index,
            None => {
                table.slots.push(Slot::default());
                (table.slots.len() - 1) as u32
            }
        };
        let slot = &mut table.slots[index as usize];
        slot.entry = Some(entry);
        let generation = slot.generation;
        table.live += 1;
        if ownership == Ownership::Owned {
            table.owned += 1;
        }
        Ok(H::from_handle(Handle { slot: index, generation }))
    }

    /// Look up the raw engine handle behind a live token.
    pub fn resolve<H: TypedHandle>(&self, handle: H) -> Result<RawHandle, HandleError> {
        let table = self.table.lock();
        table.lookup(handle.handle(), H::KIND).map(|e| e.raw)
    }

    /// Retire an owned handle and return the raw handle to free in the
    /// engine. A second release of the same token fails with `Stale`.
    pub fn release<H: TypedHandle>(&self, handle: H) -> Result<RawHandle, HandleError> {
        let mut table = self.table.lock();
        let entry = table.lookup(handle.handle(), H::KIND)?;
        if entry.ownership == Ownership::Borrowed {
            return Err(HandleError::NotOwned { kind: H::KIND });
        }
        let raw = entry.raw;
        table.retire(handle.handle());
        Ok(raw)
    }

    /// Retire a handle regardless of ownership, without producing anything
    /// to free. Used when a borrowed handle's lifetime ends.
    pub fn expire<H: TypedHandle>(&self, handle: H) -> Result<(), HandleError> {
        let mut table = self.table.lock();
        table.lookup(handle.handle(), H::KIND)?;
        table.retire(handle.handle());
        Ok(())
    }

    /// Number of live handles of one kind.
    pub fn live_count(&self, kind: HandleKind) -> usize {
        let table = self.table.lock();
        table
            .slots
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .filter(|e| e.kind == kind)
            .count()
    }

    /// Number of live handles of all kinds.
    pub fn live_total(&self) -> usize {
        self.table.lock().live
    }
}
