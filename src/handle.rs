//! Opaque handles for native objects exposed to the host.

use serde::Serialize;

/// Category of native object a handle refers to.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HandleKind {
    Wallet = 1,
    PendingTransaction = 2,
    TransactionHistory = 3,
    Listener = 4,
}

impl HandleKind {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(HandleKind::Wallet),
            2 => Some(HandleKind::PendingTransaction),
            3 => Some(HandleKind::TransactionHistory),
            4 => Some(HandleKind::Listener),
            _ => None,
        }
    }
}

const INDEX_BITS: u32 = 32;
const GENERATION_BITS: u32 = 24;
const GENERATION_MASK: u64 = (1 << GENERATION_BITS) - 1;

/// Opaque handle to a native object.
///
/// The host holds a non-owning token; the object itself lives in the
/// [`HandleRegistry`](crate::registry::HandleRegistry). Layout, low to high:
/// 32 bits slot index, 24 bits slot generation, 8 bits [`HandleKind`] tag.
/// A released slot bumps its generation, so an old token stops resolving
/// instead of reaching whatever reuses the slot.
///
/// `0` is the null handle.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct WbHandle(pub u64);

impl WbHandle {
    pub const NULL: WbHandle = WbHandle(0);

    pub(crate) fn new(kind: HandleKind, index: u32, generation: u32) -> Self {
        let generation = u64::from(generation) & GENERATION_MASK;
        WbHandle(
            (u64::from(kind as u8) << (INDEX_BITS + GENERATION_BITS))
                | (generation << INDEX_BITS)
                | u64::from(index),
        )
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Kind tag, or `None` for the null handle and garbage values.
    pub fn kind(&self) -> Option<HandleKind> {
        HandleKind::from_tag((self.0 >> (INDEX_BITS + GENERATION_BITS)) as u8)
    }

    pub(crate) fn index(&self) -> usize {
        (self.0 & u64::from(u32::MAX)) as usize
    }

    pub(crate) fn generation(&self) -> u32 {
        ((self.0 >> INDEX_BITS) & GENERATION_MASK) as u32
    }

    /// Generation that follows `generation`, wrapping within 24 bits.
    pub(crate) fn next_generation(generation: u32) -> u32 {
        ((u64::from(generation) + 1) & GENERATION_MASK) as u32
    }
}
