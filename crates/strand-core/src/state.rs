//! Strand lifecycle state and container-membership tags

use core::fmt;

/// Lifecycle state of a strand
///
/// Transitions are driven entirely by the scheduler:
/// Runnable -> Running on dispatch, Running -> Runnable on yield,
/// Running -> Sleeping on park, Sleeping -> Runnable on wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StrandState {
    /// Ready to run, waiting in a run queue
    Runnable = 0,

    /// Currently executing on an execution context
    Running = 1,

    /// Parked in a wait set until woken
    Sleeping = 2,
}

impl StrandState {
    /// Check if this state allows the strand to be dispatched
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, StrandState::Runnable)
    }
}

impl From<u8> for StrandState {
    fn from(v: u8) -> Self {
        match v {
            0 => StrandState::Runnable,
            1 => StrandState::Running,
            _ => StrandState::Sleeping,
        }
    }
}

impl From<StrandState> for u8 {
    fn from(s: StrandState) -> u8 {
        s as u8
    }
}

impl fmt::Display for StrandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrandState::Runnable => write!(f, "RUNNABLE"),
            StrandState::Running => write!(f, "RUNNING"),
            StrandState::Sleeping => write!(f, "SLEEPING"),
        }
    }
}

/// Which container owns a strand record right now
///
/// Exactly one container owns a strand at any instant: a run queue, a wait
/// set, the execution context currently running it, or the free list.
/// The variants encode into a single word so ownership transfers can be a
/// compare-and-swap; a failed transfer means the record was found where it
/// must not be, which is a fatal programming error.
///
/// Wait-set identity is the wait set's address. Canonical user-space
/// addresses fit in the 56 bits left after the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// On the record free list (or never allocated)
    Free,

    /// Queued in a run queue
    RunQueue,

    /// Parked in the wait set with the given key
    WaitSet(u64),

    /// Owned by the execution context currently running it
    Running,
}

const TAG_FREE: u64 = 0;
const TAG_RUN_QUEUE: u64 = 1;
const TAG_WAIT_SET: u64 = 2;
const TAG_RUNNING: u64 = 3;

impl Membership {
    /// Encode into a single word (tag in the low 8 bits)
    #[inline]
    pub const fn encode(self) -> u64 {
        match self {
            Membership::Free => TAG_FREE,
            Membership::RunQueue => TAG_RUN_QUEUE,
            Membership::WaitSet(key) => TAG_WAIT_SET | (key << 8),
            Membership::Running => TAG_RUNNING,
        }
    }

    /// Decode from a word produced by `encode`
    #[inline]
    pub const fn decode(word: u64) -> Membership {
        match word & 0xFF {
            TAG_FREE => Membership::Free,
            TAG_RUN_QUEUE => Membership::RunQueue,
            TAG_WAIT_SET => Membership::WaitSet(word >> 8),
            _ => Membership::Running,
        }
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Membership::Free => write!(f, "free"),
            Membership::RunQueue => write!(f, "run-queue"),
            Membership::WaitSet(key) => write!(f, "wait-set({:#x})", key),
            Membership::Running => write!(f, "running"),
        }
    }
}
