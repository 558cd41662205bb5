use std::sync::atomic::{AtomicBool, Ordering};

/// Line printed by a node once it commits its first block after genesis.
pub const GENESIS_COMMITTED_MARKER: &str = "started committing block";

const PRE_GENESIS_MARKERS: &[&str] = &["ERROR", "WARN", GENESIS_COMMITTED_MARKER];

const POST_GENESIS_MARKERS: &[&str] = &[
    "ERROR",
    "WARN",
    GENESIS_COMMITTED_MARKER,
    "EPOCH",
    "arwen",
    "vm",
    "smart contract",
    "transaction",
];

/// Decides which child-process lines reach the operator.
///
/// Genesis-time system calls print a lot of smart contract chatter, so until
/// the genesis marker shows up only errors, warnings and the marker itself
/// are forwarded. The transition happens once and is never undone.
#[derive(Debug, Default)]
pub struct LogPhase {
    genesis_committed: AtomicBool,
}

impl LogPhase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_genesis_committed(&self) {
        self.genesis_committed.store(true, Ordering::Release);
    }

    pub fn is_genesis_committed(&self) -> bool {
        self.genesis_committed.load(Ordering::Acquire)
    }

    /// Classifies `line` against the markers of the current phase.
    pub fn is_interesting(&self, line: &str) -> bool {
        let markers = if self.is_genesis_committed() {
            POST_GENESIS_MARKERS
        } else {
            PRE_GENESIS_MARKERS
        };
        markers.iter().any(|marker| line.contains(marker))
    }

    /// Advances the phase if `line` is the genesis marker, then classifies it.
    pub fn observe(&self, line: &str) -> bool {
        if line.contains(GENESIS_COMMITTED_MARKER) {
            self.mark_genesis_committed();
        }
        self.is_interesting(line)
    }
}
