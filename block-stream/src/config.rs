use {
    crate::error::{Result, StreamError},
    solana_clock::Slot,
    std::time::Duration,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Stop at `end`, or at the tip observed when the stream opened.
    #[default]
    Snapshot,
    /// Follow the tip as it advances. Stops at `end` if one is given.
    Live,
}

/// What a stream does with a slot that has no block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MissingSlotPolicy {
    /// Any missing block terminates the stream with an error.
    #[default]
    Fail,
    /// Slots reported as skipped yield [`SlotBlock::Missing`](crate::SlotBlock::Missing).
    /// An empty fetch result still fails.
    EmitSkipped,
    /// Skipped slots and empty fetch results both yield `Missing`.
    EmitSkippedAndEmpty,
}

#[derive(Debug, Clone)]
pub struct BlockStreamConfig {
    /// Maximum number of slots fetched or buffered ahead of the cursor.
    pub window: usize,
    /// Ceiling on fetches outstanding at once, independent of `window`.
    pub max_in_flight: usize,
    /// Delay between tip queries while a live stream waits for new slots.
    pub poll_interval: Duration,
    pub mode: StreamMode,
    /// Exclusive upper bound.
    pub end: Option<Slot>,
    pub missing_slots: MissingSlotPolicy,
}

impl Default for BlockStreamConfig {
    fn default() -> Self {
        Self {
            window: 16,
            max_in_flight: 32,
            poll_interval: Duration::from_millis(500),
            mode: StreamMode::default(),
            end: None,
            missing_slots: MissingSlotPolicy::default(),
        }
    }
}

impl BlockStreamConfig {
    /// Live traversal, substituting `Missing` for skipped slots.
    pub fn live() -> Self {
        Self {
            mode: StreamMode::Live,
            missing_slots: MissingSlotPolicy::EmitSkipped,
            ..Self::default()
        }
    }

    pub fn with_end(self, end: Slot) -> Self {
        Self {
            end: Some(end),
            ..self
        }
    }

    pub fn with_window(self, window: usize) -> Self {
        Self { window, ..self }
    }

    pub fn validate(&self, start: Slot) -> Result<()> {
        if self.window == 0 {
            return Err(StreamError::InvalidConfig("window must be non-zero".into()));
        }
        if self.max_in_flight == 0 {
            return Err(StreamError::InvalidConfig(
                "max_in_flight must be non-zero".into(),
            ));
        }
        if let Some(end) = self.end {
            if end < start {
                return Err(StreamError::InvalidConfig(format!(
                    "end {end} precedes start {start}"
                )));
            }
        }
        Ok(())
    }

    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            window: 4,
            max_in_flight: 4,
            poll_interval: Duration::from_millis(20),
            ..Self::default()
        }
    }
}
