//! The ordered prefetch stream.
//!
//! Each pull runs the same sequence: wait for the tip to move (live mode
//! only), top up the prefetch window, check the upper bound, then take the
//! entry for the cursor's slot out of the cache, awaiting it if it is still
//! in flight. Fetches complete in any order; the cache keyed by slot is what
//! puts them back in sequence. A fetch failure stays in its cache entry and
//! only surfaces once the cursor reaches that slot.

use {
    crate::{
        config::{BlockStreamConfig, MissingSlotPolicy, StreamMode},
        error::{FetchError, Result, StreamError},
        fetcher::BlockFetcher,
    },
    futures::Stream,
    log::*,
    solana_clock::Slot,
    std::{collections::BTreeMap, sync::Arc},
    tokio::{sync::Notify, task::JoinHandle, time},
};

/// One item of a [`BlockStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotBlock<B> {
    Present { slot: Slot, block: B },
    /// The slot has no block and the stream's [`MissingSlotPolicy`] allows
    /// it to be passed over.
    Missing { slot: Slot },
}

impl<B> SlotBlock<B> {
    pub fn slot(&self) -> Slot {
        match self {
            Self::Present { slot, .. } | Self::Missing { slot } => *slot,
        }
    }

    pub fn block(&self) -> Option<&B> {
        match self {
            Self::Present { block, .. } => Some(block),
            Self::Missing { .. } => None,
        }
    }

    pub fn into_block(self) -> Option<B> {
        match self {
            Self::Present { block, .. } => Some(block),
            Self::Missing { .. } => None,
        }
    }
}

type Fetch<B> = JoinHandle<std::result::Result<Option<B>, FetchError>>;

/// Forward-only sequence of blocks for consecutive slots.
///
/// Dropping the stream abandons its outstanding fetches; they run to
/// completion in the background and their results are discarded.
#[derive(Debug)]
pub struct BlockStream<F: BlockFetcher> {
    fetcher: Arc<F>,
    config: BlockStreamConfig,
    cursor: Slot,
    /// Last observed tip, exclusive.
    tip: Slot,
    /// Fixed exclusive bound: explicit `end`, or the tip at open in snapshot mode.
    end: Option<Slot>,
    cache: BTreeMap<Slot, Fetch<F::Block>>,
    completed: Arc<Notify>,
    done: bool,
}

impl<F: BlockFetcher> BlockStream<F> {
    /// Opens a stream starting at `start`.
    ///
    /// Queries the tip once unless a snapshot stream was given an explicit
    /// `end`. A snapshot stream without `end` stops at that tip.
    pub async fn open(fetcher: Arc<F>, start: Slot, config: BlockStreamConfig) -> Result<Self> {
        config.validate(start)?;
        let tip = match (config.mode, config.end) {
            (StreamMode::Snapshot, Some(end)) => end,
            _ => fetcher.get_tip().await.map_err(StreamError::Tip)?,
        };
        let end = match config.mode {
            StreamMode::Snapshot => Some(config.end.unwrap_or(tip)),
            StreamMode::Live => config.end,
        };
        info!(
            "block stream from {start}: {:?}, tip {tip}, end {}",
            config.mode,
            end.map_or_else(|| "unbounded".to_string(), |end| end.to_string()),
        );
        Ok(Self {
            fetcher,
            config,
            cursor: start,
            tip,
            end,
            cache: BTreeMap::new(),
            completed: Arc::new(Notify::new()),
            done: false,
        })
    }

    /// Next slot to be yielded.
    pub fn cursor(&self) -> Slot {
        self.cursor
    }

    /// Current exclusive upper bound: the fixed end, or in live mode the
    /// last observed tip capped by the end.
    pub fn upper_bound(&self) -> Slot {
        match (self.config.mode, self.end) {
            (StreamMode::Snapshot, Some(end)) => end,
            (StreamMode::Snapshot, None) => self.tip,
            (StreamMode::Live, Some(end)) => self.tip.min(end),
            (StreamMode::Live, None) => self.tip,
        }
    }

    /// Entries in the prefetch cache, in flight or completed.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn in_flight(&self) -> usize {
        self.cache
            .values()
            .filter(|fetch| !fetch.is_finished())
            .count()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Yields the block for the cursor's slot and advances the cursor.
    ///
    /// Returns `None` once the upper bound is reached. The first error ends
    /// the stream; later calls return `None`.
    pub async fn next(&mut self) -> Option<Result<SlotBlock<F::Block>>> {
        if self.done {
            return None;
        }
        match self.advance().await {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finish();
                None
            }
            Err(err) => {
                self.finish();
                Some(Err(err))
            }
        }
    }

    /// Adapts the stream to [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<SlotBlock<F::Block>>> {
        futures::stream::unfold(self, |mut stream| async move {
            let item = stream.next().await?;
            Some((item, stream))
        })
    }

    fn finish(&mut self) {
        self.done = true;
        self.cache.clear();
    }

    async fn advance(&mut self) -> Result<Option<SlotBlock<F::Block>>> {
        if self.config.mode == StreamMode::Live {
            self.wait_for_tip().await?;
        }
        self.replenish();
        if self.cursor >= self.upper_bound() {
            info!("block stream reached {}", self.upper_bound());
            return Ok(None);
        }

        let slot = self.cursor;
        let outcome = self.take(slot).await?;
        self.cursor = slot.saturating_add(1);

        match (outcome, self.config.missing_slots) {
            (Ok(Some(block)), _) => Ok(Some(SlotBlock::Present { slot, block })),
            (Ok(None), MissingSlotPolicy::EmitSkippedAndEmpty) => {
                warn!("slot {slot}: empty block, passing over");
                Ok(Some(SlotBlock::Missing { slot }))
            }
            (Ok(None), _) => Err(StreamError::BlockUnavailable(slot)),
            (
                Err(FetchError::Skipped { .. }),
                MissingSlotPolicy::EmitSkipped | MissingSlotPolicy::EmitSkippedAndEmpty,
            ) => {
                warn!("slot {slot}: skipped, passing over");
                Ok(Some(SlotBlock::Missing { slot }))
            }
            (Err(source), _) => Err(StreamError::Fetch { slot, source }),
        }
    }

    /// Blocks while the cursor has caught up with the tip.
    async fn wait_for_tip(&mut self) -> Result<()> {
        while self.cursor >= self.tip {
            if self.end.is_some_and(|end| self.cursor >= end) {
                return Ok(());
            }
            let tip = self.fetcher.get_tip().await.map_err(StreamError::Tip)?;
            trace!("polled tip {tip}, cursor {}", self.cursor);
            if tip > self.tip {
                self.tip = tip;
            } else {
                time::sleep(self.config.poll_interval).await;
            }
        }
        Ok(())
    }

    /// Launches fetches for uncached slots in `[cursor, cursor + window)`
    /// below the upper bound, up to the in-flight ceiling.
    fn replenish(&mut self) {
        let bound = self.upper_bound();
        let window_end = self.cursor.saturating_add(self.config.window as u64);
        let mut in_flight = self.in_flight();
        let mut slot = self.cursor;
        while slot < bound.min(window_end) {
            if !self.cache.contains_key(&slot) {
                if in_flight >= self.config.max_in_flight {
                    break;
                }
                trace!("prefetching slot {slot}");
                let fetcher = self.fetcher.clone();
                let completed = self.completed.clone();
                let fetch = tokio::spawn(async move {
                    let outcome = fetcher.fetch_block(slot).await;
                    completed.notify_one();
                    outcome
                });
                self.cache.insert(slot, fetch);
                in_flight = in_flight.saturating_add(1);
            }
            slot = slot.saturating_add(1);
        }
    }

    /// Removes and awaits the cache entry for `slot`, refilling the window
    /// whenever another fetch completes in the meantime.
    async fn take(&mut self, slot: Slot) -> Result<std::result::Result<Option<F::Block>, FetchError>> {
        loop {
            let completed = self.completed.clone();
            let Some(fetch) = self.cache.get_mut(&slot) else {
                completed.notified().await;
                self.replenish();
                continue;
            };
            tokio::select! {
                joined = fetch => {
                    self.cache.remove(&slot);
                    return joined.map_err(|err| StreamError::TaskFailed {
                        slot,
                        reason: err.to_string(),
                    });
                }
                _ = completed.notified() => self.replenish(),
            }
        }
    }
}
