//! Outbound queue management for one channel.
//!
//! The manager owns the active queue generations, allocates disjoint
//! XID ranges, drains committed entries to the transport under a work
//! budget, injects barriers under the count and time policies, pairs
//! responses back to their requests, and fails everything outstanding
//! when the channel goes away.
//!
//! All methods run on the channel's event-loop thread; the only
//! cross-thread surface is the reservation handle and the flush signal.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::channel::{ChannelCtx, FlushSignal, FlushWaker};
use crate::config::Config;
use crate::error::ConnectionError;
use crate::frame::{Frame, OutboundMessage};
use crate::handle::QueueHandle;
use crate::metrics::{
    BARRIERS_SCHEDULED, ENTRIES_FAILED, MESSAGES_FLUSHED, QUEUES_ALLOCATED, QUEUES_REUSED,
    RESPONSES_PAIRED, RESPONSES_UNMATCHED,
};
use crate::queue::OutboundQueue;

/// Callbacks the caller supplies at manager construction.
pub trait ConnectionHandler {
    /// The frame type flowing through this channel.
    type Message: Frame;

    /// Construct a barrier request carrying the given XID.
    fn create_barrier_request(&self, xid: u32) -> Self::Message;

    /// The reservation target changed. `None` means the channel shut
    /// down and no further reservations are possible.
    fn on_queue_changed(&self, queue: Option<QueueHandle<Self::Message>>);
}

/// Outbound request/response queue manager for a single channel.
pub struct OutboundQueueManager<H: ConnectionHandler> {
    handler: H,
    queue_size: u32,
    capacity: u32,
    config: Config,
    active_queues: VecDeque<Arc<OutboundQueue<H::Message>>>,
    queue_cache: VecDeque<Arc<OutboundQueue<H::Message>>>,
    /// Alias of the tail of `active_queues`; `None` after shutdown.
    current: Option<Arc<OutboundQueue<H::Message>>>,
    last_xid: u32,
    last_barrier_at: Instant,
    non_barrier_messages: u32,
    signal: Arc<FlushSignal>,
}

impl<H: ConnectionHandler> OutboundQueueManager<H> {
    /// Create a manager for a newly active channel. Allocates the first
    /// generation and hands its reservation handle to the handler.
    pub fn new(handler: H, waker: Arc<dyn FlushWaker>, config: Config) -> Self {
        assert!(config.queue_size > 0);
        assert!(!config.max_barrier.is_zero());
        assert!(config.worktime_recheck_interval > 0);

        let mut manager = Self {
            handler,
            queue_size: config.queue_size,
            capacity: config.queue_size + 1,
            active_queues: VecDeque::new(),
            queue_cache: VecDeque::with_capacity(config.queue_cache_capacity),
            current: None,
            last_xid: 0,
            last_barrier_at: Instant::now(),
            non_barrier_messages: 0,
            signal: Arc::new(FlushSignal::new(waker)),
            config,
        };

        debug!(
            queue_size = manager.queue_size,
            "queue manager instantiated"
        );
        manager.create_queue();
        manager
    }

    /// The handler this manager was constructed with.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Number of generations with outstanding entries.
    pub fn active_queue_count(&self) -> usize {
        self.active_queues.len()
    }

    /// Number of retired generations held for reuse.
    pub fn cached_queue_count(&self) -> usize {
        self.queue_cache.len()
    }

    fn create_queue(&mut self) {
        let base_xid = self.last_xid;
        self.last_xid = self.last_xid.wrapping_add(self.capacity);

        let queue = match self.queue_cache.pop_front() {
            Some(cached) => {
                cached.reuse(base_xid);
                QUEUES_REUSED.increment();
                debug!(base_xid, "reusing cached queue");
                cached
            }
            None => {
                QUEUES_ALLOCATED.increment();
                debug!(base_xid, "allocated new queue");
                Arc::new(OutboundQueue::new(base_xid, self.capacity))
            }
        };

        self.active_queues.push_back(Arc::clone(&queue));
        let handle = QueueHandle::new(Arc::clone(&queue), Arc::clone(&self.signal));
        self.current = Some(queue);
        self.handler.on_queue_changed(Some(handle));
    }

    fn retire_queue(&mut self, queue: Arc<OutboundQueue<H::Message>>) {
        if self.queue_cache.len() < self.config.queue_cache_capacity {
            debug!(queue = ?queue, "saving queue for later reuse");
            self.queue_cache.push_back(queue);
        } else {
            debug!(queue = ?queue, "queue thrown away");
        }
    }

    /// Pull one entry off the current queue, rolling over to a fresh
    /// generation when the current one has emitted its last slot, and
    /// apply barrier bookkeeping to the emitted message.
    ///
    /// `now` marks barrier observations; the flush start time is close
    /// enough and avoids a clock read per message.
    fn flush_one(&mut self, now: Instant) -> Option<H::Message> {
        let current = Arc::clone(self.current.as_ref()?);
        let message = current.flush_entry();
        if current.is_flushed() {
            debug!(queue = ?current, "queue fully flushed");
            self.create_queue();
        }

        let message = message?;
        if message.is_barrier() {
            debug!("barrier message seen, resetting counters");
            self.non_barrier_messages = 0;
            self.last_barrier_at = now;
        } else {
            self.non_barrier_messages += 1;
            if self.non_barrier_messages >= self.queue_size {
                debug!(
                    count = self.non_barrier_messages,
                    "scheduling barrier request after non-barrier messages"
                );
                self.schedule_barrier_message();
            }
        }

        Some(message)
    }

    /// Reserve and commit a barrier into the current queue.
    fn schedule_barrier_message(&mut self) {
        let Some(current) = self.current.as_ref().map(Arc::clone) else {
            return;
        };
        let Some(xid) = current.reserve_entry(true) else {
            warn!(queue = ?current, "no room to schedule a barrier");
            return;
        };

        let request = self.handler.create_barrier_request(xid);
        debug_assert!(request.is_barrier());
        current.commit_entry(xid, request, None);
        BARRIERS_SCHEDULED.increment();
        debug!(xid, "barrier scheduled");

        // The scheduling path can see ahead of the flush path, which may
        // be lagging behind on messages. Resetting here keeps the flush
        // path from issuing a second barrier right away. The barrier
        // timestamp is not touched; it reflects when a barrier actually
        // went out.
        self.non_barrier_messages = 0;
        self.signal.schedule_flush();
    }

    /// Perform a single flush iteration. Runs as the event-loop task the
    /// flush signal schedules.
    pub fn flush<C>(&mut self, ctx: &mut C)
    where
        C: ChannelCtx<Message = H::Message>,
    {
        let start = Instant::now();
        let deadline = start + self.config.max_work_time;

        trace!("dequeuing messages to channel");

        let mut messages: u32 = 0;
        loop {
            if !ctx.is_writable() {
                trace!("channel is no longer writable");
                break;
            }

            let Some(message) = self.flush_one(start) else {
                trace!("the queue is completely drained");
                break;
            };

            let envelope = match self.config.remote {
                Some(addr) => OutboundMessage::Datagram(message, addr),
                None => OutboundMessage::Stream(message),
            };
            ctx.write(envelope);

            // Checking the clock after every message costs more than it
            // saves; re-check the budget periodically.
            messages += 1;
            if messages % self.config.worktime_recheck_interval == 0 && Instant::now() >= deadline {
                trace!("exceeded allotted work time");
                break;
            }
        }

        if messages > 0 {
            MESSAGES_FLUSHED.add(u64::from(messages));
            debug!(messages, "flushing messages to channel");
            ctx.flush();
        }

        // Mark the task finished, then re-check for commits that arrived
        // while we were on the exit path and saw the task still pending.
        if !self.signal.finish_flush() {
            warn!("flusher found unscheduled");
        }
        self.conditional_flush();
    }

    /// Attempt to pair an incoming message to an in-flight request.
    /// Returns whether the message matched one.
    pub fn on_message(&mut self, mut response: H::Message) -> bool {
        trace!(xid = response.xid(), "attempting to pair message");

        let mut matched = None;
        for (index, queue) in self.active_queues.iter().enumerate() {
            match queue.pair_request(response) {
                Ok(barrier) => {
                    debug!(queue = ?queue, "queue accepted response");
                    matched = Some((index, barrier));
                    break;
                }
                Err(unconsumed) => response = unconsumed,
            }
        }

        let Some((mut index, barrier)) = matched else {
            debug!("failed to find completion for message");
            RESPONSES_UNMATCHED.increment();
            return false;
        };
        RESPONSES_PAIRED.increment();

        // A barrier acknowledgement implies every generation older than
        // the one it matched is fully processed by the switch.
        if barrier && self.active_queues.len() > 1 {
            for _ in 0..index {
                let queue = self.active_queues.pop_front().unwrap();
                debug!(queue = ?queue, "queue implied finished");
                queue.complete_all();
                self.retire_queue(queue);
            }
            index = 0;
        }

        if self.active_queues[index].is_finished() {
            let queue = self.active_queues.remove(index).unwrap();
            debug!(queue = ?queue, "queue finished");
            self.retire_queue(queue);
        }

        true
    }

    /// Periodic barrier check. Runs as the one-shot task armed through
    /// the channel context.
    pub fn barrier<C>(&mut self, ctx: &mut C)
    where
        C: ChannelCtx<Message = H::Message>,
    {
        debug!("barrier timer expired");
        if self.current.is_none() {
            debug!("channel shut down, not processing barrier");
            return;
        }

        let now = Instant::now();
        if now.duration_since(self.last_barrier_at) >= self.config.max_barrier {
            if self.non_barrier_messages == 0 {
                debug!("no messages written since last barrier, not issuing one");
            } else {
                self.schedule_barrier_message();
            }
        }

        self.schedule_barrier_timer(ctx, now);
    }

    fn schedule_barrier_timer<C>(&mut self, ctx: &mut C, now: Instant)
    where
        C: ChannelCtx<Message = H::Message>,
    {
        let mut next = self.last_barrier_at + self.config.max_barrier;
        if next < now {
            debug!("attempted to schedule barrier in the past, reset maximum");
            next = now + self.config.max_barrier;
        }

        let delay = next.duration_since(now);
        trace!(?delay, "scheduling barrier timer");
        ctx.schedule_barrier(delay);
    }

    /// Schedule a flush if the current queue has committed entries.
    fn conditional_flush(&mut self) {
        match &self.current {
            Some(queue) if !queue.is_empty() => self.signal.schedule_flush(),
            _ => trace!("queue is empty, no flush needed"),
        }
    }

    /// The channel became active: mirror writability, arm the barrier
    /// timer, and start draining anything committed before activation.
    pub fn channel_active<C>(&mut self, ctx: &mut C)
    where
        C: ChannelCtx<Message = H::Message>,
    {
        self.signal.set_writable(ctx.is_writable());
        self.schedule_barrier_timer(ctx, Instant::now());
        self.conditional_flush();
    }

    /// The channel's writability flipped; it may accept writes again.
    pub fn channel_writability_changed<C>(&mut self, ctx: &mut C)
    where
        C: ChannelCtx<Message = H::Message>,
    {
        self.signal.set_writable(ctx.is_writable());
        self.conditional_flush();
    }

    /// The channel went away. Fails every outstanding entry and discards
    /// all generations; nothing is retired to the cache.
    pub fn channel_inactive(&mut self) {
        debug!("channel shutdown, flushing queue");
        self.signal.set_writable(false);
        self.current = None;
        self.handler.on_queue_changed(None);

        let mut entries: u64 = 0;
        for queue in self.active_queues.drain(..) {
            entries += u64::from(queue.fail_all(|| ConnectionError::Disconnected));
        }
        ENTRIES_FAILED.add(entries);
        debug!(entries, "failed queue entries");
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Eq)]
    struct TestFrame {
        xid: u32,
        barrier: bool,
    }

    impl Frame for TestFrame {
        fn xid(&self) -> u32 {
            self.xid
        }

        fn is_barrier(&self) -> bool {
            self.barrier
        }
    }

    struct TestHandler {
        current: Arc<Mutex<Option<QueueHandle<TestFrame>>>>,
        changes: Arc<AtomicUsize>,
    }

    impl ConnectionHandler for TestHandler {
        type Message = TestFrame;

        fn create_barrier_request(&self, xid: u32) -> TestFrame {
            TestFrame { xid, barrier: true }
        }

        fn on_queue_changed(&self, queue: Option<QueueHandle<TestFrame>>) {
            self.changes.fetch_add(1, Ordering::AcqRel);
            *self.current.lock().unwrap() = queue;
        }
    }

    struct NoopWaker;

    impl FlushWaker for NoopWaker {
        fn wake(&self) {}
    }

    struct TestCtx {
        writable: bool,
        writes: Vec<OutboundMessage<TestFrame>>,
        flushes: usize,
        timers: Vec<Duration>,
    }

    impl TestCtx {
        fn new() -> Self {
            Self {
                writable: true,
                writes: Vec::new(),
                flushes: 0,
                timers: Vec::new(),
            }
        }
    }

    impl ChannelCtx for TestCtx {
        type Message = TestFrame;

        fn is_writable(&self) -> bool {
            self.writable
        }

        fn write(&mut self, envelope: OutboundMessage<TestFrame>) {
            self.writes.push(envelope);
        }

        fn flush(&mut self) {
            self.flushes += 1;
        }

        fn schedule_barrier(&mut self, delay: Duration) {
            self.timers.push(delay);
        }
    }

    fn manager(
        config: Config,
    ) -> (
        OutboundQueueManager<TestHandler>,
        Arc<Mutex<Option<QueueHandle<TestFrame>>>>,
        Arc<AtomicUsize>,
    ) {
        let current = Arc::new(Mutex::new(None));
        let changes = Arc::new(AtomicUsize::new(0));
        let handler = TestHandler {
            current: current.clone(),
            changes: changes.clone(),
        };
        let mgr = OutboundQueueManager::new(handler, Arc::new(NoopWaker), config);
        (mgr, current, changes)
    }

    fn handle(current: &Arc<Mutex<Option<QueueHandle<TestFrame>>>>) -> QueueHandle<TestFrame> {
        current.lock().unwrap().clone().unwrap()
    }

    fn commit(handle: &QueueHandle<TestFrame>) -> u32 {
        let xid = handle.reserve_entry().unwrap();
        handle.commit_entry(
            xid,
            TestFrame {
                xid,
                barrier: false,
            },
            None,
        );
        xid
    }

    #[test]
    fn test_construction_hands_out_first_queue() {
        let (mgr, current, changes) = manager(Config::default());
        assert_eq!(changes.load(Ordering::Acquire), 1);
        assert_eq!(handle(&current).base_xid(), 0);
        assert_eq!(mgr.active_queue_count(), 1);
    }

    #[test]
    fn test_generation_rollover_disjoint_xids() {
        let config = Config {
            queue_size: 2,
            ..Config::default()
        };
        let (mut mgr, current, changes) = manager(config);
        let mut ctx = TestCtx::new();
        mgr.channel_active(&mut ctx);

        // Fill the first generation: two requests plus its count barrier.
        let h = handle(&current);
        commit(&h);
        commit(&h);
        mgr.flush(&mut ctx);

        // The count-triggered barrier filled the trailing slot; after the
        // flush the generation rolled over and a new handle went out.
        assert_eq!(changes.load(Ordering::Acquire), 2);
        let h2 = handle(&current);
        assert_eq!(h2.base_xid(), 3);
        assert_eq!(commit(&h2), 3);
    }

    #[test]
    fn test_retire_cache_bounded() {
        let config = Config {
            queue_size: 1,
            queue_cache_capacity: 2,
            max_work_time: Duration::from_secs(1),
            ..Config::default()
        };
        let (mut mgr, current, _) = manager(config);
        let mut ctx = TestCtx::new();
        mgr.channel_active(&mut ctx);

        // Cycle several generations to completion.
        for _ in 0..4 {
            let h = handle(&current);
            let xid = commit(&h);
            mgr.flush(&mut ctx);
            // Each generation carries its count barrier behind the request.
            assert!(mgr.on_message(TestFrame {
                xid,
                barrier: false,
            }));
            assert!(mgr.on_message(TestFrame {
                xid: xid + 1,
                barrier: true,
            }));
        }

        assert_eq!(mgr.active_queue_count(), 1);
        assert_eq!(mgr.cached_queue_count(), 2);
    }

    #[test]
    fn test_unmatched_response_dropped() {
        let (mut mgr, _, _) = manager(Config::default());
        assert!(!mgr.on_message(TestFrame {
            xid: 555,
            barrier: false,
        }));
    }

    #[test]
    fn test_barrier_timer_rearmed() {
        let config = Config {
            max_barrier: Duration::from_millis(5),
            ..Config::default()
        };
        let (mut mgr, _, _) = manager(config);
        let mut ctx = TestCtx::new();
        mgr.channel_active(&mut ctx);
        assert_eq!(ctx.timers.len(), 1);

        mgr.barrier(&mut ctx);
        assert_eq!(ctx.timers.len(), 2);

        // After shutdown the timer is not re-armed.
        mgr.channel_inactive();
        mgr.barrier(&mut ctx);
        assert_eq!(ctx.timers.len(), 2);
    }
}
