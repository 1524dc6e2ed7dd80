//! The transport contract and cross-thread flush signalling.
//!
//! The queue manager runs on the channel's event-loop thread and talks
//! to the transport through a short-lived context borrow. Producers on
//! other threads cannot touch the event loop; they request a flush
//! through [`FlushSignal`], which coalesces concurrent requests into a
//! single wake of the loop.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::frame::{Frame, OutboundMessage};
use crate::sync::{AtomicBool, AtomicU8, Ordering};

/// Transport operations the queue manager invokes from the event-loop
/// thread.
pub trait ChannelCtx {
    /// The frame type carried by this channel.
    type Message: Frame;

    /// Whether the channel currently accepts writes.
    fn is_writable(&self) -> bool;

    /// Buffer an envelope for transmission. Non-blocking.
    fn write(&mut self, envelope: OutboundMessage<Self::Message>);

    /// Push buffered writes to the wire.
    fn flush(&mut self);

    /// Arm a one-shot timer that invokes the manager's barrier task
    /// after `delay` on the event-loop thread.
    fn schedule_barrier(&mut self, delay: Duration);
}

/// Wakes the event loop so it runs the manager's flush task. Invoked
/// from producer threads; implementations are typically an eventfd
/// write or a loop-internal task submission.
pub trait FlushWaker: Send + Sync {
    fn wake(&self);
}

/// Shared flush-scheduling state. At most one flush task is pending at
/// any time: scheduling CASes the flag 0 to 1 and wakes the loop only on
/// success, and the flush task CASes it back 1 to 0 on exit before
/// re-checking for late commits.
pub struct FlushSignal {
    scheduled: AtomicU8,
    writable: AtomicBool,
    waker: Arc<dyn FlushWaker>,
}

impl FlushSignal {
    pub(crate) fn new(waker: Arc<dyn FlushWaker>) -> Self {
        Self {
            scheduled: AtomicU8::new(0),
            writable: AtomicBool::new(false),
            waker,
        }
    }

    /// Request a flush task. No-op when the channel is unwritable (the
    /// writability callback resumes flushing) or when a task is already
    /// pending.
    pub fn schedule_flush(&self) {
        if !self.writable.load(Ordering::Acquire) {
            trace!("channel not writable, not issuing a flush");
            return;
        }
        if self
            .scheduled
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            trace!("scheduling flush task");
            self.waker.wake();
        } else {
            trace!("flush task already pending");
        }
    }

    /// Mark the pending flush task as finished. Returns false if no task
    /// was marked pending, which indicates a scheduling bug.
    pub(crate) fn finish_flush(&self) -> bool {
        self.scheduled
            .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::Release);
    }

    /// Whether a flush task is currently pending.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Acquire) == 1
    }
}
