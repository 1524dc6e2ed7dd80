//! The caller-facing reservation handle.

use std::sync::Arc;

use crate::channel::FlushSignal;
use crate::entry::ResponseTx;
use crate::frame::Frame;
use crate::queue::OutboundQueue;

/// A handle onto the current queue generation. Cloneable and usable from
/// any thread; callers receive one through the handler's queue-changed
/// notification and must stop using it once a replacement is delivered.
///
/// Callers hold XIDs only, never references into the slot array.
pub struct QueueHandle<M> {
    queue: Arc<OutboundQueue<M>>,
    signal: Arc<FlushSignal>,
}

impl<M> Clone for QueueHandle<M> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            signal: Arc::clone(&self.signal),
        }
    }
}

impl<M: Frame> QueueHandle<M> {
    pub(crate) fn new(queue: Arc<OutboundQueue<M>>, signal: Arc<FlushSignal>) -> Self {
        Self { queue, signal }
    }

    /// First XID of this generation.
    pub fn base_xid(&self) -> u32 {
        self.queue.base_xid()
    }

    /// Reserve a slot, returning its XID, or `None` when the generation
    /// is out of room. A full generation is replaced once it drains;
    /// callers retry after the next queue-changed notification.
    pub fn reserve_entry(&self) -> Option<u32> {
        self.queue.reserve_entry(false)
    }

    /// Commit a reserved entry. The request must carry the reserved XID.
    /// The completion, when present, is eventually invoked exactly once,
    /// unless the channel shut down before the commit landed, in which
    /// case the sender is dropped and the receiving side observes
    /// cancellation.
    pub fn commit_entry(&self, xid: u32, request: M, completion: Option<ResponseTx<M>>) {
        debug_assert_eq!(request.xid(), xid);
        if self.queue.commit_entry(xid, request, completion) {
            self.signal.schedule_flush();
        }
    }
}
