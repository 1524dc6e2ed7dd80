//! Queue entry state tracking.

use tokio::sync::oneshot;

use crate::error::ConnectionError;

/// Outcome delivered to a request's completion: the paired response,
/// `None` when a later barrier acknowledgement implied success before a
/// direct response arrived, or a terminal error.
pub type Response<M> = Result<Option<M>, ConnectionError>;

/// Sending half of a one-shot request completion.
pub type ResponseTx<M> = oneshot::Sender<Response<M>>;

/// Receiving half of a one-shot request completion.
pub type ResponseRx<M> = oneshot::Receiver<Response<M>>;

/// Create a completion channel for one request.
pub fn response_channel<M>() -> (ResponseTx<M>, ResponseRx<M>) {
    oneshot::channel()
}

/// Slot lifecycle. Transitions only move forward within one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum EntryState {
    /// Slot has never been handed out (or the generation was reset).
    Free = 0,
    /// XID assigned, awaiting the request.
    Reserved = 1,
    /// Request present, visible to the flush loop.
    Committed = 2,
    /// Request written to the channel, awaiting its response.
    Flushed = 3,
    /// Completion delivered.
    Completed = 4,
}

impl EntryState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => EntryState::Free,
            1 => EntryState::Reserved,
            2 => EntryState::Committed,
            3 => EntryState::Flushed,
            4 => EntryState::Completed,
            _ => unreachable!("invalid entry state {value}"),
        }
    }
}

/// The payload of one queue slot: the pending request, its completion,
/// and the barrier flag fixed at reservation time.
#[derive(Debug)]
pub(crate) struct EntryData<M> {
    barrier: bool,
    request: Option<M>,
    completion: Option<ResponseTx<M>>,
}

impl<M> Default for EntryData<M> {
    fn default() -> Self {
        Self {
            barrier: false,
            request: None,
            completion: None,
        }
    }
}

impl<M> EntryData<M> {
    pub(crate) fn set_barrier(&mut self, barrier: bool) {
        self.barrier = barrier;
    }

    pub(crate) fn is_barrier(&self) -> bool {
        self.barrier
    }

    pub(crate) fn commit(&mut self, request: M, completion: Option<ResponseTx<M>>) {
        self.request = Some(request);
        self.completion = completion;
    }

    /// Take the request for writing. The completion stays behind until
    /// the response arrives.
    pub(crate) fn take_request(&mut self) -> Option<M> {
        self.request.take()
    }

    /// Deliver the paired response. A dropped receiver is not an error.
    pub(crate) fn complete(&mut self, response: M) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(Ok(Some(response)));
        }
    }

    /// Deliver implied success: a later barrier acknowledgement closed
    /// this entry before a direct response arrived.
    pub(crate) fn complete_implied(&mut self) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(Ok(None));
        }
    }

    /// Deliver a terminal failure.
    pub(crate) fn fail(&mut self, cause: ConnectionError) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(Err(cause));
        }
    }

    /// Reset for generation reuse.
    pub(crate) fn reset(&mut self) {
        self.barrier = false;
        self.request = None;
        self.completion = None;
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for state in [
            EntryState::Free,
            EntryState::Reserved,
            EntryState::Committed,
            EntryState::Flushed,
            EntryState::Completed,
        ] {
            assert_eq!(EntryState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_complete_delivers_response() {
        let (tx, mut rx) = response_channel();
        let mut data: EntryData<u32> = EntryData::default();
        data.commit(7, Some(tx));

        assert_eq!(data.take_request(), Some(7));
        data.complete(99);
        assert!(matches!(rx.try_recv(), Ok(Ok(Some(99)))));
    }

    #[test]
    fn test_complete_implied_delivers_none() {
        let (tx, mut rx) = response_channel::<u32>();
        let mut data: EntryData<u32> = EntryData::default();
        data.commit(7, Some(tx));

        data.complete_implied();
        assert!(matches!(rx.try_recv(), Ok(Ok(None))));
    }

    #[test]
    fn test_fail_delivers_error() {
        let (tx, mut rx) = response_channel::<u32>();
        let mut data: EntryData<u32> = EntryData::default();
        data.commit(7, Some(tx));

        data.fail(ConnectionError::Disconnected);
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(ConnectionError::Disconnected))
        ));
    }

    #[test]
    fn test_completion_consumed_once() {
        let (tx, mut rx) = response_channel::<u32>();
        let mut data: EntryData<u32> = EntryData::default();
        data.commit(7, Some(tx));

        data.complete(1);
        // Later delivery attempts find no completion left.
        data.complete(2);
        data.fail(ConnectionError::Disconnected);

        assert!(matches!(rx.try_recv(), Ok(Ok(Some(1)))));
    }

    #[test]
    fn test_dropped_receiver_ignored() {
        let (tx, rx) = response_channel::<u32>();
        drop(rx);

        let mut data: EntryData<u32> = EntryData::default();
        data.commit(7, Some(tx));
        data.complete(1);
    }

    #[test]
    fn test_no_completion_is_silent() {
        let mut data: EntryData<u32> = EntryData::default();
        data.commit(7, None);
        assert_eq!(data.take_request(), Some(7));
        data.complete(1);
        data.fail(ConnectionError::Disconnected);
    }

    #[test]
    fn test_reset_clears_payload() {
        let (tx, _rx) = response_channel::<u32>();
        let mut data: EntryData<u32> = EntryData::default();
        data.set_barrier(true);
        data.commit(7, Some(tx));

        data.reset();
        assert!(!data.is_barrier());
        assert_eq!(data.take_request(), None);
    }
}
