//! Shared harness for the integration suites: a scripted channel that
//! records writes and timer arms, a wake-counting flush waker, and a
//! handler that captures the current reservation handle.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use openflow_connection::{
    ChannelCtx, Config, ConnectionHandler, FlushWaker, OutboundMessage, OutboundQueueManager,
    QueueHandle, ResponseRx, response_channel,
};
use protocol_openflow::{Message, MsgType};

pub struct RecordingChannel {
    pub writable: bool,
    pub writes: Vec<OutboundMessage<Message>>,
    pub flushes: usize,
    pub timers: Vec<Duration>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self {
            writable: true,
            writes: Vec::new(),
            flushes: 0,
            timers: Vec::new(),
        }
    }

    pub fn written_xids(&self) -> Vec<u32> {
        self.writes.iter().map(|w| w.message().xid()).collect()
    }

    pub fn written_types(&self) -> Vec<MsgType> {
        self.writes.iter().map(|w| w.message().msg_type()).collect()
    }
}

impl ChannelCtx for RecordingChannel {
    type Message = Message;

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn write(&mut self, envelope: OutboundMessage<Message>) {
        self.writes.push(envelope);
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }

    fn schedule_barrier(&mut self, delay: Duration) {
        self.timers.push(delay);
    }
}

pub struct RecordingWaker {
    wakes: AtomicUsize,
}

impl RecordingWaker {
    pub fn pending(&self) -> usize {
        self.wakes.load(Ordering::Acquire)
    }

    fn take(&self) -> usize {
        self.wakes.swap(0, Ordering::AcqRel)
    }
}

impl FlushWaker for RecordingWaker {
    fn wake(&self) {
        self.wakes.fetch_add(1, Ordering::AcqRel);
    }
}

pub struct TestHandler {
    current: Arc<Mutex<Option<QueueHandle<Message>>>>,
    changes: Arc<AtomicUsize>,
}

impl ConnectionHandler for TestHandler {
    type Message = Message;

    fn create_barrier_request(&self, xid: u32) -> Message {
        Message::barrier_request(xid)
    }

    fn on_queue_changed(&self, queue: Option<QueueHandle<Message>>) {
        self.changes.fetch_add(1, Ordering::AcqRel);
        *self.current.lock().unwrap() = queue;
    }
}

pub struct Harness {
    pub manager: OutboundQueueManager<TestHandler>,
    pub channel: RecordingChannel,
    pub waker: Arc<RecordingWaker>,
    pub current: Arc<Mutex<Option<QueueHandle<Message>>>>,
    pub changes: Arc<AtomicUsize>,
}

impl Harness {
    /// Build a manager over an active, writable scripted channel.
    pub fn new(config: Config) -> Self {
        let current = Arc::new(Mutex::new(None));
        let changes = Arc::new(AtomicUsize::new(0));
        let handler = TestHandler {
            current: current.clone(),
            changes: changes.clone(),
        };
        let waker = Arc::new(RecordingWaker {
            wakes: AtomicUsize::new(0),
        });
        let manager = OutboundQueueManager::new(handler, waker.clone(), config);

        let mut harness = Self {
            manager,
            channel: RecordingChannel::new(),
            waker,
            current,
            changes,
        };
        harness.manager.channel_active(&mut harness.channel);
        harness
    }

    /// The reservation handle most recently delivered to the handler.
    pub fn handle(&self) -> QueueHandle<Message> {
        self.current
            .lock()
            .unwrap()
            .clone()
            .expect("no current queue")
    }

    /// Reserve and commit an echo request, returning its XID and the
    /// completion receiver.
    pub fn commit(&self) -> (u32, ResponseRx<Message>) {
        let handle = self.handle();
        let xid = handle.reserve_entry().expect("queue full");
        let (tx, rx) = response_channel();
        handle.commit_entry(xid, Message::echo_request(xid, Bytes::new()), Some(tx));
        (xid, rx)
    }

    /// Run the flush task for every pending wake until the loop goes
    /// quiet, mirroring the event loop draining its task queue.
    pub fn pump(&mut self) {
        while self.waker.take() > 0 {
            self.manager.flush(&mut self.channel);
        }
    }

    /// Run exactly one flush task.
    pub fn flush_once(&mut self) {
        self.waker.take();
        self.manager.flush(&mut self.channel);
    }

    /// Deliver an echo reply for `xid`.
    pub fn respond(&mut self, xid: u32) -> bool {
        self.manager
            .on_message(Message::echo_reply(xid, Bytes::new()))
    }

    /// Deliver a barrier reply for `xid`.
    pub fn respond_barrier(&mut self, xid: u32) -> bool {
        self.manager.on_message(Message::barrier_reply(xid))
    }
}
