//! Outbound queue metrics.

use metriken::{Counter, metric};

#[metric(
    name = "outbound_messages_flushed",
    description = "Total messages written to the channel by the flush loop"
)]
pub static MESSAGES_FLUSHED: Counter = Counter::new();

#[metric(
    name = "outbound_barriers_scheduled",
    description = "Barrier requests injected by the count or time policy"
)]
pub static BARRIERS_SCHEDULED: Counter = Counter::new();

#[metric(
    name = "outbound_responses_paired",
    description = "Responses matched to an in-flight request"
)]
pub static RESPONSES_PAIRED: Counter = Counter::new();

#[metric(
    name = "outbound_responses_unmatched",
    description = "Responses that matched no in-flight request and were dropped"
)]
pub static RESPONSES_UNMATCHED: Counter = Counter::new();

#[metric(
    name = "outbound_entries_failed",
    description = "Queue entries failed on channel shutdown"
)]
pub static ENTRIES_FAILED: Counter = Counter::new();

#[metric(
    name = "outbound_queues_allocated",
    description = "Queue generations allocated fresh"
)]
pub static QUEUES_ALLOCATED: Counter = Counter::new();

#[metric(
    name = "outbound_queues_reused",
    description = "Queue generations recycled from the retirement cache"
)]
pub static QUEUES_REUSED: Counter = Counter::new();
