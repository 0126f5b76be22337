use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("genchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("genchat.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("genchat.client.request_duration_seconds");
pub(crate) static CLIENT_MALFORMED_RESPONSES: Counter =
    Counter::new("genchat.client.malformed_responses");

pub(crate) static DISPATCH_BUSY: Counter = Counter::new("genchat.dispatch.busy");
pub(crate) static ATTACHMENTS_REJECTED: Counter = Counter::new("genchat.attachment.rejected");

pub(crate) static REVEAL_STARTED: Counter = Counter::new("genchat.reveal.started");
pub(crate) static REVEAL_CANCELLED: Counter = Counter::new("genchat.reveal.cancelled");
pub(crate) static REVEAL_COMPLETED: Counter = Counter::new("genchat.reveal.completed");
pub(crate) static REVEAL_CHARACTERS: Counter = Counter::new("genchat.reveal.characters");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);
    collector.register_counter(&CLIENT_MALFORMED_RESPONSES);

    collector.register_counter(&DISPATCH_BUSY);
    collector.register_counter(&ATTACHMENTS_REJECTED);

    collector.register_counter(&REVEAL_STARTED);
    collector.register_counter(&REVEAL_CANCELLED);
    collector.register_counter(&REVEAL_COMPLETED);
    collector.register_counter(&REVEAL_CHARACTERS);
}
