use crate::push::delivery::DeliveryOutcome;
use crate::push::payload::PushPayload;
use crate::types::push::Subscription;

/// Delivers one payload to one subscription. Failures are reported through the
/// outcome rather than an error so a batch never aborts on a single device.
pub trait PushSender: Clone + Send + Sync + 'static {
    type Fut<'a>: Future<Output = DeliveryOutcome> + Send + 'a
    where
        Self: 'a;

    fn send<'a>(&'a self, subscription: &'a Subscription, payload: &'a PushPayload)
    -> Self::Fut<'a>;
}
