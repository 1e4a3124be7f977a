//! Lifecycle notifications fanned out by a call.

use callprobe_core::{CallFailure, CallId, Utterance};

/// Receives notifications about a call's progress.
///
/// Every method has an empty default so observers implement only what they
/// care about. Notifications are delivered on the driver thread, in order.
pub trait CallObserver: Send + Sync {
    /// The call to `uri` was placed.
    fn call_placed(&self, _call: CallId, _uri: &str) {}

    /// The driver received an utterance.
    fn utterance_heard(&self, _call: CallId, _utterance: &Utterance) {}

    /// The driver sent spoken input.
    fn input_sent(&self, _call: CallId, _text: &str) {}

    /// The driver entered DTMF digits.
    fn digits_entered(&self, _call: CallId, _digits: &str) {}

    /// The call was hung up.
    fn hung_up(&self, _call: CallId) {}

    /// An operation failed; called before the failure is returned.
    fn failed(&self, _call: CallId, _failure: &CallFailure) {}
}
