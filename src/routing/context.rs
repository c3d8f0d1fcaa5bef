//! Per-request routing context.

use parking_lot::Mutex;
use url::Url;

/// Carries the endpoint override for one in-flight request.
///
/// One context travels with each request from the affinity hook to endpoint
/// resolution. It is an explicit object rather than a thread-local because
/// async pipelines may hand a request between executor threads.
#[derive(Debug, Default)]
pub struct RequestContext {
    override_uri: Mutex<Option<Url>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the endpoint override for this request.
    pub fn set_override(&self, uri: Url) {
        *self.override_uri.lock() = Some(uri);
    }

    /// Removes and returns the override, leaving the slot empty.
    pub fn take_override(&self) -> Option<Url> {
        self.override_uri.lock().take()
    }

    /// Reads the override without consuming it.
    pub fn override_uri(&self) -> Option<Url> {
        self.override_uri.lock().clone()
    }

    /// Empties the slot.
    pub fn clear(&self) {
        *self.override_uri.lock() = None;
    }
}
