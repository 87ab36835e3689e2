//! Routing of intercepted requests by origin.

use url::{Origin, Url};

/// Where a request is headed relative to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Same origin as the worker: served cache-first.
    Internal,
    /// Any other origin (CDNs, font hosts): served network-first.
    External,
}

impl Route {
    /// Classifies `url` against the worker's origin.
    ///
    /// Origins are compared as tuples of scheme, host and effective port, so a
    /// same-origin path that merely contains another origin's text stays
    /// internal and a look-alike host such as `site.test.evil` stays external.
    /// Opaque origins (`data:`, `blob:`, ...) never match and are external.
    #[must_use]
    pub fn classify(worker_origin: &Origin, url: &Url) -> Self {
        let origin = url.origin();
        if origin.is_tuple() && &origin == worker_origin {
            Self::Internal
        } else {
            Self::External
        }
    }

    /// Returns true for [`Route::External`].
    #[must_use]
    pub const fn is_external(self) -> bool {
        matches!(self, Self::External)
    }
}
