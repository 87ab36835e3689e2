//! Open pages that a worker may control.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use url::Url;

/// Identifier of an open page.
pub type ClientId = u64;

/// A page known to the worker runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Page identifier.
    pub id: ClientId,
    /// URL the page was loaded from.
    pub url: Url,
    /// Version tag of the worker controlling the page, if any.
    pub controller: Option<String>,
}

/// Registry of open pages and their controlling worker.
#[derive(Debug, Default)]
pub struct Clients {
    pages: Mutex<Vec<ClientInfo>>,
    next_id: AtomicU64,
}

impl Clients {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn pages(&self) -> std::sync::MutexGuard<'_, Vec<ClientInfo>> {
        // A poisoned registry still holds consistent data: every mutation is
        // a single push, retain or field store.
        self.pages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Registers a newly opened, uncontrolled page.
    pub fn open(&self, url: Url) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pages().push(ClientInfo {
            id,
            url,
            controller: None,
        });
        id
    }

    /// Forgets a closed page. Returns `false` if it was unknown.
    pub fn close(&self, id: ClientId) -> bool {
        let mut pages = self.pages();
        let before = pages.len();
        pages.retain(|p| p.id != id);
        pages.len() < before
    }

    /// Version tag of the worker controlling `id`.
    #[must_use]
    pub fn controller(&self, id: ClientId) -> Option<String> {
        self.pages()
            .iter()
            .find(|p| p.id == id)
            .and_then(|p| p.controller.clone())
    }

    /// Makes `version` the controller of every open page, returning how many
    /// pages changed controller.
    pub fn claim(&self, version: &str) -> usize {
        let mut claimed = 0;
        for page in self.pages().iter_mut() {
            if page.controller.as_deref() != Some(version) {
                page.controller = Some(version.to_string());
                claimed += 1;
            }
        }
        claimed
    }

    /// Copies the current page list.
    #[must_use]
    pub fn list(&self) -> Vec<ClientInfo> {
        self.pages().clone()
    }
}
