//! Auxiliary browsing contexts that carry the primary session's cookies.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::driver::{BrowserDriver, BrowsingContext};
use crate::error::DriverResult;

/// Opens cloned contexts for one acquisition call and closes all of them
/// when the call ends.
///
/// [`SessionCloner::close_all`] must run on every exit path. If the cloner
/// is dropped with contexts still open they are closed on a background task.
pub struct SessionCloner {
    driver: Arc<dyn BrowserDriver>,
    opened: Mutex<Vec<Arc<dyn BrowsingContext>>>,
}

impl SessionCloner {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            driver,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// A fresh context holding every cookie `source` has. The context is
    /// tracked even when copying the cookies fails, so `close_all` still
    /// reaches it.
    pub async fn clone_from(
        &self,
        source: &dyn BrowsingContext,
    ) -> DriverResult<Arc<dyn BrowsingContext>> {
        let cookies = source.cookies().await?;
        let context = self.driver.new_context().await?;
        self.opened.lock().await.push(Arc::clone(&context));

        if let Err(e) = context.add_cookies(&cookies).await {
            tracing::warn!(error = %e, "Could not copy cookies into cloned context");
            return Err(e);
        }
        tracing::debug!(
            source = source.id(),
            clone = context.id(),
            cookies = cookies.len(),
            "Cloned session"
        );
        Ok(context)
    }

    pub async fn open_count(&self) -> usize {
        self.opened.lock().await.len()
    }

    /// Closes every context this cloner opened. Close failures are logged.
    pub async fn close_all(&self) {
        let contexts: Vec<_> = self.opened.lock().await.drain(..).collect();
        for context in contexts {
            if let Err(e) = context.close().await {
                tracing::warn!(context = context.id(), error = %e, "Failed to close cloned context");
            }
        }
    }
}

impl Drop for SessionCloner {
    fn drop(&mut self) {
        let contexts: Vec<_> = self.opened.get_mut().drain(..).collect();
        if contexts.is_empty() {
            return;
        }
        tracing::warn!(count = contexts.len(), "Cloned contexts left open; closing in background");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                for context in contexts {
                    let _ = context.close().await;
                }
            });
        }
    }
}
