//! Acting on page elements with one fallback for ambiguous locators.

use crate::driver::PageHandle;
use crate::error::ActionError;
use crate::types::{Locator, UiAction};

/// Performs `action` on the element `locator` resolves to.
///
/// The first attempt is strict. If the locator matched several elements the
/// action is retried exactly once against the first match; a failure there is
/// reported as [`ActionError::AmbiguousTargetFailed`]. Any other failure is
/// returned as-is without a retry.
pub async fn act(
    page: &dyn PageHandle,
    locator: &Locator,
    action: &UiAction,
) -> Result<(), ActionError> {
    if locator.is_empty() {
        return Err(ActionError::TargetNotFound(locator.to_string()));
    }

    match page.perform(locator, None, action).await {
        Ok(()) => Ok(()),
        Err(ActionError::StrictViolation { count, .. }) => {
            tracing::debug!(%locator, count, action = action.name(), "Ambiguous locator, using first match");
            page.perform(locator, Some(0), action)
                .await
                .map_err(|e| ActionError::AmbiguousTargetFailed {
                    locator: locator.to_string(),
                    matches: count,
                    reason: e.to_string(),
                })
        }
        Err(e) => Err(e),
    }
}
