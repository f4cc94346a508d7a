//! Build providers
//!
//! A build provider is the invocation's upstream: it yields the next build
//! descriptor to test, or signals that there is nothing to test. Concrete
//! providers (build-server pollers, local-directory providers) live outside
//! the core.

use crate::build::Build;
use crate::errors::Result;
use async_trait::async_trait;

/// Yields builds to test and learns about builds that were not tested.
#[async_trait]
pub trait BuildProvider: Send {
    /// The next build to test, or `None` when there is nothing to test.
    /// `None` is not an error: the invocation ends silently.
    async fn get_build(&mut self) -> Result<Option<Build>>;

    /// Called when an invocation failed before the build was successfully
    /// tested, so the provider can exclude it from future consideration or
    /// requeue it upstream.
    async fn build_not_tested(&mut self, build: &Build);
}
