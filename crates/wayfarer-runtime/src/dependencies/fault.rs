//! Scripted failures for any dependency.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::Instant;

use super::{Dependency, DependencyKey};
use crate::error::ToolError;

/// What the next call should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Forward to the wrapped dependency
    Pass,
    /// Return a dependency error without calling through
    Fail,
    /// Never return; the caller's deadline has to cut it off
    Hang,
    /// Reject the input as malformed
    InvalidInput,
}

/// Wraps a dependency and injects faults.
///
/// Scripted faults are consumed one per call; once the script runs out,
/// every call gets the default fault.
pub struct FaultInjector<D> {
    inner: D,
    script: Mutex<VecDeque<Fault>>,
    default: Fault,
    calls: AtomicU32,
}

impl<D> FaultInjector<D> {
    /// Pass-through until scripted otherwise.
    pub fn new(inner: D) -> Self {
        Self::always(inner, Fault::Pass)
    }

    /// Every call gets `fault`.
    pub fn always(inner: D, fault: Fault) -> Self {
        Self {
            inner,
            script: Mutex::new(VecDeque::new()),
            default: fault,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_script(self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.script.lock().extend(faults);
        self
    }

    /// Calls that reached the injector, faulted or not.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_fault(&self) -> Fault {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().pop_front().unwrap_or(self.default)
    }
}

#[async_trait]
impl<I, T, D> Dependency<I, T> for FaultInjector<D>
where
    I: Send + Sync,
    T: Send,
    D: Dependency<I, T>,
{
    fn key(&self) -> DependencyKey {
        self.inner.key()
    }

    async fn invoke(&self, input: &I, deadline: Instant) -> Result<T, ToolError> {
        match self.next_fault() {
            Fault::Pass => self.inner.invoke(input, deadline).await,
            Fault::Fail => Err(ToolError::Dependency(format!(
                "injected failure for {}",
                self.inner.key()
            ))),
            Fault::Hang => std::future::pending().await,
            Fault::InvalidInput => Err(ToolError::InvalidInput(format!(
                "injected invalid input for {}",
                self.inner.key()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependencies::{CurrencyQuery, FixedRateCurrency};
    use std::time::Duration;

    #[tokio::test]
    async fn test_script_then_default() {
        let injector = FaultInjector::new(FixedRateCurrency::default())
            .with_script([Fault::Fail, Fault::InvalidInput]);
        let query = CurrencyQuery::new("USD", "AED");
        let deadline = Instant::now() + Duration::from_secs(1);

        assert!(matches!(
            injector.invoke(&query, deadline).await,
            Err(ToolError::Dependency(_))
        ));
        assert!(matches!(
            injector.invoke(&query, deadline).await,
            Err(ToolError::InvalidInput(_))
        ));
        assert!(injector.invoke(&query, deadline).await.is_ok());
        assert_eq!(injector.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_never_resolves() {
        let injector = FaultInjector::always(FixedRateCurrency::default(), Fault::Hang);
        let query = CurrencyQuery::new("USD", "AED");
        let deadline = Instant::now() + Duration::from_secs(1);

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            injector.invoke(&query, deadline),
        )
        .await;
        assert!(result.is_err());
    }
}
