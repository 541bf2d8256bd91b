//! Ordered fallback chains.
//!
//! A chain lists producers for one kind of result, tried in order, and ends
//! in a terminal producer that cannot fail. Resolving a chain therefore
//! always yields a value unless a producer reports a `Fatal` failure,
//! which is caller misuse and never papered over.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

use crate::cache::ResultCache;
use crate::dependencies::{Dependency, DependencyKey};
use crate::error::{FailureKind, ToolError};
use crate::observability::fingerprint;

/// One fallible step of a chain.
pub enum Producer<I: Send + Sync, T: Clone + Send + Sync + 'static> {
    /// A live dependency call
    Dependency(Arc<dyn Dependency<I, T>>),

    /// The last good result for the same input
    Cached(Arc<ResultCache<T>>),
}

impl<I: Send + Sync, T: Clone + Send + Sync + 'static> Producer<I, T> {
    pub fn label(&self) -> String {
        match self {
            Self::Dependency(dependency) => dependency.key().to_string(),
            Self::Cached(cache) => format!("{} cache", cache.key()),
        }
    }
}

impl<I: Send + Sync, T: Clone + Send + Sync + 'static> Clone for Producer<I, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Dependency(dependency) => Self::Dependency(Arc::clone(dependency)),
            Self::Cached(cache) => Self::Cached(Arc::clone(cache)),
        }
    }
}

/// The step that always answers.
pub enum Terminal<I, T> {
    /// A fixed value
    Static { label: String, value: T },

    /// A total function of the input
    Computed {
        label: String,
        produce: Arc<dyn Fn(&I) -> T + Send + Sync>,
    },
}

impl<I, T: Clone> Terminal<I, T> {
    pub fn fixed(label: impl Into<String>, value: T) -> Self {
        Self::Static {
            label: label.into(),
            value,
        }
    }

    pub fn computed(label: impl Into<String>, produce: impl Fn(&I) -> T + Send + Sync + 'static) -> Self {
        Self::Computed {
            label: label.into(),
            produce: Arc::new(produce),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Static { label, .. } | Self::Computed { label, .. } => label,
        }
    }

    pub fn produce(&self, input: &I) -> T {
        match self {
            Self::Static { value, .. } => value.clone(),
            Self::Computed { produce, .. } => produce(input),
        }
    }
}

/// What a chain resolved to.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,

    /// Position of the producer that answered; the terminal comes last
    pub index: usize,

    pub producer: String,

    /// True iff anything but the first producer answered
    pub degraded: bool,

    /// Failures of the producers tried before the winner
    pub failures: Vec<FailureKind>,
}

/// Producers for one result type, tried in declared order.
pub struct FallbackChain<I: Send + Sync, T: Clone + Send + Sync + 'static> {
    key: DependencyKey,
    producers: Vec<Producer<I, T>>,
    terminal: Terminal<I, T>,
}

impl<I, T> FallbackChain<I, T>
where
    I: Serialize + Send + Sync,
    T: Clone + Send + Sync + 'static,
{
    /// A chain of `primary` followed directly by `terminal`.
    pub fn new(primary: Arc<dyn Dependency<I, T>>, terminal: Terminal<I, T>) -> Self {
        Self {
            key: primary.key(),
            producers: vec![Producer::Dependency(primary)],
            terminal,
        }
    }

    /// Insert a secondary dependency before the terminal.
    pub fn then_dependency(mut self, dependency: Arc<dyn Dependency<I, T>>) -> Self {
        self.producers.push(Producer::Dependency(dependency));
        self
    }

    /// Insert a cache lookup before the terminal.
    pub fn then_cached(mut self, cache: Arc<ResultCache<T>>) -> Self {
        self.producers.push(Producer::Cached(cache));
        self
    }

    /// Key of the primary dependency.
    pub fn key(&self) -> DependencyKey {
        self.key.clone()
    }

    pub fn producers(&self) -> &[Producer<I, T>] {
        &self.producers
    }

    pub fn terminal(&self) -> &Terminal<I, T> {
        &self.terminal
    }

    /// Caches to refresh when the primary succeeds.
    pub fn caches(&self) -> impl Iterator<Item = &Arc<ResultCache<T>>> {
        self.producers.iter().filter_map(|producer| match producer {
            Producer::Cached(cache) => Some(cache),
            Producer::Dependency(_) => None,
        })
    }

    /// Resolve with a caller-supplied way of running each producer.
    ///
    /// `attempt` gets the producer's position and a handle to it, and must
    /// collapse all of its internal retries into one result. The terminal
    /// is only consulted once every producer has failed.
    pub async fn resolve_with<F, Fut>(&self, input: &I, mut attempt: F) -> Result<Resolved<T>, FailureKind>
    where
        F: FnMut(usize, Producer<I, T>) -> Fut,
        Fut: Future<Output = Result<T, FailureKind>>,
    {
        let mut failures = Vec::new();

        for (index, producer) in self.producers.iter().enumerate() {
            match attempt(index, producer.clone()).await {
                Ok(value) => {
                    return Ok(Resolved {
                        value,
                        index,
                        producer: producer.label(),
                        degraded: index > 0,
                        failures,
                    });
                }
                Err(failure) if !failure.is_fallback_eligible() => return Err(failure),
                Err(failure) => {
                    tracing::warn!(
                        producer = %producer.label(),
                        index,
                        failure = %failure,
                        "Producer failed, falling back"
                    );
                    failures.push(failure);
                }
            }
        }

        let index = self.producers.len();
        tracing::warn!(producer = %self.terminal.label(), "Using terminal fallback");
        Ok(Resolved {
            value: self.terminal.produce(input),
            index,
            producer: self.terminal.label().to_string(),
            degraded: true,
            failures,
        })
    }

    /// Resolve by calling each producer once, with no breaker or retry.
    pub async fn resolve(&self, input: &I, deadline: Instant) -> Result<Resolved<T>, FailureKind> {
        let input_fingerprint = fingerprint(input);
        self.resolve_with(input, |_, producer| {
            let input_fingerprint = input_fingerprint.clone();
            async move {
                match producer {
                    Producer::Dependency(dependency) => {
                        let key = dependency.key();
                        let started = Instant::now();
                        let outcome = tokio::time::timeout_at(deadline, dependency.invoke(input, deadline)).await;
                        match outcome {
                            Ok(Ok(value)) => Ok(value),
                            Ok(Err(ToolError::InvalidInput(message))) => {
                                Err(FailureKind::Fatal { key, message })
                            }
                            Ok(Err(err)) => Err(FailureKind::Exhausted {
                                key: key.clone(),
                                attempts: 1,
                                last: Box::new(FailureKind::DependencyError {
                                    key,
                                    message: err.to_string(),
                                }),
                            }),
                            Err(_) => Err(FailureKind::Exhausted {
                                key: key.clone(),
                                attempts: 1,
                                last: Box::new(FailureKind::Timeout {
                                    key,
                                    elapsed: started.elapsed(),
                                }),
                            }),
                        }
                    }
                    Producer::Cached(cache) => cache.lookup(&input_fingerprint).await,
                }
            }
        })
        .await
    }
}
