//! Property snapshots and signal subscriptions for remote objects.
//!
//! Remote objects are read with a single `GetProperties`-style call whose
//! result is kept as a [`PropertyBag`]. Reads from the bag are best effort:
//! devices routinely omit optional fields, so a missing or malformed value
//! yields the caller's default instead of an error. The bag is never
//! updated behind the caller's back; a refresh is always explicit.

use futures::stream::{Stream, StreamExt};
use log::debug;
use std::collections::HashMap;
use tokio::task::JoinHandle;
use zvariant::OwnedValue;

use crate::Result;
use crate::api::models::ConnectivityError;

/// A typed property exposed by a remote interface.
///
/// Implemented by marker types so reads can be written as
/// `registration.get::<Strength>()`.
pub trait Property {
    /// Property name as it appears on the bus.
    const NAME: &'static str;
    /// Decoded value type.
    type Value: TryFrom<OwnedValue, Error = zvariant::Error> + Default;
}

/// Snapshot of the properties of a remote object.
#[derive(Debug, Default)]
pub struct PropertyBag {
    values: HashMap<String, OwnedValue>,
}

impl PropertyBag {
    /// Wraps the result of a property fetch.
    pub fn new(values: HashMap<String, OwnedValue>) -> Self {
        Self { values }
    }

    /// Returns the decoded value of `name`, or an error describing why it
    /// could not be read.
    pub fn try_get<T>(&self, name: &str) -> Result<T>
    where
        T: TryFrom<OwnedValue, Error = zvariant::Error>,
    {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| ConnectivityError::MissingProperty(name.to_string()))?;

        value
            .try_clone()
            .and_then(T::try_from)
            .map_err(|source| ConnectivityError::Decode {
                name: name.to_string(),
                source,
            })
    }

    /// Returns the decoded value of `name`, or `default` if the property is
    /// missing or has an unexpected type.
    pub fn get<T>(&self, name: &str, default: T) -> T
    where
        T: TryFrom<OwnedValue, Error = zvariant::Error>,
    {
        match self.try_get(name) {
            Ok(value) => value,
            Err(e) => {
                debug!("Using default for property {name}: {e}");
                default
            }
        }
    }

    /// Returns whether the bag holds a value for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of properties in the snapshot.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<HashMap<String, OwnedValue>> for PropertyBag {
    fn from(values: HashMap<String, OwnedValue>) -> Self {
        Self::new(values)
    }
}

/// Handle to a running signal subscription.
///
/// The handler keeps running until the stream ends or the subscription is
/// dropped. Dropping aborts the handler task, which drops the underlying
/// signal stream and with it the bus match rule.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Whether the handler loop has finished (stream ended or aborted).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Runs `handler` for every item of `stream` on the dispatch runtime.
///
/// Items are handled one at a time, in arrival order. Handlers run on the
/// shared runtime and must not block.
pub fn subscribe<S, F, Fut>(stream: S, mut handler: F) -> Subscription
where
    S: Stream + Send + 'static,
    S::Item: Send,
    F: FnMut(S::Item) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let task = tokio::spawn(async move {
        let mut stream = Box::pin(stream);
        while let Some(item) = stream.next().await {
            handler(item).await;
        }
        debug!("Subscription stream ended");
    });

    Subscription { task }
}
