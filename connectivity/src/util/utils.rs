//! Helpers shared by the bus adapters.

use futures::stream::{self, BoxStream, StreamExt};
use futures::{FutureExt, select};
use futures_timer::Delay;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::Result;
use crate::api::models::ConnectivityError;

/// Runs a remote call, giving up after `limit`.
///
/// The call is raced against a runtime-agnostic timer. A call error is
/// wrapped with `context`; an expired timer yields
/// [`ConnectivityError::Timeout`]. There is no retry.
pub(crate) async fn with_timeout<T, F>(context: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = zbus::Result<T>>,
{
    let mut call = pin!(call.fuse());
    let mut timeout_delay = pin!(Delay::new(limit).fuse());

    select! {
        result = call => result.map_err(|source| ConnectivityError::DbusOperation {
            context: context.to_string(),
            source,
        }),
        _ = timeout_delay => {
            log::warn!("{context} timed out after {limit:?}");
            Err(ConnectivityError::Timeout {
                context: context.to_string(),
                timeout: limit,
            })
        }
    }
}

/// Turns a broadcast receiver into a stream that ends when the sender is
/// dropped. Items lost to lag are skipped with a warning.
pub(crate) fn broadcast_stream<T>(rx: broadcast::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + 'static,
{
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(item) => return Some((item, rx)),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Dropped {skipped} broadcast item(s)");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

/// Macro to convert Result to Option with error logging.
/// Usage: `try_log!(result, "context message")`
#[macro_export]
macro_rules! try_log {
    ($result:expr, $context:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{}: {:?}", $context, e);
                return None;
            }
        }
    };
}
