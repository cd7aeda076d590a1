//! Interrupt subscriber reference counting.
//!
//! Every channel has a subscriber count, zero until the first subscribe.
//! The tracker wraps the host's native subscribe/unsubscribe for all data
//! types and calls the channel's interrupt callback exactly on the
//! transitions that matter:
//!
//! ```text
//!            subscribe                subscribe
//!   ┌───┐  callback(true)   ┌───┐   (silent)     ┌───┐
//!   │ 0 │ ────────────────▶ │ 1 │ ─────────────▶ │ n │
//!   └───┘ ◀──────────────── └───┘ ◀───────────── └───┘
//!           unsubscribe             unsubscribe
//!          callback(false)           (silent)
//! ```
//!
//! The native call always goes first. When it fails nothing is counted and
//! no callback runs. When the callback fails, its status is reported but the
//! count change stands, because the host-side subscription already exists
//! (or is already gone).
//!
//! Transitions of all channels are serialized by a reentrant guard held
//! across the native call and the callback. The counts themselves sit
//! behind a separate lock that is released before the callback runs, so a
//! callback may query counts or subscribe and unsubscribe again from the
//! same thread.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, error, warn};

use crate::channel::Slot;
use crate::error::{AutoparamError, AutoparamResult, HostError};
use crate::handler::InterruptCallback;
use crate::host::{Handle, InterruptId};

/// Subscriber counts of all channels of one driver.
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    transitions: ReentrantMutex<()>,
    counts: Mutex<HashMap<Handle, usize>>,
}

impl SubscriptionTracker {
    /// A tracker with every count at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current subscriber count of `handle`.
    pub fn count(&self, handle: Handle) -> usize {
        self.counts.lock().get(&handle).copied().unwrap_or(0)
    }

    /// Run `native`, then count the new subscriber of `slot`.
    pub fn subscribe<S: Slot>(
        &self,
        slot: &S,
        callback: Option<&InterruptCallback<S>>,
        native: impl FnOnce() -> Result<InterruptId, HostError>,
    ) -> AutoparamResult<InterruptId> {
        let handle = slot.channel().handle();
        let _transition = self.transitions.lock();

        let id = native().map_err(|err| {
            warn!(%handle, error = %err, "Native interrupt registration failed");
            AutoparamError::from(err)
        })?;

        let count = {
            let mut counts = self.counts.lock();
            let count = counts.entry(handle).or_insert(0);
            *count += 1;
            *count
        };
        debug!(%handle, %id, subscribers = count, "Interrupt subscribed");

        if count == 1 {
            fire(slot, callback, true)?;
        }
        Ok(id)
    }

    /// Run `native`, which cancels a subscription and reports which channel
    /// it belonged to, then drop one subscriber of that channel.
    ///
    /// `locate` maps the handle to its slot and interrupt callback. A count
    /// that is already zero is left at zero and reported as
    /// [`AutoparamError::RefcountUnderflow`].
    pub fn unsubscribe<S: Slot>(
        &self,
        native: impl FnOnce() -> Result<Handle, HostError>,
        locate: impl FnOnce(Handle) -> AutoparamResult<(Arc<S>, Option<InterruptCallback<S>>)>,
    ) -> AutoparamResult<Handle> {
        let _transition = self.transitions.lock();

        let handle = native().map_err(|err| {
            warn!(error = %err, "Native interrupt cancellation failed");
            AutoparamError::from(err)
        })?;
        let (slot, callback) = locate(handle)?;

        let count = {
            let mut counts = self.counts.lock();
            let count = counts.entry(handle).or_insert(0);
            if *count == 0 {
                error!(%handle, "Interrupt subscriber count would drop below zero");
                return Err(AutoparamError::RefcountUnderflow(handle));
            }
            *count -= 1;
            *count
        };
        debug!(%handle, subscribers = count, "Interrupt unsubscribed");

        if count == 0 {
            fire(slot.as_ref(), callback.as_ref(), false)?;
        }
        Ok(handle)
    }
}

fn fire<S: Slot>(
    slot: &S,
    callback: Option<&InterruptCallback<S>>,
    activating: bool,
) -> AutoparamResult<()> {
    let Some(callback) = callback else {
        return Ok(());
    };
    let handle = slot.channel().handle();
    let status = callback(slot, activating);
    if status.is_success() {
        return Ok(());
    }
    warn!(%handle, activating, %status, "Interrupt callback failed");
    Err(AutoparamError::Callback {
        handle,
        activating,
        status,
    })
}
