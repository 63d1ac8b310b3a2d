//! Lifecycle observer for [`OpusPlayer`].

use std::sync::{Arc, Weak};

use core_async::lock::Lock;
use core_async::queue::Queue;
use tracing::trace;

use crate::player::{OpusPlayer, WeakPlayer};

/// Receives lifecycle notifications from a player.
///
/// Every method is invoked on [`Queue::main`], never from the decode task or
/// the render thread. The player holds the delegate weakly; keep your own
/// `Arc` alive for as long as you want notifications.
pub trait PlayerDelegate: Send + Sync {
    /// The track played to its end (or stopped early on a corrupt stream).
    fn did_finish_playing(&self, player: &OpusPlayer);

    fn did_start_playing(&self, _player: &OpusPlayer) {}

    fn did_pause(&self, _player: &OpusPlayer) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notification {
    Started,
    Paused,
    Finished,
}

/// Weak delegate slot plus main-queue delivery.
#[derive(Default)]
pub(crate) struct DelegateSlot {
    delegate: Lock<Option<Weak<dyn PlayerDelegate>>>,
}

impl DelegateSlot {
    pub(crate) fn set(&self, delegate: Option<&Arc<dyn PlayerDelegate>>) {
        *self.delegate.lock() = delegate.map(Arc::downgrade);
    }

    pub(crate) fn is_set(&self) -> bool {
        self.delegate
            .lock()
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Queue `notification` on the main queue.
    ///
    /// Both the delegate and the player are resolved when the task runs, so
    /// a delegate or player dropped in the meantime receives nothing.
    pub(crate) fn notify(&self, player: WeakPlayer, notification: Notification) {
        let Some(delegate) = self.delegate.lock().clone() else {
            return;
        };

        Queue::main().dispatch(move || {
            let (Some(delegate), Some(player)) = (delegate.upgrade(), player.upgrade()) else {
                trace!(?notification, "Delegate or player gone; dropping notification");
                return;
            };
            match notification {
                Notification::Started => delegate.did_start_playing(&player),
                Notification::Paused => delegate.did_pause(&player),
                Notification::Finished => delegate.did_finish_playing(&player),
            }
        });
    }
}
