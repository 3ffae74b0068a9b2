//! Page foreground/background tracking.
//!
//! The session engine consumes a [`VisibilityGate`]; whatever hosts the
//! page (or a test) flips the flag through the paired
//! [`VisibilityPublisher`]. Background does not tear the session down —
//! it only suppresses error surfacing and reconnect scheduling until the
//! page is foregrounded again.

use tokio::sync::watch;

/// Write side of the visibility signal.
#[derive(Clone)]
pub struct VisibilityPublisher {
    tx: watch::Sender<bool>,
}

impl VisibilityPublisher {
    /// Records a foreground/background transition.
    pub fn set_foreground(&self, foreground: bool) {
        // send_replace rather than send: the gate may not be held anywhere
        // yet, and a dropped receiver is not an error here.
        let _ = self.tx.send_replace(foreground);
    }
}

/// Read side of the visibility signal, held by the session engine.
#[derive(Clone)]
pub struct VisibilityGate {
    rx: watch::Receiver<bool>,
}

impl VisibilityGate {
    /// Whether the page is currently foregrounded.
    #[must_use]
    pub fn is_foreground(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits for the next transition and returns the new state.
    ///
    /// If the publisher is gone the flag can never change again, so this
    /// pends forever; the session loop simply stops reacting to visibility.
    pub async fn changed(&mut self) -> bool {
        match self.rx.changed().await {
            Ok(()) => *self.rx.borrow_and_update(),
            Err(_) => std::future::pending().await,
        }
    }
}

/// Creates a linked publisher/gate pair with the given initial state.
#[must_use]
pub fn visibility_channel(initially_foreground: bool) -> (VisibilityPublisher, VisibilityGate) {
    let (tx, rx) = watch::channel(initially_foreground);
    (VisibilityPublisher { tx }, VisibilityGate { rx })
}
