//! Player actor: private game state plus an outbound event queue drained by
//! an independent dispatch task.
//!
//! A player never talks to the table; the table mutates player state under its
//! own lock and pushes [`Event`]s onto the player's queue with a non-blocking
//! send. The dispatch task is the only place that awaits the external handler,
//! so a slow consumer can never stall an in-progress table operation.

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::sync::mpsc;

use super::catalog::{Coins, Hero, Quarter};
use super::events::Event;

/// Externally supplied player identity. The engine never mints these; the
/// excluded transport/auth layer maps an authenticated account to one before
/// any table call.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PlayerId(String);

impl PlayerId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// External consumer of a player's private event stream.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, player: &PlayerId, event: Event);
}

/// A seated participant. Owned exclusively by the table that registered it;
/// all mutation happens under the table lock.
pub struct Player {
    id: PlayerId,

    /// Quarters the player holds and may build.
    pub(crate) hand: Vec<Quarter>,

    /// Quarters already built. No duplicate names.
    pub(crate) built: Vec<Quarter>,

    /// Hero drafted this round, cleared at the start of every pick phase.
    pub(crate) hero: Option<Hero>,

    pub(crate) coins: Coins,

    /// Position 1..=4 in the draft/turn rotation, assigned at game start.
    pub(crate) seat_order: usize,

    pub(crate) build_chances_left: u32,
    pub(crate) has_acted: bool,
    pub(crate) pending_choice: Option<Vec<Quarter>>,
    pub(crate) total_score: u64,

    outbox: Option<mpsc::Sender<Event>>,
    handler: Arc<dyn EventHandler>,
}

impl Player {
    #[must_use]
    pub fn new(id: PlayerId, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            id,
            hand: Vec::new(),
            built: Vec::new(),
            hero: None,
            coins: 0,
            seat_order: 0,
            build_chances_left: 0,
            has_acted: false,
            pending_choice: None,
            total_score: 0,
            outbox: None,
            handler,
        }
    }

    #[must_use]
    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    /// Open the outbound queue and spawn the dispatch loop. The loop runs
    /// until the queue is closed at game end.
    pub(crate) fn start_dispatch(&mut self, capacity: usize) {
        let (tx, mut rx) = mpsc::channel(capacity);
        self.outbox = Some(tx);
        let id = self.id.clone();
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler.handle(&id, event).await;
            }
            debug!("player {id}: dispatch loop finished");
        });
    }

    /// Enqueue an event without blocking. A full queue means the consumer has
    /// stalled far past the configured capacity; the player is disconnected so
    /// the table can keep moving.
    pub(crate) fn notify(&mut self, event: Event) {
        let Some(tx) = &self.outbox else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("player {}: queue full, disconnecting slow consumer", self.id);
                self.outbox = None;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("player {}: queue closed", self.id);
                self.outbox = None;
            }
        }
    }

    /// Close the queue; the dispatch loop drains what is left and terminates.
    pub(crate) fn close(&mut self) {
        self.outbox = None;
    }

    #[cfg(test)]
    pub(crate) fn is_connected(&self) -> bool {
        self.outbox.is_some()
    }

    pub(crate) fn has_built(&self, name: &str) -> bool {
        self.built.iter().any(|q| q.name == name)
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.id)
            .field("seat_order", &self.seat_order)
            .field("coins", &self.coins)
            .field("hand", &self.hand.len())
            .field("built", &self.built.len())
            .field("hero", &self.hero)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recorder(Mutex<Vec<Event>>);

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, _player: &PlayerId, event: Event) {
            self.0.lock().unwrap().push(event);
        }
    }

    /// Handler that never finishes, so the dispatch loop stops pulling from
    /// the queue after the first event.
    struct Stalled;

    #[async_trait]
    impl EventHandler for Stalled {
        async fn handle(&self, _player: &PlayerId, _event: Event) {
            std::future::pending::<()>().await;
        }
    }

    fn coin_event(total: Coins) -> Event {
        super::super::events::EventKind::CoinsGive {
            to: PlayerId::new("p"),
            amount: 2,
            total,
        }
        .into()
    }

    #[tokio::test]
    async fn test_notify_before_start_is_noop() {
        let mut player = Player::new(PlayerId::new("p"), Arc::new(Recorder(Mutex::new(vec![]))));
        player.notify(coin_event(2));
        assert!(!player.is_connected());
    }

    #[tokio::test]
    async fn test_dispatch_forwards_events_in_order() {
        let recorder = Arc::new(Recorder(Mutex::new(vec![])));
        let mut player = Player::new(PlayerId::new("p"), recorder.clone());
        player.start_dispatch(8);
        player.notify(coin_event(2));
        player.notify(coin_event(4));
        player.close();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = recorder.0.lock().unwrap();
        assert_eq!(*seen, [coin_event(2), coin_event(4)]);
    }

    #[tokio::test]
    async fn test_overflowing_queue_disconnects_consumer() {
        let mut player = Player::new(PlayerId::new("p"), Arc::new(Stalled));
        player.start_dispatch(1);
        // First event is pulled by the loop and stalls the handler, the second
        // fills the queue, the third overflows.
        player.notify(coin_event(2));
        tokio::time::sleep(Duration::from_millis(20)).await;
        player.notify(coin_event(4));
        player.notify(coin_event(6));
        assert!(!player.is_connected());
    }
}
