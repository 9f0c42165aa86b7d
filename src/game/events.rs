//! Engine event stream.
//!
//! Every engine-to-player message is an immutable [`Event`]: a tagged payload
//! plus an optional rule-violation code. Events are pushed onto player queues
//! (notify) or onto every queue at the table (broadcast) and delivered
//! asynchronously by each player's dispatch loop.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

use super::catalog::{Coins, Hero, Quarter};
use super::player::PlayerId;

/// In-game rule violations delivered asynchronously on the event stream.
///
/// These are never returned from the mutating call itself; the call silently
/// no-ops and the offending player receives an error-tagged event instead.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AnotherPlayerSelecting,
    HeroNotInStack,
    WrongAction,
    WrongPhase,
    NotYourTurn,
    NoBuildChances,
    NotEnoughCoins,
    QuarterNotInHand,
    QuarterAlreadyBuilt,
    TargetHasNoCoins,
    TargetHasNoCards,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::AnotherPlayerSelecting => "another player is selecting",
            Self::HeroNotInStack => "hero is not in the stack",
            Self::WrongAction => "unrecognized action",
            Self::WrongPhase => "wrong phase for this operation",
            Self::NotYourTurn => "not your turn",
            Self::NoBuildChances => "no build chances left",
            Self::NotEnoughCoins => "not enough coins",
            Self::QuarterNotInHand => "quarter is not in hand",
            Self::QuarterAlreadyBuilt => "quarter already built",
            Self::TargetHasNoCoins => "target has no coins",
            Self::TargetHasNoCards => "target has no cards",
        };
        write!(f, "{repr}")
    }
}

/// Tagged event payloads.
///
/// Kinds prefixed with `Steal*Private` carry hand/balance details and are only
/// ever delivered to the two parties of a transfer; their public counterparts
/// carry amounts only.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum EventKind {
    RevealHeroSet {
        hero_set: Vec<Hero>,
    },
    GameStarted {
        king: PlayerId,
    },
    PickPhaseStarted {
        open_locked: Vec<Hero>,
        closed_locked: usize,
    },
    /// Private prompt to the selecting player with the remaining pool.
    ChooseHero {
        heroes: Vec<Hero>,
    },
    NextSelecting {
        player: PlayerId,
    },
    HeroSelected {
        hero: Hero,
    },
    ActionPhaseStarted,
    NextTurn {
        player: PlayerId,
        hero: Hero,
        rank: u8,
    },
    /// Nobody drafted the hero with this rank; the rank is skipped.
    HeroAbsent {
        rank: u8,
    },
    CoinsGive {
        to: PlayerId,
        amount: Coins,
        total: Coins,
    },
    /// Private: cards dealt into a player's hand.
    DrawCards {
        cards: Vec<Quarter>,
    },
    /// Private: a two-card choice dealt from the deck.
    ChooseCards {
        cards: Vec<Quarter>,
    },
    PlayerChoosingCards {
        player: PlayerId,
        count: usize,
    },
    PlayerSelectedCard {
        player: PlayerId,
        index: usize,
    },
    PlayerBuiltQuarter {
        player: PlayerId,
        quarter: Quarter,
    },
    StealCoin {
        from: PlayerId,
        to: PlayerId,
        count: Coins,
    },
    StealCoinPrivate {
        from: PlayerId,
        to: PlayerId,
        count: Coins,
    },
    StealCard {
        from: PlayerId,
        to: PlayerId,
        count: usize,
    },
    /// Private: a party's hand after a card transfer.
    StealCardPrivate {
        from: PlayerId,
        to: PlayerId,
        hand: Vec<Quarter>,
    },
    /// A rejected operation with no payload beyond the error code.
    ActionRejected,
    GameEnded {
        winner: PlayerId,
        scores: BTreeMap<PlayerId, u64>,
    },
}

/// The message envelope pushed onto player queues.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Event {
    #[serde(flatten)]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
}

impl Event {
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self { kind, error: None }
    }

    /// An error event with no payload of its own.
    #[must_use]
    pub fn rejected(error: ErrorCode) -> Self {
        Self {
            kind: EventKind::ActionRejected,
            error: Some(error),
        }
    }

    /// An error event that still carries a payload, e.g. the remaining hero
    /// pool alongside `HeroNotInStack`.
    #[must_use]
    pub fn with_error(kind: EventKind, error: ErrorCode) -> Self {
        Self {
            kind,
            error: Some(error),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl From<EventKind> for Event {
    fn from(kind: EventKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = Event::new(EventKind::NextSelecting {
            player: PlayerId::new("alice"),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "NextSelecting");
        assert_eq!(json["data"]["player"], "alice");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_event_keeps_payload() {
        let event = Event::with_error(
            EventKind::ChooseHero { heroes: vec![] },
            ErrorCode::HeroNotInStack,
        );
        assert!(event.is_error());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ChooseHero");
        assert_eq!(json["error"], "hero_not_in_stack");
    }

    #[test]
    fn test_rejected_event_roundtrip() {
        let event = Event::rejected(ErrorCode::WrongAction);
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
