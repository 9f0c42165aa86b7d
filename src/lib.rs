//! # Citadels
//!
//! A four-player Citadels table engine built on an actor-style event model.
//!
//! This library provides the complete game core: phase management, the hero
//! draft, per-turn economic actions, quarter building, coin and card
//! transfers, hero skills, and end-game scoring. Everything outside the rules
//! of the game itself (transport, auth, matchmaking) is deliberately out of
//! scope; callers drive the table through [`Table`] and consume results
//! through per-player [`EventHandler`]s or the public broadcast stream.
//!
//! ## Architecture
//!
//! A game cycles through four phases:
//!
//! - **PreGame**: players join; the roster is fixed at start
//! - **Pick**: each seat drafts a hero from a shuffled, partly locked set
//! - **Action**: hero ranks 1..=9 resolve in order; each present hero's
//!   owner takes coins or cards, may build one quarter, and may cast a skill
//! - **EndGame**: entered after the round in which a player first completes
//!   seven quarters; scores are tallied and a winner is announced
//!
//! All shared state sits behind a single table lock. Player-facing output is
//! delivered through bounded per-player queues drained by independent tasks,
//! so a slow consumer is disconnected rather than allowed to stall the game.
//!
//! ## Example
//!
//! ```no_run
//! use citadels::{Table, TableConfig};
//!
//! let table = Table::new(TableConfig::default());
//! let mut broadcasts = table.subscribe();
//! ```

/// Core game logic, entities, and the table state machine.
pub mod game;
pub use game::{
    catalog::{Category, Coins, HERO_RANKS, Hero, Quarter, default_hero_set},
    config::TableConfig,
    errors::{SkillError, TableError},
    events::{ErrorCode, Event, EventKind},
    player::{EventHandler, Player, PlayerId},
    table::{
        ActionKind, COMPLETED_QUARTERS_TO_FINISH, MAX_PLAYERS, MIN_PLAYERS, Phase, PlayerView,
        Table,
    },
};
