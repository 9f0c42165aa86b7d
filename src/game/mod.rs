//! Citadels game engine - table state machine and player actors.
//!
//! This module provides the core game implementation including:
//! - Phase state machine (pre-game, pick, action, end-game)
//! - Per-player event queues drained by independent dispatch tasks
//! - Hero draft, economic actions, building, and scoring
//! - Hero skills resolved through a name-keyed registry

pub mod catalog;
pub mod config;
pub mod errors;
pub mod events;
pub mod player;
pub mod table;
