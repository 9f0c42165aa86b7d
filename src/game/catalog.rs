//! Static card catalog: buildable quarters, the hero set, and hero skills.
//!
//! Heroes are plain catalog entries; their skill effects live in a registry
//! keyed by hero name, so adding a hero means adding one entry to
//! [`default_hero_set`] and one arm to [`skill_effect`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::errors::SkillError;
use super::events::{ErrorCode, Event};
use super::player::PlayerId;
use super::table::TableState;

/// Whole coins. All prices and balances are non-negative integers.
pub type Coins = u64;

/// Highest hero turn rank; an action phase iterates ranks `1..=HERO_RANKS`.
pub const HERO_RANKS: u8 = 9;

/// Number of copies of the base stock a deck is built from.
const DECK_COPIES: usize = 4;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Category {
    Noble,
    Military,
    Trade,
    Spiritual,
    Special,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Noble => "Noble",
            Self::Military => "Military",
            Self::Trade => "Trade",
            Self::Spiritual => "Spiritual",
            Self::Special => "Special",
        };
        write!(f, "{repr}")
    }
}

/// A buildable card. Quarters are identified by name within a player's hand
/// and built collection; the card stock holds several copies of each name.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Quarter {
    pub name: String,
    pub category: Category,
    pub price: Coins,
}

impl Quarter {
    #[must_use]
    pub fn new(name: impl Into<String>, category: Category, price: Coins) -> Self {
        Self {
            name: name.into(),
            category,
            price,
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.category, self.price)
    }
}

/// A hero card. The skill behind a hero is looked up by name at cast time,
/// never stored on the value.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Hero {
    pub name: String,
    /// Fixed position in the action-phase order, unique within a set.
    pub rank: u8,
}

const QUARTER_STOCK: &[(&str, Category, Coins)] = &[
    ("Manor", Category::Noble, 3),
    ("Castle", Category::Noble, 4),
    ("Palace", Category::Noble, 5),
    ("Temple", Category::Spiritual, 1),
    ("Church", Category::Spiritual, 2),
    ("Monastery", Category::Spiritual, 3),
    ("Cathedral", Category::Spiritual, 5),
    ("Tavern", Category::Trade, 1),
    ("Market", Category::Trade, 2),
    ("Trading Post", Category::Trade, 2),
    ("Docks", Category::Trade, 3),
    ("Harbor", Category::Trade, 4),
    ("Town Hall", Category::Trade, 5),
    ("Watchtower", Category::Military, 1),
    ("Prison", Category::Military, 2),
    ("Barracks", Category::Military, 3),
    ("Fortress", Category::Military, 5),
    ("Haunted Quarter", Category::Special, 2),
    ("Keep", Category::Special, 3),
    ("Observatory", Category::Special, 4),
    ("Laboratory", Category::Special, 5),
    ("Library", Category::Special, 5),
];

/// A fresh, unshuffled deck built from the base stock.
#[must_use]
pub(crate) fn standard_deck() -> Vec<Quarter> {
    let mut deck = Vec::with_capacity(QUARTER_STOCK.len() * DECK_COPIES);
    for _ in 0..DECK_COPIES {
        deck.extend(
            QUARTER_STOCK
                .iter()
                .map(|&(name, category, price)| Quarter::new(name, category, price)),
        );
    }
    deck
}

/// The default nine-hero set, one hero per rank.
#[must_use]
pub fn default_hero_set() -> Vec<Hero> {
    [
        ("Witch", 1),
        ("Blackmailer", 2),
        ("Enchantress", 3),
        ("Emperor", 4),
        ("Abbot", 5),
        ("Alchemist", 6),
        ("Architect", 7),
        ("Warlord", 8),
        ("CustomsOfficer", 9),
    ]
    .into_iter()
    .map(|(name, rank)| Hero {
        name: name.to_string(),
        rank,
    })
    .collect()
}

/// A hero skill: reads and mutates table state directly, reports typed
/// failures back to `cast_skill`'s caller.
pub(crate) type SkillEffect = fn(&mut TableState, &PlayerId, &Value) -> Result<(), SkillError>;

/// Look up a hero's skill by name.
pub(crate) fn skill_effect(hero: &str) -> Option<SkillEffect> {
    match hero {
        "Emperor" => Some(emperor),
        "Witch" | "Blackmailer" | "Enchantress" | "Abbot" | "Alchemist" | "Architect"
        | "Warlord" | "CustomsOfficer" => Some(idle),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct EmperorArgs {
    target: PlayerId,
    /// `false` asks for a card instead of a coin.
    #[serde(default)]
    coin: bool,
}

/// Takes one coin, or one card from the front of the hand, from a chosen
/// player. When the target has nothing to take, the cast still succeeds and
/// the caster is told via an error-tagged event.
fn emperor(table: &mut TableState, caster: &PlayerId, args: &Value) -> Result<(), SkillError> {
    let args: EmperorArgs =
        serde_json::from_value(args.clone()).map_err(|_| SkillError::MalformedPayload)?;
    if &args.target == caster {
        return Err(SkillError::CannotTargetSelf);
    }
    if !table.contains_player(&args.target) {
        return Err(SkillError::UnknownTarget);
    }
    if args.coin {
        if table.coins_of(&args.target) > 0 {
            table.give_coins(&args.target, caster, 1);
        } else {
            table.notify(caster, Event::rejected(ErrorCode::TargetHasNoCoins));
        }
    } else if table.hand_len(&args.target) > 0 {
        table.give_cards(&args.target, caster, 1);
    } else {
        table.notify(caster, Event::rejected(ErrorCode::TargetHasNoCards));
    }
    Ok(())
}

fn idle(_table: &mut TableState, _caster: &PlayerId, _args: &Value) -> Result<(), SkillError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hero_set_has_one_hero_per_rank() {
        let set = default_hero_set();
        assert_eq!(set.len(), HERO_RANKS as usize);
        let ranks: HashSet<u8> = set.iter().map(|h| h.rank).collect();
        let expected: HashSet<u8> = (1..=HERO_RANKS).collect();
        assert_eq!(ranks, expected);
    }

    #[test]
    fn test_every_hero_has_a_registered_skill() {
        for hero in default_hero_set() {
            assert!(
                skill_effect(&hero.name).is_some(),
                "{} has no skill",
                hero.name
            );
        }
    }

    #[test]
    fn test_unknown_hero_has_no_skill() {
        assert!(skill_effect("Assassin").is_none());
    }

    #[test]
    fn test_standard_deck_prices_are_positive() {
        let deck = standard_deck();
        assert_eq!(deck.len(), QUARTER_STOCK.len() * DECK_COPIES);
        assert!(deck.iter().all(|q| q.price >= 1));
    }
}
