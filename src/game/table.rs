//! Table state machine.
//!
//! The table owns all shared game state behind a single lock: the phase, the
//! seat rotation, the draft stack, the deck, and every [`Player`]. Operations
//! validate phase and identity under the lock, mutate, and push events onto
//! player queues with non-blocking sends, so nothing ever awaits while the
//! lock is held. Timers are plain tokio tasks that re-acquire the lock and
//! re-validate the phase, the player identity, and an epoch counter before
//! firing, so a stale deadline can never act on the wrong turn.

use log::{debug, info, warn};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::sync::{mpsc, watch};

use super::catalog::{self, Coins, HERO_RANKS, Hero, Quarter};
use super::config::TableConfig;
use super::errors::TableError;
use super::events::{ErrorCode, Event, EventKind};
use super::player::{Player, PlayerId};

/// Max number of players at one table.
pub const MAX_PLAYERS: usize = 4;
/// Min number of players required to start.
pub const MIN_PLAYERS: usize = 4;
/// Built quarters needed to complete a citadel and trigger the end game.
pub const COMPLETED_QUARTERS_TO_FINISH: usize = 7;

const OPEN_LOCKED_HEROES: usize = 2;
const CLOSED_LOCKED_HEROES: usize = 1;
const STARTING_HAND: usize = 4;
const COIN_ACTION_AMOUNT: Coins = 2;
const CARD_ACTION_CHOICE: usize = 2;
const FIRST_FINISHER_BONUS: u64 = 4;
const FINISHER_BONUS: u64 = 2;

/// Separate logic cycles of a game. Pick and Action alternate once per round
/// until the end condition is met.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreGame,
    Pick,
    Action,
    EndGame,
}

/// The economic action a turn player takes once per turn.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Coins,
    Cards,
    /// Anything on the wire the engine does not recognize.
    #[serde(other)]
    Unknown,
}

/// Read-only snapshot of one player's state.
#[derive(Clone, Debug, Serialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub seat_order: usize,
    pub coins: Coins,
    pub hand: Vec<Quarter>,
    pub built: Vec<Quarter>,
    pub hero: Option<Hero>,
    pub score: u64,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id().clone(),
            seat_order: player.seat_order,
            coins: player.coins,
            hand: player.hand.clone(),
            built: player.built.clone(),
            hero: player.hero.clone(),
            score: player.total_score,
        }
    }
}

/// Handle to a game table. Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Table {
    inner: Arc<TableInner>,
}

struct TableInner {
    config: TableConfig,
    state: Mutex<TableState>,
    finished: watch::Sender<bool>,
}

/// All shared game state, guarded by the table lock.
pub(crate) struct TableState {
    phase: Phase,
    started: bool,
    players: HashMap<PlayerId, Player>,
    /// Player ids by seat order; index 0 is seat one, the king.
    seats: Vec<PlayerId>,
    king: Option<PlayerId>,
    turn: Option<PlayerId>,
    selecting: Option<PlayerId>,
    /// Action-phase rank currently being resolved, 0 outside action phases.
    current_rank: u8,
    /// Bumped whenever `selecting` changes; a selection deadline only fires
    /// if its captured epoch still matches.
    selection_epoch: u64,
    /// Same, for `turn` and for deferred rank advances.
    turn_epoch: u64,
    hero_set: Vec<Hero>,
    heroes_remaining: Vec<Hero>,
    deck: Vec<Quarter>,
    first_to_finish: Option<PlayerId>,
    scored: bool,
    rng: StdRng,
    subscribers: Vec<mpsc::Sender<Event>>,
}

impl TableState {
    fn new(config: &TableConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            phase: Phase::PreGame,
            started: false,
            players: HashMap::with_capacity(MAX_PLAYERS),
            seats: Vec::with_capacity(MAX_PLAYERS),
            king: None,
            turn: None,
            selecting: None,
            current_rank: 0,
            selection_epoch: 0,
            turn_epoch: 0,
            hero_set: Vec::new(),
            heroes_remaining: Vec::new(),
            deck: Vec::new(),
            first_to_finish: None,
            scored: false,
            rng,
            subscribers: Vec::new(),
        }
    }

    pub(crate) fn contains_player(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    pub(crate) fn coins_of(&self, id: &PlayerId) -> Coins {
        self.players.get(id).map_or(0, |p| p.coins)
    }

    pub(crate) fn hand_len(&self, id: &PlayerId) -> usize {
        self.players.get(id).map_or(0, |p| p.hand.len())
    }

    /// Push an event to one player's queue.
    pub(crate) fn notify(&mut self, id: &PlayerId, event: Event) {
        if let Some(player) = self.players.get_mut(id) {
            player.notify(event);
        }
    }

    /// Push an event to every player's queue and to every public subscriber.
    pub(crate) fn broadcast(&mut self, event: Event) {
        for player in self.players.values_mut() {
            player.notify(event.clone());
        }
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("broadcast subscriber lagging, dropping subscription");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn close_queues(&mut self) {
        for player in self.players.values_mut() {
            player.close();
        }
        self.subscribers.clear();
    }

    /// Take up to `count` cards off the top of the deck.
    fn draw(&mut self, count: usize) -> Vec<Quarter> {
        let take = count.min(self.deck.len());
        self.deck.drain(..take).collect()
    }

    fn deal_starting_hands(&mut self) {
        let mut deck = catalog::standard_deck();
        deck.shuffle(&mut self.rng);
        self.deck = deck;
        for id in self.seats.clone() {
            let cards = self.draw(STARTING_HAND);
            if let Some(player) = self.players.get_mut(&id) {
                player.hand = cards.clone();
            }
            self.notify(&id, EventKind::DrawCards { cards }.into());
        }
    }

    /// First seat holding the hero with this rank, if any.
    fn holder_of_rank(&self, rank: u8) -> Option<(PlayerId, Hero)> {
        self.seats.iter().find_map(|id| {
            let hero = self.players.get(id)?.hero.as_ref()?;
            (hero.rank == rank).then(|| (id.clone(), hero.clone()))
        })
    }

    /// Transfer coins between two players. A no-op unless the source balance
    /// covers the amount, so a balance can never go negative.
    pub(crate) fn give_coins(&mut self, from: &PlayerId, to: &PlayerId, amount: Coins) {
        if from == to || amount == 0 || !self.players.contains_key(to) {
            return;
        }
        {
            let Some(src) = self.players.get_mut(from) else {
                return;
            };
            if src.coins < amount {
                return;
            }
            src.coins -= amount;
        }
        if let Some(dst) = self.players.get_mut(to) {
            dst.coins += amount;
        }
        let private: Event = EventKind::StealCoinPrivate {
            from: from.clone(),
            to: to.clone(),
            count: amount,
        }
        .into();
        self.notify(from, private.clone());
        self.notify(to, private);
        self.broadcast(
            EventKind::StealCoin {
                from: from.clone(),
                to: to.clone(),
                count: amount,
            }
            .into(),
        );
    }

    /// Move up to `count` cards from one hand to another. Cards come off the
    /// front of the hand by position, not by random selection. Both parties
    /// get their new hand privately; the public stream sees the count only.
    pub(crate) fn give_cards(&mut self, from: &PlayerId, to: &PlayerId, count: usize) {
        if from == to || count == 0 || !self.players.contains_key(to) {
            return;
        }
        let moved: Vec<Quarter> = {
            let Some(src) = self.players.get_mut(from) else {
                return;
            };
            if src.hand.is_empty() {
                return;
            }
            let take = count.min(src.hand.len());
            src.hand.drain(..take).collect()
        };
        let moved_count = moved.len();
        let to_hand = {
            let Some(dst) = self.players.get_mut(to) else {
                return;
            };
            dst.hand.extend(moved);
            dst.hand.clone()
        };
        let from_hand = self
            .players
            .get(from)
            .map(|p| p.hand.clone())
            .unwrap_or_default();
        self.notify(
            from,
            EventKind::StealCardPrivate {
                from: from.clone(),
                to: to.clone(),
                hand: from_hand,
            }
            .into(),
        );
        self.notify(
            to,
            EventKind::StealCardPrivate {
                from: from.clone(),
                to: to.clone(),
                hand: to_hand,
            }
            .into(),
        );
        self.broadcast(
            EventKind::StealCard {
                from: from.clone(),
                to: to.clone(),
                count: moved_count,
            }
            .into(),
        );
    }
}

impl Table {
    #[must_use]
    pub fn new(config: TableConfig) -> Self {
        let state = TableState::new(&config);
        let (finished, _) = watch::channel(false);
        Self {
            inner: Arc::new(TableInner {
                config,
                state: Mutex::new(state),
                finished,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TableState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a player before the game starts.
    pub fn add_player(&self, player: Player) -> Result<(), TableError> {
        let mut state = self.state();
        if state.started {
            return Err(TableError::AlreadyStarted);
        }
        if state.players.len() == MAX_PLAYERS {
            return Err(TableError::Full);
        }
        if state.players.contains_key(player.id()) {
            return Err(TableError::PlayerExists);
        }
        debug!("player {}: joined the table", player.id());
        state.players.insert(player.id().clone(), player);
        Ok(())
    }

    /// Remove a player. Only permitted before the game starts; the roster is
    /// fixed for the whole game once `start` succeeds.
    pub fn remove_player(&self, id: &PlayerId) -> Result<(), TableError> {
        let mut state = self.state();
        if state.started {
            return Err(TableError::AlreadyStarted);
        }
        state
            .players
            .remove(id)
            .map(|_| debug!("player {id}: left the table"))
            .ok_or(TableError::PlayerNotExists)
    }

    /// Make the table ready to conduct rounds: seat the players, start their
    /// dispatch loops, reveal the hero set, deal hands, and open the first
    /// pick phase.
    ///
    /// Seats follow sorted player ids and the king is seat one, so a seeded
    /// table plays out identically every time.
    pub fn start(&self) -> Result<(), TableError> {
        let mut state = self.state();
        if state.started {
            return Err(TableError::AlreadyStarted);
        }
        if state.players.len() < MIN_PLAYERS {
            return Err(TableError::NotEnoughPlayers);
        }
        if state.players.len() > MAX_PLAYERS {
            return Err(TableError::Full);
        }
        state.started = true;

        let mut seats: Vec<PlayerId> = state.players.keys().cloned().collect();
        seats.sort();
        let king = seats[0].clone();
        let capacity = self.inner.config.queue_capacity;
        for (i, id) in seats.iter().enumerate() {
            if let Some(player) = state.players.get_mut(id) {
                player.seat_order = i + 1;
                player.start_dispatch(capacity);
            }
        }
        state.seats = seats;
        state.king = Some(king.clone());
        state.hero_set = catalog::default_hero_set();

        info!("table started, king is {king}");
        let hero_set = state.hero_set.clone();
        state.broadcast(EventKind::RevealHeroSet { hero_set }.into());
        state.deal_starting_hands();
        state.broadcast(EventKind::GameStarted { king }.into());
        self.start_pick_phase(&mut state);
        Ok(())
    }

    /// Signal that flips to `true` when the game has ended and scoring ran.
    #[must_use]
    pub fn finished(&self) -> watch::Receiver<bool> {
        self.inner.finished.subscribe()
    }

    /// Subscribe to the public event stream. A subscriber that stops reading
    /// long enough for its queue to fill is silently dropped.
    pub fn subscribe(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(self.inner.config.queue_capacity);
        self.state().subscribers.push(tx);
        rx
    }

    #[must_use]
    pub fn started(&self) -> bool {
        self.state().started
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// The player who opens the draft each pick phase.
    #[must_use]
    pub fn king(&self) -> Option<PlayerId> {
        self.state().king.clone()
    }

    /// The player currently taking a turn in the action phase.
    #[must_use]
    pub fn turn(&self) -> Option<PlayerId> {
        self.state().turn.clone()
    }

    /// The player currently drafting a hero in the pick phase.
    #[must_use]
    pub fn selecting(&self) -> Option<PlayerId> {
        self.state().selecting.clone()
    }

    #[must_use]
    pub fn view(&self, id: &PlayerId) -> Option<PlayerView> {
        self.state().players.get(id).map(PlayerView::from)
    }

    /// Snapshots of all players in seat order (sorted id order before the
    /// game starts).
    #[must_use]
    pub fn views(&self) -> Vec<PlayerView> {
        let state = self.state();
        if state.seats.is_empty() {
            let mut ids: Vec<_> = state.players.keys().cloned().collect();
            ids.sort();
            ids.iter()
                .filter_map(|id| state.players.get(id).map(PlayerView::from))
                .collect()
        } else {
            state
                .seats
                .iter()
                .filter_map(|id| state.players.get(id).map(PlayerView::from))
                .collect()
        }
    }

    /// Draft a hero for the selecting player. Out-of-turn and unknown-hero
    /// attempts never mutate state; the caller is told via an error event.
    pub fn select_hero(&self, player: &PlayerId, hero_name: &str) {
        let mut state = self.state();
        if state.phase != Phase::Pick || !state.contains_player(player) {
            return;
        }
        if state.selecting.as_ref() != Some(player) {
            state.notify(player, Event::rejected(ErrorCode::AnotherPlayerSelecting));
            return;
        }
        if !state.heroes_remaining.iter().any(|h| h.name == hero_name) {
            let heroes = state.heroes_remaining.clone();
            state.notify(
                player,
                Event::with_error(EventKind::ChooseHero { heroes }, ErrorCode::HeroNotInStack),
            );
            return;
        }
        self.assign_hero(&mut state, player, hero_name);
    }

    /// Take the once-per-turn economic action: two coins, or a two-card
    /// choice off the deck. A no-op out of turn or when already acted.
    pub fn make_action(&self, kind: ActionKind, player: &PlayerId) {
        let mut state = self.state();
        if state.phase != Phase::Action || state.turn.as_ref() != Some(player) {
            return;
        }
        let Some(acted) = state.players.get(player).map(|p| p.has_acted) else {
            return;
        };
        if acted {
            return;
        }
        match kind {
            ActionKind::Coins => {
                let Some(total) = state.players.get_mut(player).map(|p| {
                    p.coins += COIN_ACTION_AMOUNT;
                    p.has_acted = true;
                    p.coins
                }) else {
                    return;
                };
                state.broadcast(
                    EventKind::CoinsGive {
                        to: player.clone(),
                        amount: COIN_ACTION_AMOUNT,
                        total,
                    }
                    .into(),
                );
            }
            ActionKind::Cards => {
                let cards = state.draw(CARD_ACTION_CHOICE);
                let count = cards.len();
                if let Some(p) = state.players.get_mut(player) {
                    p.pending_choice = Some(cards.clone());
                    p.has_acted = true;
                }
                state.notify(player, EventKind::ChooseCards { cards }.into());
                state.broadcast(
                    EventKind::PlayerChoosingCards {
                        player: player.clone(),
                        count,
                    }
                    .into(),
                );
            }
            ActionKind::Unknown => {
                state.notify(player, Event::rejected(ErrorCode::WrongAction));
            }
        }
    }

    /// Resolve a pending two-card choice. The unchosen card is discarded, not
    /// returned to the deck.
    pub fn select_card(&self, card_name: &str, player: &PlayerId) {
        let mut state = self.state();
        let picked = {
            let Some(p) = state.players.get_mut(player) else {
                return;
            };
            let Some(choice) = &p.pending_choice else {
                return;
            };
            let Some(idx) = choice.iter().position(|c| c.name == card_name) else {
                return;
            };
            let card = choice[idx].clone();
            p.hand.push(card);
            p.pending_choice = None;
            idx
        };
        state.broadcast(
            EventKind::PlayerSelectedCard {
                player: player.clone(),
                index: picked,
            }
            .into(),
        );
    }

    /// Build a quarter from the turn player's hand. Every failure has its own
    /// error code; the price charged is the one on the card in hand.
    pub fn build_quarter(&self, quarter_name: &str, player: &PlayerId) {
        let mut state = self.state();
        if !state.contains_player(player) {
            return;
        }
        if state.phase != Phase::Action {
            state.notify(player, Event::rejected(ErrorCode::WrongPhase));
            return;
        }
        if state.turn.as_ref() != Some(player) {
            state.notify(player, Event::rejected(ErrorCode::NotYourTurn));
            return;
        }
        let Some((chances, coins, hand_idx, already_built)) =
            state.players.get(player).map(|p| {
                (
                    p.build_chances_left,
                    p.coins,
                    p.hand.iter().position(|q| q.name == quarter_name),
                    p.has_built(quarter_name),
                )
            })
        else {
            return;
        };
        if chances < 1 {
            state.notify(player, Event::rejected(ErrorCode::NoBuildChances));
            return;
        }
        let Some(idx) = hand_idx else {
            state.notify(player, Event::rejected(ErrorCode::QuarterNotInHand));
            return;
        };
        if already_built {
            state.notify(player, Event::rejected(ErrorCode::QuarterAlreadyBuilt));
            return;
        }
        let price = state.players[player].hand[idx].price;
        if price > coins {
            state.notify(player, Event::rejected(ErrorCode::NotEnoughCoins));
            return;
        }

        let (quarter, built_count) = {
            let Some(p) = state.players.get_mut(player) else {
                return;
            };
            let quarter = p.hand.remove(idx);
            p.coins -= quarter.price;
            p.build_chances_left -= 1;
            p.built.push(quarter.clone());
            (quarter, p.built.len())
        };
        debug!("player {player}: built {quarter}");
        state.broadcast(
            EventKind::PlayerBuiltQuarter {
                player: player.clone(),
                quarter,
            }
            .into(),
        );
        if built_count == COMPLETED_QUARTERS_TO_FINISH && state.first_to_finish.is_none() {
            info!("player {player}: first to complete a citadel");
            state.first_to_finish = Some(player.clone());
        }
    }

    /// End the caller's turn. A no-op unless the caller is the turn player.
    pub fn end_turn(&self, player: &PlayerId) {
        let mut state = self.state();
        if state.phase == Phase::Action && state.turn.as_ref() == Some(player) {
            self.advance_turn(&mut state);
        }
    }

    /// Resolve the caster's hero skill with the supplied payload. Structural
    /// failures come back synchronously; on success the turn advances exactly
    /// as `end_turn` would.
    pub fn cast_skill(&self, caster: &PlayerId, args: &Value) -> Result<(), TableError> {
        let mut state = self.state();
        let hero_name = state
            .players
            .get(caster)
            .ok_or(TableError::PlayerNotExists)?
            .hero
            .as_ref()
            .map(|h| h.name.clone())
            .ok_or(TableError::NoHeroAssigned)?;
        let effect = catalog::skill_effect(&hero_name).ok_or(TableError::NoHeroAssigned)?;
        effect(&mut state, caster, args)?;
        debug!("player {caster}: cast {hero_name}");
        if state.phase == Phase::Action && state.turn.as_ref() == Some(caster) {
            self.advance_turn(&mut state);
        }
        Ok(())
    }

    fn start_pick_phase(&self, state: &mut TableState) {
        state.phase = Phase::Pick;
        state.turn = None;
        state.current_rank = 0;
        for player in state.players.values_mut() {
            player.hero = None;
        }

        let mut heroes = state.hero_set.clone();
        heroes.shuffle(&mut state.rng);

        // with a full table part of the set is locked away, unassigned, to
        // keep heroes scarce
        let mut open_locked = Vec::new();
        let mut closed_locked = 0;
        if state.players.len() == MAX_PLAYERS {
            open_locked = heroes.drain(..OPEN_LOCKED_HEROES).collect();
            heroes.drain(..CLOSED_LOCKED_HEROES);
            closed_locked = CLOSED_LOCKED_HEROES;
        }
        state.heroes_remaining = heroes;

        info!(
            "pick phase started, {} heroes selectable",
            state.heroes_remaining.len()
        );
        state.broadcast(
            EventKind::PickPhaseStarted {
                open_locked,
                closed_locked,
            }
            .into(),
        );

        let Some(king) = state.king.clone() else {
            return;
        };
        state.selecting = Some(king.clone());
        state.selection_epoch += 1;
        let heroes = state.heroes_remaining.clone();
        state.notify(&king, EventKind::ChooseHero { heroes }.into());
        self.arm_selection_timer(state);
    }

    /// Assign a hero from the remaining pool and advance the draft.
    fn assign_hero(&self, state: &mut TableState, id: &PlayerId, hero_name: &str) {
        let Some(idx) = state
            .heroes_remaining
            .iter()
            .position(|h| h.name == hero_name)
        else {
            return;
        };
        let hero = state.heroes_remaining.remove(idx);
        debug!("player {id}: drafted {}", hero.name);
        state.notify(id, EventKind::HeroSelected { hero: hero.clone() }.into());
        if let Some(player) = state.players.get_mut(id) {
            player.hero = Some(hero);
        }
        self.next_selecting(state);
    }

    fn next_selecting(&self, state: &mut TableState) {
        let Some(current) = state.selecting.clone() else {
            return;
        };
        let Some(pos) = state.seats.iter().position(|id| *id == current) else {
            return;
        };
        let next = state.seats[(pos + 1) % state.seats.len()].clone();
        state.selection_epoch += 1;
        if state.king.as_ref() == Some(&next) {
            // the rotation is back at the king: every seat has drafted
            state.selecting = None;
            self.start_action_phase(state);
            return;
        }
        state.selecting = Some(next.clone());
        let heroes = state.heroes_remaining.clone();
        state.notify(&next, EventKind::ChooseHero { heroes }.into());
        state.broadcast(EventKind::NextSelecting { player: next }.into());
        self.arm_selection_timer(state);
    }

    fn start_action_phase(&self, state: &mut TableState) {
        state.phase = Phase::Action;
        state.current_rank = 0;
        info!("action phase started");
        state.broadcast(EventKind::ActionPhaseStarted.into());
        self.advance_turn(state);
    }

    /// Walk the ranks until a drafted hero is found, the round ends, or an
    /// absent-rank delay defers the walk to a timer.
    fn advance_turn(&self, state: &mut TableState) {
        state.turn = None;
        state.turn_epoch += 1;
        loop {
            state.current_rank += 1;
            if state.current_rank > HERO_RANKS {
                self.end_round(state);
                if state.phase != Phase::EndGame {
                    self.start_pick_phase(state);
                }
                return;
            }
            let rank = state.current_rank;
            if let Some((id, hero)) = state.holder_of_rank(rank) {
                if let Some(player) = state.players.get_mut(&id) {
                    player.has_acted = false;
                    player.pending_choice = None;
                    player.build_chances_left = 1;
                }
                state.turn = Some(id.clone());
                state.turn_epoch += 1;
                debug!("rank {rank}: {id} takes the turn as {}", hero.name);
                state.broadcast(EventKind::NextTurn { player: id, hero, rank }.into());
                self.arm_turn_timer(state);
                return;
            }
            state.broadcast(EventKind::HeroAbsent { rank }.into());
            if let Some(delay) = self.inner.config.hero_absent_delay {
                self.arm_rank_timer(state, rank, delay);
                return;
            }
        }
    }

    /// Score the game once the end condition holds. Runs exactly once; after
    /// it the queues are closed and the finished signal is set.
    fn end_round(&self, state: &mut TableState) {
        let Some(first) = state.first_to_finish.clone() else {
            return;
        };
        if state.scored {
            return;
        }
        state.scored = true;
        state.phase = Phase::EndGame;
        state.turn = None;
        state.selecting = None;

        for player in state.players.values_mut() {
            player.total_score += player.built.iter().map(|q| q.price).sum::<Coins>();
            if player.built.len() >= COMPLETED_QUARTERS_TO_FINISH {
                player.total_score += if *player.id() == first {
                    FIRST_FINISHER_BONUS
                } else {
                    FINISHER_BONUS
                };
            }
        }

        // max score wins, ties go to the earliest seat
        let mut winner: Option<(PlayerId, u64)> = None;
        for id in &state.seats {
            let score = state.players[id].total_score;
            match &winner {
                Some((_, best)) if *best >= score => {}
                _ => winner = Some((id.clone(), score)),
            }
        }
        let Some((winner, _)) = winner else {
            return;
        };
        let scores: BTreeMap<PlayerId, u64> = state
            .players
            .iter()
            .map(|(id, p)| (id.clone(), p.total_score))
            .collect();

        info!("game ended, winner is {winner}");
        state.broadcast(EventKind::GameEnded { winner, scores }.into());
        state.close_queues();
        self.inner.finished.send_replace(true);
    }

    fn arm_selection_timer(&self, state: &TableState) {
        let Some(expected) = state.selecting.clone() else {
            return;
        };
        let epoch = state.selection_epoch;
        let table = self.clone();
        let timeout = self.inner.config.selection_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            table.force_select(&expected, epoch);
        });
    }

    /// Selection deadline: pick a uniformly random remaining hero on the
    /// stalled player's behalf and advance exactly as a manual pick would.
    fn force_select(&self, expected: &PlayerId, epoch: u64) {
        let mut state = self.state();
        if state.phase != Phase::Pick
            || state.selection_epoch != epoch
            || state.selecting.as_ref() != Some(expected)
            || state.heroes_remaining.is_empty()
        {
            return;
        }
        let remaining = state.heroes_remaining.len();
        let idx = state.rng.random_range(0..remaining);
        let name = state.heroes_remaining[idx].name.clone();
        warn!("player {expected}: selection deadline passed, forcing {name}");
        self.assign_hero(&mut state, expected, &name);
    }

    fn arm_turn_timer(&self, state: &TableState) {
        let Some(expected) = state.turn.clone() else {
            return;
        };
        let epoch = state.turn_epoch;
        let table = self.clone();
        let timeout = self.inner.config.turn_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            table.force_end_turn(&expected, epoch);
        });
    }

    fn force_end_turn(&self, expected: &PlayerId, epoch: u64) {
        let mut state = self.state();
        if state.phase != Phase::Action
            || state.turn_epoch != epoch
            || state.turn.as_ref() != Some(expected)
        {
            return;
        }
        warn!("player {expected}: turn deadline passed, ending turn");
        self.advance_turn(&mut state);
    }

    fn arm_rank_timer(&self, state: &TableState, rank: u8, delay: Duration) {
        let epoch = state.turn_epoch;
        let table = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            table.resume_after_absent(rank, epoch);
        });
    }

    fn resume_after_absent(&self, rank: u8, epoch: u64) {
        let mut state = self.state();
        if state.phase != Phase::Action
            || state.turn_epoch != epoch
            || state.turn.is_some()
            || state.current_rank != rank
        {
            return;
        }
        self.advance_turn(&mut state);
    }
}
