//! Game session state machine.
//!
//! `setup -> wordreveal -> discussion -> results`, and back to `wordreveal`
//! through [`GameSession::new_game`]. Every mutation is synchronous except the
//! word draw, and a failed draw leaves the session exactly as it was.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

use crate::errors::GameError;
use crate::model::{Difficulty, Language, Phase, Player, Role, WordWithHints};
use crate::snapshot::{PersistedGameState, SessionSnapshot, SnapshotStore};
use crate::word_service::WordSupplyService;

pub const MIN_PLAYERS: usize = 3;

/// Localization lookup used to build default player names.
pub type Translate<'a> = &'a (dyn Fn(&str) -> String + Sync);

/// English labels for hosts without a localization layer.
pub fn default_labels(key: &str) -> String {
    match key {
        "player" => "Player".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("select at least one category before starting")]
    NoCategoriesSelected,
    #[error("at least {MIN_PLAYERS} players are required, got {0}")]
    TooFewPlayers(usize),
    #[error("impostor count must be between 1 and {max}, got {requested}")]
    InvalidImpostorCount { requested: usize, max: usize },
    #[error("no game has been started yet")]
    NotStarted,
    #[error("a game is already starting")]
    StartInProgress,
    #[error("could not start game")]
    CouldNotStart(#[source] GameError),
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub phase: Phase,
    pub players: Vec<Player>,
    pub total_players: usize,
    pub impostor_count: usize,
    pub current_word: String,
    pub current_hints: Vec<String>,
    pub current_category: String,
    pub selected_categories: Vec<String>,
    pub custom_category: String,
    pub difficulty: Difficulty,
    pub language: Language,
    pub show_hints_to_impostors: bool,
    pub current_reveal_index: usize,
    pub game_started: bool,
}

impl Default for GameState {
    fn default() -> Self {
        let persisted = PersistedGameState::default();
        Self {
            phase: Phase::Setup,
            players: Vec::new(),
            total_players: persisted.total_players,
            impostor_count: persisted.impostor_count,
            current_word: String::new(),
            current_hints: Vec::new(),
            current_category: String::new(),
            selected_categories: persisted.selected_categories,
            custom_category: String::new(),
            difficulty: persisted.difficulty,
            language: persisted.language,
            show_hints_to_impostors: persisted.show_hints_to_impostors,
            current_reveal_index: 0,
            game_started: false,
        }
    }
}

/// Inputs for a word draw, captured before the await so the session can be
/// released while the draw is in flight.
#[derive(Debug, Clone)]
pub struct PendingRound {
    players: Option<Vec<Player>>,
    pub category: String,
    pub language: Language,
    pub difficulty: Difficulty,
}

pub struct GameSession {
    state: GameState,
    player_names: Vec<String>,
    custom_categories: Vec<String>,
    rng: StdRng,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Fisher-Yates permutation of `0..n`.
pub fn shuffled_indices<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        indices.swap(i, j);
    }
    indices
}

/// Mark the first `impostor_count` shuffled positions as impostors.
pub fn assign_roles<R: Rng + ?Sized>(players: &mut [Player], impostor_count: usize, rng: &mut R) {
    for player in players.iter_mut() {
        player.role = Role::Player;
    }
    for index in shuffled_indices(players.len(), rng).into_iter().take(impostor_count) {
        players[index].role = Role::Impostor;
    }
}

impl GameSession {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: GameState::default(),
            player_names: Vec::new(),
            custom_categories: Vec::new(),
            rng,
        }
    }

    /// Restore persisted settings. Out-of-range counts are clamped back into
    /// a startable configuration.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let mut session = Self::new();
        let persisted = snapshot.game_state;
        let total = persisted.total_players.max(MIN_PLAYERS);
        session.state.total_players = total;
        session.state.impostor_count = persisted.impostor_count.clamp(1, total - 1);
        session.state.difficulty = persisted.difficulty;
        session.state.language = persisted.language;
        session.state.selected_categories = persisted.selected_categories;
        session.state.show_hints_to_impostors = persisted.show_hints_to_impostors;
        session.player_names = snapshot.player_names;
        session.custom_categories = snapshot.custom_categories;
        session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            player_names: self.player_names.clone(),
            custom_categories: self.custom_categories.clone(),
            game_state: PersistedGameState {
                total_players: self.state.total_players,
                impostor_count: self.state.impostor_count,
                difficulty: self.state.difficulty,
                language: self.state.language,
                selected_categories: self.state.selected_categories.clone(),
                show_hints_to_impostors: self.state.show_hints_to_impostors,
            },
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn player_names(&self) -> &[String] {
        &self.player_names
    }

    pub fn custom_categories(&self) -> &[String] {
        &self.custom_categories
    }

    pub fn impostors(&self) -> Vec<&Player> {
        self.state
            .players
            .iter()
            .filter(|p| p.role == Role::Impostor)
            .collect()
    }

    pub fn set_player_count(&mut self, count: usize, t: Translate<'_>) -> Result<(), SessionError> {
        if count < MIN_PLAYERS {
            return Err(SessionError::TooFewPlayers(count));
        }
        let label = t("player");
        let mut names: Vec<String> = self.player_names.iter().take(count).cloned().collect();
        for i in names.len()..count {
            names.push(format!("{label} {}", i + 1));
        }
        self.player_names = names;
        self.state.total_players = count;
        self.state.impostor_count = self.state.impostor_count.min(count / 3);
        Ok(())
    }

    /// Writing past the current roster pads the gap with blanks, which fall
    /// back to default names when the roster is built.
    pub fn set_player_name(&mut self, index: usize, name: impl Into<String>) {
        if self.player_names.len() <= index {
            self.player_names.resize(index + 1, String::new());
        }
        self.player_names[index] = name.into();
    }

    pub fn set_impostor_count(&mut self, count: usize) -> Result<(), SessionError> {
        let max = self.state.total_players.saturating_sub(1);
        if count == 0 || count > max {
            return Err(SessionError::InvalidImpostorCount { requested: count, max });
        }
        self.state.impostor_count = count;
        Ok(())
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.state.difficulty = difficulty;
    }

    pub fn set_language(&mut self, language: Language) {
        self.state.language = language;
    }

    pub fn toggle_category(&mut self, category: &str) {
        let selected = &mut self.state.selected_categories;
        if let Some(pos) = selected.iter().position(|c| c == category) {
            selected.remove(pos);
        } else {
            selected.push(category.to_string());
        }
    }

    pub fn add_custom_category(&mut self, category: &str) {
        let category = category.trim();
        if category.is_empty() {
            return;
        }
        if !self.custom_categories.iter().any(|c| c == category) {
            self.custom_categories.push(category.to_string());
        }
        if !self.state.selected_categories.iter().any(|c| c == category) {
            self.state.selected_categories.push(category.to_string());
        }
        self.state.custom_category.clear();
    }

    pub fn remove_custom_category(&mut self, category: &str) {
        self.custom_categories.retain(|c| c != category);
        self.state.selected_categories.retain(|c| c != category);
    }

    pub fn set_custom_category(&mut self, draft: impl Into<String>) {
        self.state.custom_category = draft.into();
    }

    pub fn toggle_hints(&mut self) {
        self.state.show_hints_to_impostors = !self.state.show_hints_to_impostors;
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.state.phase = phase;
    }

    /// Roster as it would be dealt, every member a plain player.
    pub fn roster_players(&self, t: Translate<'_>) -> Vec<Player> {
        let label = t("player");
        (0..self.state.total_players)
            .map(|i| {
                let name = self
                    .player_names
                    .get(i)
                    .filter(|n| !n.is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("{label} {}", i + 1));
                Player {
                    id: i as u32 + 1,
                    name,
                    role: Role::Player,
                }
            })
            .collect()
    }

    fn pick_category(&mut self) -> Result<String, SessionError> {
        let categories = &self.state.selected_categories;
        if categories.is_empty() {
            return Err(SessionError::NoCategoriesSelected);
        }
        let index = self.rng.gen_range(0..categories.len());
        Ok(categories[index].clone())
    }

    /// Check preconditions, deal roles and pick a category without touching
    /// visible state.
    pub fn prepare_start(&mut self, t: Translate<'_>) -> Result<PendingRound, SessionError> {
        if self.state.selected_categories.is_empty() {
            return Err(SessionError::NoCategoriesSelected);
        }
        let total = self.state.total_players;
        if total < MIN_PLAYERS {
            return Err(SessionError::TooFewPlayers(total));
        }
        let impostors = self.state.impostor_count;
        if impostors == 0 || impostors >= total {
            return Err(SessionError::InvalidImpostorCount {
                requested: impostors,
                max: total - 1,
            });
        }

        let mut players = self.roster_players(t);
        assign_roles(&mut players, impostors, &mut self.rng);
        let category = self.pick_category()?;
        Ok(PendingRound {
            players: Some(players),
            category,
            language: self.state.language,
            difficulty: self.state.difficulty,
        })
    }

    /// Like [`prepare_start`](Self::prepare_start) but keeps the current
    /// roster and roles.
    pub fn prepare_new_round(&mut self) -> Result<PendingRound, SessionError> {
        if self.state.players.is_empty() {
            return Err(SessionError::NotStarted);
        }
        let category = self.pick_category()?;
        Ok(PendingRound {
            players: None,
            category,
            language: self.state.language,
            difficulty: self.state.difficulty,
        })
    }

    pub fn commit_round(&mut self, round: PendingRound, entry: WordWithHints) {
        if let Some(players) = round.players {
            self.state.players = players;
        }
        self.state.current_word = entry.word;
        self.state.current_hints = entry.hints.to_vec();
        self.state.current_category = round.category;
        self.state.current_reveal_index = 0;
        self.state.game_started = true;
        self.state.phase = Phase::WordReveal;
    }

    pub async fn start_game(
        &mut self,
        supply: &WordSupplyService,
        t: Translate<'_>,
    ) -> Result<(), SessionError> {
        let round = self.prepare_start(t)?;
        let entry = draw(supply, &round).await?;
        self.commit_round(round, entry);
        Ok(())
    }

    pub async fn new_game(&mut self, supply: &WordSupplyService) -> Result<(), SessionError> {
        let round = self.prepare_new_round()?;
        let entry = draw(supply, &round).await?;
        self.commit_round(round, entry);
        Ok(())
    }

    pub fn next_reveal_player(&mut self) {
        self.state.current_reveal_index += 1;
    }

    pub fn start_discussion(&mut self) {
        self.state.phase = Phase::Discussion;
    }

    pub fn end_game(&mut self) {
        self.state.phase = Phase::Results;
    }
}

pub(crate) async fn draw(
    supply: &WordSupplyService,
    round: &PendingRound,
) -> Result<WordWithHints, SessionError> {
    log::info!("Starting round with category {}", round.category);
    supply
        .get_random_word_with_hints(&round.category, round.language, round.difficulty)
        .await
        .map_err(|err| {
            log::error!("could not start game: {err}");
            SessionError::CouldNotStart(err)
        })
}

/// Held for the whole of a start or new round, from dealing to commit.
struct StartLatch<'a>(&'a AtomicBool);

impl<'a> StartLatch<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| Self(flag))
            .map_err(|_| SessionError::StartInProgress)
    }
}

impl Drop for StartLatch<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Shared session for request handlers.
///
/// The session lock is released while a word is being drawn. The start latch
/// rejects a second start or new round, and any settings change, until the
/// pending round is committed or abandoned.
pub struct SessionHandle {
    session: Mutex<GameSession>,
    starting: AtomicBool,
    supply: WordSupplyService,
    store: Arc<dyn SnapshotStore>,
}

impl SessionHandle {
    pub fn new(session: GameSession, supply: WordSupplyService, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            session: Mutex::new(session),
            starting: AtomicBool::new(false),
            supply,
            store,
        }
    }

    /// Restore the persisted settings, or start fresh when none exist.
    pub async fn load(
        supply: WordSupplyService,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self, GameError> {
        let loader = store.clone();
        let snapshot = spawn_blocking(move || loader.load())
            .await
            .map_err(|err| GameError::Storage(err.to_string()))??;
        let session = match snapshot {
            Some(snapshot) => {
                log::info!("restored session settings from snapshot");
                GameSession::from_snapshot(snapshot)
            }
            None => GameSession::new(),
        };
        Ok(Self::new(session, supply, store))
    }

    pub async fn state(&self) -> GameState {
        self.session.lock().await.state().clone()
    }

    pub async fn view<T>(&self, f: impl FnOnce(&GameSession) -> T) -> T {
        f(&*self.session.lock().await)
    }

    /// Apply a synchronous mutation and persist the resulting settings.
    /// Settings are frozen while a round is being dealt.
    pub async fn update<T>(
        &self,
        f: impl FnOnce(&mut GameSession) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let (value, snapshot) = {
            let mut session = self.session.lock().await;
            // A start sets the latch before it locks the session to deal, so
            // checking under the lock cannot miss one.
            if self.starting.load(Ordering::SeqCst) {
                return Err(SessionError::StartInProgress);
            }
            let value = f(&mut session)?;
            (value, session.snapshot())
        };
        self.persist(snapshot).await;
        Ok(value)
    }

    /// Phase and reveal changes are not part of the snapshot.
    pub async fn transition(&self, f: impl FnOnce(&mut GameSession)) -> GameState {
        let mut session = self.session.lock().await;
        f(&mut session);
        session.state().clone()
    }

    async fn persist(&self, snapshot: SessionSnapshot) {
        let store = self.store.clone();
        match spawn_blocking(move || store.save(&snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::warn!("failed to persist session snapshot: {err}"),
            Err(err) => log::warn!("session snapshot task failed: {err}"),
        }
    }

    pub async fn start_game(&self, t: Translate<'_>) -> Result<GameState, SessionError> {
        let _latch = StartLatch::acquire(&self.starting)?;
        let round = self.session.lock().await.prepare_start(t)?;
        let entry = draw(&self.supply, &round).await?;
        let mut session = self.session.lock().await;
        session.commit_round(round, entry);
        Ok(session.state().clone())
    }

    pub async fn new_game(&self) -> Result<GameState, SessionError> {
        let _latch = StartLatch::acquire(&self.starting)?;
        let round = self.session.lock().await.prepare_new_round()?;
        let entry = draw(&self.supply, &round).await?;
        let mut session = self.session.lock().await;
        session.commit_round(round, entry);
        Ok(session.state().clone())
    }

    #[cfg(test)]
    fn is_starting(&self) -> bool {
        self.starting.load(Ordering::SeqCst)
    }
}
