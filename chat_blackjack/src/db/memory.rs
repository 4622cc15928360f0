//! In-memory session store.
//!
//! Mirrors the PostgreSQL store's locking: each chat has an async mutex that
//! stands in for the session row lock and is held by the transaction until it
//! commits or drops. Player rows get their own mutexes, taken by balance
//! changes; locking a player below one already held fails with
//! [`StoreError::LockOrder`] where PostgreSQL could deadlock. Mutations are applied in place and journaled; rollback
//! replays the journal backwards. Created rows are kept on rollback, just as
//! get-or-create is idempotent in the database.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

use super::errors::{StoreError, StoreResult};
use super::repository::{GameStore, StoreTx};
use super::timeouts::with_lock_timeout;
use crate::game::cards::Hand;
use crate::game::models::{
    ChatId, GameSession, Participant, ParticipantStatus, Player, SessionStatus, TgId,
};
use crate::game::rules::DEFAULT_STARTING_BALANCE;

#[derive(Debug, Clone)]
struct ParticipantRow {
    id: i64,
    session_id: i64,
    player_id: i64,
    status: ParticipantStatus,
    hand: Hand,
    bet: Option<i64>,
}

#[derive(Debug, Default)]
struct State {
    sessions: BTreeMap<i64, GameSession>,
    session_by_chat: HashMap<ChatId, i64>,
    players: BTreeMap<i64, Player>,
    player_by_tg: HashMap<TgId, i64>,
    participants: BTreeMap<i64, ParticipantRow>,
    participant_by_pair: HashMap<(i64, i64), i64>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn session_by_chat(&self, chat_id: ChatId) -> StoreResult<&GameSession> {
        self.session_by_chat
            .get(&chat_id)
            .and_then(|id| self.sessions.get(id))
            .ok_or(StoreError::SessionNotFound(chat_id))
    }

    fn session_mut(&mut self, session_id: i64) -> StoreResult<&mut GameSession> {
        self.sessions
            .get_mut(&session_id)
            .ok_or(StoreError::RowVanished {
                table: "game_sessions",
                id: session_id,
            })
    }

    fn participant_mut(&mut self, participant_id: i64) -> StoreResult<&mut ParticipantRow> {
        self.participants
            .get_mut(&participant_id)
            .ok_or(StoreError::RowVanished {
                table: "participants",
                id: participant_id,
            })
    }

    fn player_mut(&mut self, player_id: i64) -> StoreResult<&mut Player> {
        self.players
            .get_mut(&player_id)
            .ok_or(StoreError::RowVanished {
                table: "players",
                id: player_id,
            })
    }

    fn get_or_create_player(&mut self, tg_id: TgId, username: &str, balance: i64) -> Player {
        if let Some(player) = self
            .player_by_tg
            .get(&tg_id)
            .and_then(|id| self.players.get(id))
        {
            return player.clone();
        }

        let player = Player {
            id: self.next_id(),
            tg_id,
            username: username.to_string(),
            balance,
        };
        self.player_by_tg.insert(tg_id, player.id);
        self.players.insert(player.id, player.clone());
        player
    }

    fn hydrate(&self, row: &ParticipantRow) -> StoreResult<Participant> {
        let player = self
            .players
            .get(&row.player_id)
            .cloned()
            .ok_or(StoreError::RowVanished {
                table: "players",
                id: row.player_id,
            })?;

        Ok(Participant {
            id: row.id,
            session_id: row.session_id,
            player,
            status: row.status,
            hand: row.hand.clone(),
            bet: row.bet,
        })
    }

    fn session_participants<'a>(
        &'a self,
        session_id: i64,
    ) -> impl Iterator<Item = &'a ParticipantRow> + 'a {
        self.participants
            .values()
            .filter(move |row| row.session_id == session_id)
    }

    fn chat_player_ids(&self, chat_id: ChatId) -> Vec<i64> {
        let Some(session_id) = self.session_by_chat.get(&chat_id) else {
            return Vec::new();
        };
        self.session_participants(*session_id)
            .map(|row| row.player_id)
            .collect()
    }

    fn rating(&self, mut players: Vec<Player>, limit: Option<i64>) -> Vec<Player> {
        players.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            players.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        }
        players
    }
}

/// Inverse of one applied mutation.
#[derive(Debug)]
enum Undo {
    Session(GameSession),
    Participant(ParticipantRow),
    Balance { player_id: i64, delta: i64 },
}

struct Inner {
    state: Mutex<State>,
    chat_locks: Mutex<HashMap<ChatId, Arc<tokio::sync::Mutex<()>>>>,
    player_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    starting_balance: i64,
}

/// Session store kept in process memory
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_STARTING_BALANCE)
    }
}

impl MemoryStore {
    pub fn new(starting_balance: i64) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                chat_locks: Mutex::new(HashMap::new()),
                player_locks: Mutex::new(HashMap::new()),
                starting_balance,
            }),
        }
    }

    /// Committed view of a chat's session
    pub fn session(&self, chat_id: ChatId) -> Option<GameSession> {
        let state = self.state();
        state.session_by_chat(chat_id).ok().cloned()
    }

    /// Committed view of a chat's participants, in turn order
    pub fn participants(&self, chat_id: ChatId) -> Vec<Participant> {
        let state = self.state();
        let Some(session_id) = state.session_by_chat.get(&chat_id).copied() else {
            return Vec::new();
        };
        state
            .session_participants(session_id)
            .filter_map(|row| state.hydrate(row).ok())
            .collect()
    }

    /// Committed view of a player
    pub fn player(&self, tg_id: TgId) -> Option<Player> {
        let state = self.state();
        state
            .player_by_tg
            .get(&tg_id)
            .and_then(|id| state.players.get(id))
            .cloned()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a panicking test thread; the data is intact.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn chat_lock(&self, chat_id: ChatId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .inner
            .chat_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(chat_id).or_default().clone()
    }

    fn player_lock(&self, player_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .inner
            .player_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(player_id).or_default().clone()
    }
}

fn credit(player: &mut Player, delta: i64) -> StoreResult<i64> {
    player.balance = player
        .balance
        .checked_add(delta)
        .ok_or(StoreError::InvalidAmount(delta))?;
    Ok(player.balance)
}

#[async_trait]
impl GameStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        Ok(MemoryTx {
            store: self.clone(),
            locks: HashMap::new(),
            player_locks: BTreeMap::new(),
            journal: Vec::new(),
            finished: false,
        })
    }

    async fn top_up_balance(&self, username: &str, amount: i64) -> StoreResult<Player> {
        if amount <= 0 {
            return Err(StoreError::InvalidAmount(amount));
        }

        let player_id = self
            .state()
            .players
            .values()
            .find(|p| p.username == username)
            .map(|p| p.id)
            .ok_or_else(|| StoreError::PlayerNotFound(username.to_string()))?;

        let lock = self.player_lock(player_id);
        let _guard = with_lock_timeout(async { Ok::<_, StoreError>(lock.lock_owned().await) }).await?;

        let mut state = self.state();
        let player = state.player_mut(player_id)?;
        credit(player, amount)?;
        Ok(player.clone())
    }

    async fn money_rating(
        &self,
        chat_id: Option<ChatId>,
        limit: Option<i64>,
    ) -> StoreResult<Vec<Player>> {
        let state = self.state();
        let players = match chat_id {
            Some(chat_id) => state
                .chat_player_ids(chat_id)
                .iter()
                .filter_map(|id| state.players.get(id).cloned())
                .collect(),
            None => state.players.values().cloned().collect(),
        };
        Ok(state.rating(players, limit))
    }
}

/// Transaction over a [`MemoryStore`]
pub struct MemoryTx {
    store: MemoryStore,
    locks: HashMap<ChatId, OwnedMutexGuard<()>>,
    player_locks: BTreeMap<i64, OwnedMutexGuard<()>>,
    journal: Vec<Undo>,
    finished: bool,
}

impl MemoryTx {
    async fn lock_chat(&mut self, chat_id: ChatId) -> StoreResult<()> {
        if self.locks.contains_key(&chat_id) {
            return Ok(());
        }
        let lock = self.store.chat_lock(chat_id);
        let guard = with_lock_timeout(async { Ok::<_, StoreError>(lock.lock_owned().await) }).await?;
        self.locks.insert(chat_id, guard);
        Ok(())
    }

    async fn lock_player(&mut self, player_id: i64) -> StoreResult<()> {
        if self.player_locks.contains_key(&player_id) {
            return Ok(());
        }
        if let Some(&held) = self.player_locks.keys().next_back() {
            if held > player_id {
                return Err(StoreError::LockOrder {
                    held,
                    requested: player_id,
                });
            }
        }

        let lock = self.store.player_lock(player_id);
        let guard = with_lock_timeout(async { Ok::<_, StoreError>(lock.lock_owned().await) }).await?;
        self.player_locks.insert(player_id, guard);
        Ok(())
    }

    fn undo(&mut self) {
        let journal = std::mem::take(&mut self.journal);
        let mut state = self.store.state();
        for entry in journal.into_iter().rev() {
            match entry {
                Undo::Session(session) => {
                    state.sessions.insert(session.id, session);
                }
                Undo::Participant(row) => {
                    state.participants.insert(row.id, row);
                }
                Undo::Balance { player_id, delta } => {
                    if let Some(player) = state.players.get_mut(&player_id) {
                        player.balance -= delta;
                    }
                }
            }
        }
    }

    fn update_session<F>(&mut self, session_id: i64, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut GameSession),
    {
        let mut state = self.store.state();
        let session = state.session_mut(session_id)?;
        self.journal.push(Undo::Session(session.clone()));
        apply(session);
        Ok(())
    }

    fn update_participant<F>(&mut self, participant_id: i64, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut ParticipantRow),
    {
        let mut state = self.store.state();
        let row = state.participant_mut(participant_id)?;
        self.journal.push(Undo::Participant(row.clone()));
        apply(row);
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.finished {
            self.undo();
        }
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn get_or_create_session(&mut self, chat_id: ChatId) -> StoreResult<GameSession> {
        let mut state = self.store.state();
        if let Ok(session) = state.session_by_chat(chat_id) {
            return Ok(session.clone());
        }

        let session = GameSession {
            id: state.next_id(),
            chat_id,
            status: SessionStatus::Sleeping,
            expected_participant_count: None,
            dealer_hand: Hand::new(),
            stopped: false,
        };
        state.session_by_chat.insert(chat_id, session.id);
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn lock_session_for_update(&mut self, chat_id: ChatId) -> StoreResult<GameSession> {
        self.lock_chat(chat_id).await?;
        let state = self.store.state();
        state.session_by_chat(chat_id).cloned()
    }

    async fn lock_participants_for_update(
        &mut self,
        session: &GameSession,
    ) -> StoreResult<Vec<Participant>> {
        self.lock_chat(session.chat_id).await?;
        let state = self.store.state();
        state
            .session_participants(session.id)
            .filter(|row| row.status != ParticipantStatus::Sleeping)
            .map(|row| state.hydrate(row))
            .collect()
    }

    async fn lock_players_for_update(&mut self, player_ids: &[i64]) -> StoreResult<()> {
        let mut ids = player_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        for player_id in ids {
            self.lock_player(player_id).await?;
        }
        Ok(())
    }

    async fn get_or_create_player(&mut self, tg_id: TgId, username: &str) -> StoreResult<Player> {
        let balance = self.store.inner.starting_balance;
        let mut state = self.store.state();
        Ok(state.get_or_create_player(tg_id, username, balance))
    }

    async fn get_or_create_participant(
        &mut self,
        tg_id: TgId,
        chat_id: ChatId,
        username: &str,
    ) -> StoreResult<Participant> {
        let balance = self.store.inner.starting_balance;
        let mut state = self.store.state();
        let session_id = state.session_by_chat(chat_id)?.id;
        let player = state.get_or_create_player(tg_id, username, balance);

        let participant_id = match state.participant_by_pair.get(&(session_id, player.id)) {
            Some(id) => *id,
            None => {
                let id = state.next_id();
                state.participants.insert(
                    id,
                    ParticipantRow {
                        id,
                        session_id,
                        player_id: player.id,
                        status: ParticipantStatus::Sleeping,
                        hand: Hand::new(),
                        bet: None,
                    },
                );
                state.participant_by_pair.insert((session_id, player.id), id);
                id
            }
        };

        let row = state
            .participants
            .get(&participant_id)
            .ok_or(StoreError::ParticipantNotFound { tg_id, chat_id })?;
        state.hydrate(row)
    }

    async fn get_participant_for_update(
        &mut self,
        tg_id: TgId,
        chat_id: ChatId,
    ) -> StoreResult<Participant> {
        self.lock_chat(chat_id).await?;
        let state = self.store.state();
        let not_found = StoreError::ParticipantNotFound { tg_id, chat_id };

        let session_id = state.session_by_chat.get(&chat_id).copied();
        let player_id = state.player_by_tg.get(&tg_id).copied();
        let (Some(session_id), Some(player_id)) = (session_id, player_id) else {
            return Err(not_found);
        };

        match state
            .participant_by_pair
            .get(&(session_id, player_id))
            .and_then(|id| state.participants.get(id))
        {
            Some(row) => state.hydrate(row),
            None => Err(not_found),
        }
    }

    async fn set_session_status(
        &mut self,
        session_id: i64,
        status: SessionStatus,
    ) -> StoreResult<()> {
        self.update_session(session_id, |s| s.status = status)
    }

    async fn set_session_expected_count(
        &mut self,
        session_id: i64,
        count: Option<i32>,
    ) -> StoreResult<()> {
        self.update_session(session_id, |s| s.expected_participant_count = count)
    }

    async fn set_session_stopped(&mut self, session_id: i64, stopped: bool) -> StoreResult<()> {
        self.update_session(session_id, |s| s.stopped = stopped)
    }

    async fn set_dealer_hand(&mut self, session_id: i64, hand: &Hand) -> StoreResult<()> {
        let hand = hand.clone();
        self.update_session(session_id, |s| s.dealer_hand = hand)
    }

    async fn set_participant_status(
        &mut self,
        participant_id: i64,
        status: ParticipantStatus,
    ) -> StoreResult<()> {
        self.update_participant(participant_id, |p| p.status = status)
    }

    async fn set_participant_bet(
        &mut self,
        participant_id: i64,
        bet: Option<i64>,
    ) -> StoreResult<()> {
        self.update_participant(participant_id, |p| p.bet = bet)
    }

    async fn set_participant_hand(&mut self, participant_id: i64, hand: &Hand) -> StoreResult<()> {
        let hand = hand.clone();
        self.update_participant(participant_id, |p| p.hand = hand)
    }

    async fn adjust_balance(&mut self, player_id: i64, delta: i64) -> StoreResult<i64> {
        self.lock_player(player_id).await?;
        let mut state = self.store.state();
        let balance = credit(state.player_mut(player_id)?, delta)?;
        self.journal.push(Undo::Balance { player_id, delta });
        Ok(balance)
    }

    async fn withdraw_stake(&mut self, player_id: i64, amount: i64) -> StoreResult<Option<i64>> {
        if amount <= 0 {
            return Err(StoreError::InvalidAmount(amount));
        }

        self.lock_player(player_id).await?;
        let mut state = self.store.state();
        let player = state.player_mut(player_id)?;
        if player.balance < amount {
            return Ok(None);
        }
        player.balance -= amount;
        let balance = player.balance;
        self.journal.push(Undo::Balance {
            player_id,
            delta: -amount,
        });
        Ok(Some(balance))
    }

    async fn is_bet_count_reached(&mut self, session: &GameSession) -> StoreResult<bool> {
        let Some(expected) = session.expected_participant_count else {
            return Ok(false);
        };
        let state = self.store.state();
        let active = state
            .session_participants(session.id)
            .filter(|row| row.status == ParticipantStatus::Active)
            .count();
        Ok(active >= usize::try_from(expected).unwrap_or(0))
    }

    async fn reset_round(&mut self, session_id: i64) -> StoreResult<()> {
        self.update_session(session_id, |s| {
            s.dealer_hand = Hand::new();
            s.expected_participant_count = None;
        })?;

        let ids: Vec<i64> = {
            let state = self.store.state();
            state
                .session_participants(session_id)
                .map(|row| row.id)
                .collect()
        };
        for id in ids {
            self.update_participant(id, |p| {
                p.bet = None;
                p.hand = Hand::new();
                p.status = ParticipantStatus::Sleeping;
            })?;
        }
        Ok(())
    }

    async fn round_participants(&mut self, session_id: i64) -> StoreResult<Vec<Participant>> {
        let state = self.store.state();
        state
            .session_participants(session_id)
            .filter(|row| row.bet.is_some())
            .map(|row| state.hydrate(row))
            .collect()
    }

    async fn chat_players(&mut self, chat_id: ChatId) -> StoreResult<Vec<Player>> {
        let state = self.store.state();
        let players = state
            .chat_player_ids(chat_id)
            .iter()
            .filter_map(|id| state.players.get(id).cloned())
            .collect();
        Ok(state.rating(players, None))
    }

    async fn commit(mut self) -> StoreResult<()> {
        self.finished = true;
        self.journal.clear();
        Ok(())
    }

    async fn rollback(mut self) -> StoreResult<()> {
        self.undo();
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const CHAT: ChatId = -1001;

    #[tokio::test]
    async fn test_session_created_once_per_chat() {
        let store = MemoryStore::default();
        let mut tx = store.begin().await.unwrap();
        let first = tx.get_or_create_session(CHAT).await.unwrap();
        let second = tx.get_or_create_session(CHAT).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.status, SessionStatus::Sleeping);
    }

    #[tokio::test]
    async fn test_new_player_gets_starting_balance() {
        let store = MemoryStore::new(500);
        let mut tx = store.begin().await.unwrap();
        let player = tx.get_or_create_player(7, "alice").await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(player.balance, 500);
        assert_eq!(store.player(7).unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_missing_session_lock_is_not_found() {
        let store = MemoryStore::default();
        let mut tx = store.begin().await.unwrap();
        let err = tx.lock_session_for_update(CHAT).await.unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(CHAT)));
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::default();
        let mut tx = store.begin().await.unwrap();
        let session = tx.get_or_create_session(CHAT).await.unwrap();
        let participant = tx.get_or_create_participant(1, CHAT, "bob").await.unwrap();
        tx.commit().await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_session_for_update(CHAT).await.unwrap();
            tx.set_session_status(session.id, SessionStatus::Polling)
                .await
                .unwrap();
            tx.set_participant_bet(participant.id, Some(100))
                .await
                .unwrap();
            tx.withdraw_stake(participant.player.id, 100).await.unwrap();
        }

        assert_eq!(store.session(CHAT).unwrap().status, SessionStatus::Sleeping);
        let participants = store.participants(CHAT);
        assert_eq!(participants[0].bet, None);
        assert_eq!(participants[0].player.balance, DEFAULT_STARTING_BALANCE);
    }

    #[tokio::test]
    async fn test_withdraw_stake_refuses_overdraft() {
        let store = MemoryStore::new(50);
        let mut tx = store.begin().await.unwrap();
        let player = tx.get_or_create_player(1, "carol").await.unwrap();

        assert_eq!(tx.withdraw_stake(player.id, 80).await.unwrap(), None);
        assert_eq!(tx.withdraw_stake(player.id, 50).await.unwrap(), Some(0));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_session_lock_blocks_second_transaction() {
        let store = MemoryStore::default();
        let mut setup = store.begin().await.unwrap();
        setup.get_or_create_session(CHAT).await.unwrap();
        setup.commit().await.unwrap();

        let mut holder = store.begin().await.unwrap();
        holder.lock_session_for_update(CHAT).await.unwrap();

        let contender = store.clone();
        let waiting = tokio::spawn(async move {
            let mut tx = contender.begin().await.unwrap();
            tx.lock_session_for_update(CHAT).await.unwrap();
            tx.commit().await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        holder.commit().await.unwrap();
        waiting.await.unwrap();
    }

    #[tokio::test]
    async fn test_money_rating_sorted_and_limited() {
        let store = MemoryStore::new(100);
        let mut tx = store.begin().await.unwrap();
        tx.get_or_create_session(CHAT).await.unwrap();
        for (tg_id, name) in [(1, "a"), (2, "b"), (3, "c")] {
            tx.get_or_create_participant(tg_id, CHAT, name).await.unwrap();
        }
        let b = tx.get_or_create_player(2, "b").await.unwrap();
        tx.adjust_balance(b.id, 50).await.unwrap();
        tx.commit().await.unwrap();

        let rating = store.money_rating(Some(CHAT), Some(2)).await.unwrap();
        assert_eq!(rating.len(), 2);
        assert_eq!(rating[0].username, "b");
        assert_eq!(rating[0].balance, 150);

        let everyone = store.money_rating(None, None).await.unwrap();
        assert_eq!(everyone.len(), 3);
    }

    #[tokio::test]
    async fn test_player_rows_lock_in_ascending_order() {
        let store = MemoryStore::default();
        let mut setup = store.begin().await.unwrap();
        let a = setup.get_or_create_player(1, "a").await.unwrap();
        let b = setup.get_or_create_player(2, "b").await.unwrap();
        setup.commit().await.unwrap();

        let mut holder = store.begin().await.unwrap();
        holder.lock_players_for_update(&[b.id, a.id]).await.unwrap();
        holder.adjust_balance(b.id, 10).await.unwrap();
        holder.adjust_balance(a.id, 10).await.unwrap();

        let contender = store.clone();
        let a_id = a.id;
        let waiting = tokio::spawn(async move {
            let mut tx = contender.begin().await.unwrap();
            tx.adjust_balance(a_id, 5).await.unwrap();
            tx.commit().await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        holder.commit().await.unwrap();
        waiting.await.unwrap();
        assert_eq!(store.player(1).unwrap().balance, DEFAULT_STARTING_BALANCE + 15);
    }

    #[tokio::test]
    async fn test_out_of_order_player_lock_is_refused() {
        let store = MemoryStore::default();
        let mut tx = store.begin().await.unwrap();
        let a = tx.get_or_create_player(1, "a").await.unwrap();
        let b = tx.get_or_create_player(2, "b").await.unwrap();

        tx.adjust_balance(b.id, 10).await.unwrap();
        let err = tx.adjust_balance(a.id, 10).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::LockOrder { held, requested } if held == b.id && requested == a.id
        ));
    }

    #[tokio::test]
    async fn test_balance_overflow_is_invalid_amount() {
        let store = MemoryStore::new(i64::MAX - 10);
        let mut tx = store.begin().await.unwrap();
        let player = tx.get_or_create_player(1, "rich").await.unwrap();

        let err = tx.adjust_balance(player.id, 11).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidAmount(11)));
        assert_eq!(tx.adjust_balance(player.id, 10).await.unwrap(), i64::MAX);
        tx.commit().await.unwrap();

        let err = store.top_up_balance("rich", 1).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidAmount(1)));
        assert_eq!(store.player(1).unwrap().balance, i64::MAX);
    }

    #[tokio::test]
    async fn test_top_up_unknown_player() {
        let store = MemoryStore::default();
        let err = store.top_up_balance("ghost", 10).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
