//! Repository traits over the session store and their PostgreSQL implementation.
//!
//! [`GameStore`] hands out transactions and answers the admin queries that
//! don't need one. [`StoreTx`] carries every operation the game engine runs;
//! committing makes its effects visible, dropping it rolls them back.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};

use super::errors::{StoreError, StoreResult};
use super::timeouts::{DEFAULT_QUERY_TIMEOUT, with_lock_timeout, with_timeout};
use crate::game::cards::Hand;
use crate::game::models::{
    ChatId, GameSession, Participant, ParticipantStatus, Player, SessionStatus, TgId,
};

/// Entry point of the session store
#[async_trait]
pub trait GameStore: Send + Sync + 'static {
    type Tx: StoreTx;

    /// Open a transaction
    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Credit `amount` to the player with the given display name
    async fn top_up_balance(&self, username: &str, amount: i64) -> StoreResult<Player>;

    /// Players sorted by balance, highest first, optionally restricted to one
    /// chat and truncated to `limit` rows
    async fn money_rating(
        &self,
        chat_id: Option<ChatId>,
        limit: Option<i64>,
    ) -> StoreResult<Vec<Player>>;
}

/// Operations running inside one store transaction
#[async_trait]
pub trait StoreTx: Send {
    /// Existing session for the chat or a new sleeping one
    async fn get_or_create_session(&mut self, chat_id: ChatId) -> StoreResult<GameSession>;

    /// Exclusive lock on the chat's session row until the transaction ends
    async fn lock_session_for_update(&mut self, chat_id: ChatId) -> StoreResult<GameSession>;

    /// Lock every non-resting participant of the session, in turn order
    async fn lock_participants_for_update(
        &mut self,
        session: &GameSession,
    ) -> StoreResult<Vec<Participant>>;

    /// Lock the given player rows in ascending id order
    ///
    /// Balance changes later in the transaction must only touch rows locked
    /// here, so two chats sharing players always queue on the same row first.
    async fn lock_players_for_update(&mut self, player_ids: &[i64]) -> StoreResult<()>;

    /// Existing player or a new one holding the starting balance
    async fn get_or_create_player(&mut self, tg_id: TgId, username: &str) -> StoreResult<Player>;

    /// Existing participant regardless of status, or a new resting one
    async fn get_or_create_participant(
        &mut self,
        tg_id: TgId,
        chat_id: ChatId,
        username: &str,
    ) -> StoreResult<Participant>;

    /// Locked read of a participant
    async fn get_participant_for_update(
        &mut self,
        tg_id: TgId,
        chat_id: ChatId,
    ) -> StoreResult<Participant>;

    async fn set_session_status(&mut self, session_id: i64, status: SessionStatus)
    -> StoreResult<()>;

    async fn set_session_expected_count(
        &mut self,
        session_id: i64,
        count: Option<i32>,
    ) -> StoreResult<()>;

    async fn set_session_stopped(&mut self, session_id: i64, stopped: bool) -> StoreResult<()>;

    async fn set_dealer_hand(&mut self, session_id: i64, hand: &Hand) -> StoreResult<()>;

    async fn set_participant_status(
        &mut self,
        participant_id: i64,
        status: ParticipantStatus,
    ) -> StoreResult<()>;

    async fn set_participant_bet(&mut self, participant_id: i64, bet: Option<i64>)
    -> StoreResult<()>;

    async fn set_participant_hand(&mut self, participant_id: i64, hand: &Hand) -> StoreResult<()>;

    /// Add `delta` to a balance and return the new balance
    async fn adjust_balance(&mut self, player_id: i64, delta: i64) -> StoreResult<i64>;

    /// Debit `amount` only if the balance covers it; `None` when it doesn't
    async fn withdraw_stake(&mut self, player_id: i64, amount: i64) -> StoreResult<Option<i64>>;

    /// Whether the number of active participants reached the expected count
    async fn is_bet_count_reached(&mut self, session: &GameSession) -> StoreResult<bool>;

    /// Clear the dealer hand, expected count and every participant's round state
    async fn reset_round(&mut self, session_id: i64) -> StoreResult<()>;

    /// Participants holding a bet from the current or last round, in turn order
    async fn round_participants(&mut self, session_id: i64) -> StoreResult<Vec<Participant>>;

    /// Players who ever joined the chat, richest first
    async fn chat_players(&mut self, chat_id: ChatId) -> StoreResult<Vec<Player>>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

const SESSION_COLUMNS: &str =
    "id, chat_id, status, expected_participant_count, dealer_hand, stopped";

const PLAYER_COLUMNS: &str = "id, tg_id, username, balance";

const PARTICIPANT_SELECT: &str = "SELECT p.id, p.session_id, p.status, p.hand, p.bet,
            pl.id AS player_id, pl.tg_id, pl.username, pl.balance
     FROM participants p
     JOIN players pl ON pl.id = p.player_id";

fn session_from_row(row: &PgRow) -> StoreResult<GameSession> {
    let status: String = row.try_get("status")?;
    let dealer_hand: Json<Hand> = row.try_get("dealer_hand")?;

    Ok(GameSession {
        id: row.try_get("id")?,
        chat_id: row.try_get("chat_id")?,
        status: status.parse()?,
        expected_participant_count: row.try_get("expected_participant_count")?,
        dealer_hand: dealer_hand.0,
        stopped: row.try_get("stopped")?,
    })
}

fn player_from_row(row: &PgRow, id_column: &str) -> StoreResult<Player> {
    Ok(Player {
        id: row.try_get(id_column)?,
        tg_id: row.try_get("tg_id")?,
        username: row.try_get("username")?,
        balance: row.try_get("balance")?,
    })
}

fn participant_from_row(row: &PgRow) -> StoreResult<Participant> {
    let status: String = row.try_get("status")?;
    let hand: Json<Hand> = row.try_get("hand")?;

    Ok(Participant {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        player: player_from_row(row, "player_id")?,
        status: status.parse()?,
        hand: hand.0,
        bet: row.try_get("bet")?,
    })
}

fn expect_one_row(rows_affected: u64, table: &'static str, id: i64) -> StoreResult<()> {
    if rows_affected == 0 {
        Err(StoreError::RowVanished { table, id })
    } else {
        Ok(())
    }
}

/// PostgreSQL implementation of [`GameStore`]
#[derive(Clone)]
pub struct PgGameStore {
    pool: PgPool,
    starting_balance: i64,
}

impl PgGameStore {
    pub fn new(pool: PgPool, starting_balance: i64) -> Self {
        Self {
            pool,
            starting_balance,
        }
    }
}

#[async_trait]
impl GameStore for PgGameStore {
    type Tx = PgStoreTx;

    async fn begin(&self) -> StoreResult<PgStoreTx> {
        let tx = with_timeout(DEFAULT_QUERY_TIMEOUT, self.pool.begin()).await?;
        Ok(PgStoreTx {
            tx,
            starting_balance: self.starting_balance,
        })
    }

    async fn top_up_balance(&self, username: &str, amount: i64) -> StoreResult<Player> {
        if amount <= 0 {
            return Err(StoreError::InvalidAmount(amount));
        }

        let row = sqlx::query(&format!(
            "UPDATE players SET balance = balance + $1
             WHERE id = (SELECT id FROM players WHERE username = $2 ORDER BY id LIMIT 1)
             RETURNING {PLAYER_COLUMNS}"
        ))
        .bind(amount)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => player_from_row(&row, "id"),
            None => Err(StoreError::PlayerNotFound(username.to_string())),
        }
    }

    async fn money_rating(
        &self,
        chat_id: Option<ChatId>,
        limit: Option<i64>,
    ) -> StoreResult<Vec<Player>> {
        let rows = match chat_id {
            Some(chat_id) => {
                sqlx::query(
                    "SELECT pl.id, pl.tg_id, pl.username, pl.balance
                     FROM players pl
                     JOIN participants p ON p.player_id = pl.id
                     JOIN game_sessions s ON s.id = p.session_id
                     WHERE s.chat_id = $1
                     ORDER BY pl.balance DESC, pl.id
                     LIMIT $2",
                )
                .bind(chat_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {PLAYER_COLUMNS} FROM players ORDER BY balance DESC, id LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(|row| player_from_row(row, "id")).collect()
    }
}

/// A PostgreSQL transaction; rolled back by sqlx when dropped uncommitted
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
    starting_balance: i64,
}

impl PgStoreTx {
    async fn find_session(&mut self, chat_id: ChatId) -> StoreResult<GameSession> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM game_sessions WHERE chat_id = $1"
        ))
        .bind(chat_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => session_from_row(&row),
            None => Err(StoreError::SessionNotFound(chat_id)),
        }
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn get_or_create_session(&mut self, chat_id: ChatId) -> StoreResult<GameSession> {
        sqlx::query("INSERT INTO game_sessions (chat_id) VALUES ($1) ON CONFLICT (chat_id) DO NOTHING")
            .bind(chat_id)
            .execute(&mut *self.tx)
            .await?;

        self.find_session(chat_id).await
    }

    async fn lock_session_for_update(&mut self, chat_id: ChatId) -> StoreResult<GameSession> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM game_sessions WHERE chat_id = $1 FOR UPDATE");
        let row = with_lock_timeout(
            sqlx::query(&query)
                .bind(chat_id)
                .fetch_optional(&mut *self.tx),
        )
        .await?;

        match row {
            Some(row) => session_from_row(&row),
            None => Err(StoreError::SessionNotFound(chat_id)),
        }
    }

    async fn lock_participants_for_update(
        &mut self,
        session: &GameSession,
    ) -> StoreResult<Vec<Participant>> {
        let query = format!(
            "{PARTICIPANT_SELECT}
             WHERE p.session_id = $1 AND p.status <> 'sleeping'
             ORDER BY p.id
             FOR UPDATE OF p"
        );
        let rows = with_lock_timeout(
            sqlx::query(&query)
                .bind(session.id)
                .fetch_all(&mut *self.tx),
        )
        .await?;

        rows.iter().map(participant_from_row).collect()
    }

    async fn lock_players_for_update(&mut self, player_ids: &[i64]) -> StoreResult<()> {
        let mut ids = player_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(());
        }

        // ORDER BY runs below the row locking, so rows are locked in id order.
        with_lock_timeout(
            sqlx::query("SELECT id FROM players WHERE id = ANY($1) ORDER BY id FOR UPDATE")
                .bind(ids)
                .fetch_all(&mut *self.tx),
        )
        .await?;
        Ok(())
    }

    async fn get_or_create_player(&mut self, tg_id: TgId, username: &str) -> StoreResult<Player> {
        sqlx::query(
            "INSERT INTO players (tg_id, username, balance) VALUES ($1, $2, $3)
             ON CONFLICT (tg_id) DO NOTHING",
        )
        .bind(tg_id)
        .bind(username)
        .bind(self.starting_balance)
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query(&format!("SELECT {PLAYER_COLUMNS} FROM players WHERE tg_id = $1"))
            .bind(tg_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => player_from_row(&row, "id"),
            None => Err(StoreError::PlayerNotFound(tg_id.to_string())),
        }
    }

    async fn get_or_create_participant(
        &mut self,
        tg_id: TgId,
        chat_id: ChatId,
        username: &str,
    ) -> StoreResult<Participant> {
        let session = self.find_session(chat_id).await?;
        let player = self.get_or_create_player(tg_id, username).await?;

        sqlx::query(
            "INSERT INTO participants (session_id, player_id) VALUES ($1, $2)
             ON CONFLICT (session_id, player_id) DO NOTHING",
        )
        .bind(session.id)
        .bind(player.id)
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query(&format!(
            "{PARTICIPANT_SELECT} WHERE p.session_id = $1 AND p.player_id = $2"
        ))
        .bind(session.id)
        .bind(player.id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => participant_from_row(&row),
            None => Err(StoreError::ParticipantNotFound { tg_id, chat_id }),
        }
    }

    async fn get_participant_for_update(
        &mut self,
        tg_id: TgId,
        chat_id: ChatId,
    ) -> StoreResult<Participant> {
        let query = format!(
            "{PARTICIPANT_SELECT}
             JOIN game_sessions s ON s.id = p.session_id
             WHERE pl.tg_id = $1 AND s.chat_id = $2
             FOR UPDATE OF p"
        );
        let row = with_lock_timeout(
            sqlx::query(&query)
                .bind(tg_id)
                .bind(chat_id)
                .fetch_optional(&mut *self.tx),
        )
        .await?;

        match row {
            Some(row) => participant_from_row(&row),
            None => Err(StoreError::ParticipantNotFound { tg_id, chat_id }),
        }
    }

    async fn set_session_status(
        &mut self,
        session_id: i64,
        status: SessionStatus,
    ) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE game_sessions SET status = $1, updated_at = NOW() WHERE id = $2")
                .bind(status.as_str())
                .bind(session_id)
                .execute(&mut *self.tx)
                .await?;

        expect_one_row(result.rows_affected(), "game_sessions", session_id)
    }

    async fn set_session_expected_count(
        &mut self,
        session_id: i64,
        count: Option<i32>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE game_sessions SET expected_participant_count = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(count)
        .bind(session_id)
        .execute(&mut *self.tx)
        .await?;

        expect_one_row(result.rows_affected(), "game_sessions", session_id)
    }

    async fn set_session_stopped(&mut self, session_id: i64, stopped: bool) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE game_sessions SET stopped = $1, updated_at = NOW() WHERE id = $2")
                .bind(stopped)
                .bind(session_id)
                .execute(&mut *self.tx)
                .await?;

        expect_one_row(result.rows_affected(), "game_sessions", session_id)
    }

    async fn set_dealer_hand(&mut self, session_id: i64, hand: &Hand) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE game_sessions SET dealer_hand = $1, updated_at = NOW() WHERE id = $2")
                .bind(Json(hand))
                .bind(session_id)
                .execute(&mut *self.tx)
                .await?;

        expect_one_row(result.rows_affected(), "game_sessions", session_id)
    }

    async fn set_participant_status(
        &mut self,
        participant_id: i64,
        status: ParticipantStatus,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE participants SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(participant_id)
            .execute(&mut *self.tx)
            .await?;

        expect_one_row(result.rows_affected(), "participants", participant_id)
    }

    async fn set_participant_bet(
        &mut self,
        participant_id: i64,
        bet: Option<i64>,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE participants SET bet = $1 WHERE id = $2")
            .bind(bet)
            .bind(participant_id)
            .execute(&mut *self.tx)
            .await?;

        expect_one_row(result.rows_affected(), "participants", participant_id)
    }

    async fn set_participant_hand(&mut self, participant_id: i64, hand: &Hand) -> StoreResult<()> {
        let result = sqlx::query("UPDATE participants SET hand = $1 WHERE id = $2")
            .bind(Json(hand))
            .bind(participant_id)
            .execute(&mut *self.tx)
            .await?;

        expect_one_row(result.rows_affected(), "participants", participant_id)
    }

    async fn adjust_balance(&mut self, player_id: i64, delta: i64) -> StoreResult<i64> {
        let row =
            sqlx::query("UPDATE players SET balance = balance + $1 WHERE id = $2 RETURNING balance")
                .bind(delta)
                .bind(player_id)
                .fetch_optional(&mut *self.tx)
                .await?;

        match row {
            Some(row) => Ok(row.try_get("balance")?),
            None => Err(StoreError::RowVanished {
                table: "players",
                id: player_id,
            }),
        }
    }

    async fn withdraw_stake(&mut self, player_id: i64, amount: i64) -> StoreResult<Option<i64>> {
        if amount <= 0 {
            return Err(StoreError::InvalidAmount(amount));
        }

        // Check and debit in a single statement so concurrent debits can't overdraw.
        let row = sqlx::query(
            "UPDATE players SET balance = balance - $1
             WHERE id = $2 AND balance >= $1
             RETURNING balance",
        )
        .bind(amount)
        .bind(player_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = row {
            return Ok(Some(row.try_get("balance")?));
        }

        let exists = sqlx::query("SELECT 1 FROM players WHERE id = $1")
            .bind(player_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        match exists {
            Some(_) => Ok(None),
            None => Err(StoreError::RowVanished {
                table: "players",
                id: player_id,
            }),
        }
    }

    async fn is_bet_count_reached(&mut self, session: &GameSession) -> StoreResult<bool> {
        let Some(expected) = session.expected_participant_count else {
            return Ok(false);
        };

        let row = sqlx::query(
            "SELECT COUNT(*) AS active FROM participants WHERE session_id = $1 AND status = 'active'",
        )
        .bind(session.id)
        .fetch_one(&mut *self.tx)
        .await?;

        let active: i64 = row.try_get("active")?;
        Ok(active >= i64::from(expected))
    }

    async fn reset_round(&mut self, session_id: i64) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE game_sessions
             SET dealer_hand = '[]'::jsonb, expected_participant_count = NULL, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(session_id)
        .execute(&mut *self.tx)
        .await?;
        expect_one_row(result.rows_affected(), "game_sessions", session_id)?;

        sqlx::query(
            "UPDATE participants SET bet = NULL, hand = '[]'::jsonb, status = 'sleeping'
             WHERE session_id = $1",
        )
        .bind(session_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn round_participants(&mut self, session_id: i64) -> StoreResult<Vec<Participant>> {
        let rows = sqlx::query(&format!(
            "{PARTICIPANT_SELECT} WHERE p.session_id = $1 AND p.bet IS NOT NULL ORDER BY p.id"
        ))
        .bind(session_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(participant_from_row).collect()
    }

    async fn chat_players(&mut self, chat_id: ChatId) -> StoreResult<Vec<Player>> {
        let rows = sqlx::query(
            "SELECT pl.id, pl.tg_id, pl.username, pl.balance
             FROM players pl
             JOIN participants p ON p.player_id = pl.id
             JOIN game_sessions s ON s.id = p.session_id
             WHERE s.chat_id = $1
             ORDER BY pl.balance DESC, pl.id",
        )
        .bind(chat_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(|row| player_from_row(row, "id")).collect()
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
