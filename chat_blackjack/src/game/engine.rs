//! Session and turn state machine.
//!
//! Every entry point runs inside the caller's [`StoreTx`] and starts by
//! locking the chat's session row, so events for one chat apply one at a
//! time no matter which worker picked them up. Entry points return the
//! notices to deliver after commit, or [`GameError::InvalidTransition`] when
//! the event doesn't apply to the current state.
//!
//! Session lifecycle:
//!
//! ```text
//! SLEEPING -> WAITING_FOR_COUNT -> WAITING_FOR_USERS -> POLLING -> SLEEPING
//! ```
//!
//! The `stopped` flag is orthogonal: it freezes bets and turns until resumed.
//!
//! Entry points that may move money lock the player rows of the whole round
//! up front, in ascending id order, before the first balance change. Credits
//! applied afterwards only touch rows already held.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::cards::{BLACKJACK, CardSource, Hand};
use super::errors::{GameError, GameResult};
use super::models::{ChatId, GameSession, Participant, ParticipantStatus, SessionStatus, TgId};
use super::notices::{Notice, TemplateKey};
use super::rules::{GameRules, Outcome};
use crate::db::{StoreError, StoreTx};

/// Balance credits gathered during one operation.
#[derive(Debug, Default)]
struct Credits(BTreeMap<i64, i64>);

impl Credits {
    fn add(&mut self, player_id: i64, amount: i64) -> GameResult<()> {
        if amount > 0 {
            let entry = self.0.entry(player_id).or_insert(0);
            *entry = entry
                .checked_add(amount)
                .ok_or(StoreError::InvalidAmount(amount))?;
        }
        Ok(())
    }

    fn total(&self) -> i64 {
        self.0.values().fold(0, |sum, amount| sum.saturating_add(*amount))
    }

    /// Apply every credit and return the resulting balances.
    async fn apply<T: StoreTx>(self, tx: &mut T) -> GameResult<BTreeMap<i64, i64>> {
        let mut balances = BTreeMap::new();
        for (player_id, amount) in self.0 {
            let balance = tx.adjust_balance(player_id, amount).await?;
            balances.insert(player_id, balance);
        }
        Ok(balances)
    }
}

fn balance_after(balances: &BTreeMap<i64, i64>, participant: &Participant) -> i64 {
    balances
        .get(&participant.player.id)
        .copied()
        .unwrap_or(participant.player.balance)
}

fn turn_prompt(participant: &Participant) -> Vec<Notice> {
    vec![
        Notice::text(format!(
            "{}, your turn. Your hand: {}",
            participant.name(),
            participant.hand
        )),
        Notice::Prompt(TemplateKey::GetCardOrEnough),
    ]
}

fn ensure_turn(session: &GameSession, participant: &Participant) -> GameResult<()> {
    if session.stopped {
        return Err(GameError::InvalidTransition("the game is paused"));
    }
    if session.status != SessionStatus::Polling || participant.status != ParticipantStatus::Polling
    {
        return Err(GameError::InvalidTransition("not this participant's turn"));
    }
    Ok(())
}

/// Blackjack state machine shared by all workers
pub struct BlackjackEngine {
    rules: GameRules,
    cards: Arc<dyn CardSource>,
}

impl BlackjackEngine {
    pub fn new(rules: GameRules, cards: Arc<dyn CardSource>) -> Self {
        Self { rules, cards }
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// Open a new round and ask for the number of players.
    pub async fn start<T: StoreTx>(&self, tx: &mut T, chat_id: ChatId) -> GameResult<Vec<Notice>> {
        tx.get_or_create_session(chat_id).await?;
        let session = tx.lock_session_for_update(chat_id).await?;

        if session.stopped {
            return Ok(vec![Notice::text(
                "The game is paused. Send /continue to resume it.",
            )]);
        }
        if session.status != SessionStatus::Sleeping {
            return Ok(vec![Notice::text("A game is already in progress.")]);
        }

        tx.reset_round(session.id).await?;
        tx.set_session_status(session.id, SessionStatus::WaitingForCount)
            .await?;
        log::info!("Chat {chat_id}: round opened");

        Ok(vec![Notice::Prompt(TemplateKey::PlayerNumSetting)])
    }

    /// Record how many players the round waits for.
    pub async fn set_participant_count<T: StoreTx>(
        &self,
        tx: &mut T,
        chat_id: ChatId,
        count: i32,
    ) -> GameResult<Vec<Notice>> {
        let session = tx.lock_session_for_update(chat_id).await?;

        if session.stopped || session.status != SessionStatus::WaitingForCount {
            return Err(GameError::InvalidTransition(
                "the player count is only chosen right after /start",
            ));
        }
        if !self.rules.accepts_participant_count(count) {
            return Err(GameError::InvalidTransition("player count out of range"));
        }

        tx.set_session_expected_count(session.id, Some(count))
            .await?;
        tx.set_session_status(session.id, SessionStatus::WaitingForUsers)
            .await?;

        Ok(vec![
            Notice::text(format!("Number of players: {count}")),
            Notice::Prompt(TemplateKey::Inviting),
        ])
    }

    /// Take a bet; deals once the expected number of players has bet.
    pub async fn place_bet<T: StoreTx>(
        &self,
        tx: &mut T,
        chat_id: ChatId,
        tg_id: TgId,
        username: &str,
        amount: i64,
    ) -> GameResult<Vec<Notice>> {
        let session = tx.lock_session_for_update(chat_id).await?;

        if session.stopped || session.status != SessionStatus::WaitingForUsers {
            return Err(GameError::InvalidTransition(
                "bets are only taken while gathering players",
            ));
        }
        if amount <= 0 {
            return Err(GameError::InvalidTransition("bet must be positive"));
        }

        let participant = tx
            .get_or_create_participant(tg_id, chat_id, username)
            .await?;
        if participant.status != ParticipantStatus::Sleeping {
            return Err(GameError::InvalidTransition("participant already placed a bet"));
        }
        self.rules.check_bet(amount)?;

        self.lock_round_players(tx, &session, Some(participant.player.id))
            .await?;

        let Some(balance) = tx.withdraw_stake(participant.player.id, amount).await? else {
            return Ok(vec![Notice::text(format!(
                "{}, your balance of {} doesn't cover a bet of {amount}",
                participant.name(),
                participant.player.balance
            ))]);
        };

        tx.set_participant_bet(participant.id, Some(amount)).await?;
        tx.set_participant_status(participant.id, ParticipantStatus::Active)
            .await?;
        log::debug!(
            "Chat {chat_id}: player {} bet {amount}",
            participant.player.tg_id
        );

        let mut notices = vec![Notice::text(format!(
            "{} bets {amount} (balance: {balance})",
            participant.name()
        ))];

        if tx.is_bet_count_reached(&session).await? {
            notices.extend(self.deal(tx, &session).await?);
        }

        Ok(notices)
    }

    /// Give the participant whose turn it is one more card.
    pub async fn draw<T: StoreTx>(
        &self,
        tx: &mut T,
        chat_id: ChatId,
        tg_id: TgId,
    ) -> GameResult<Vec<Notice>> {
        let session = tx.lock_session_for_update(chat_id).await?;
        let participant = tx.get_participant_for_update(tg_id, chat_id).await?;
        ensure_turn(&session, &participant)?;
        self.lock_round_players(tx, &session, None).await?;

        let card = self.cards.draw();
        let mut hand = participant.hand.clone();
        hand.push(card);
        tx.set_participant_hand(participant.id, &hand).await?;

        let value = hand.value();
        if value < BLACKJACK {
            return Ok(vec![
                Notice::text(format!("{} draws {card}: {hand}", participant.name())),
                Notice::Prompt(TemplateKey::GetCardOrEnough),
            ]);
        }

        tx.set_participant_status(participant.id, ParticipantStatus::Assembled)
            .await?;

        let mut notices = Vec::new();
        if value > BLACKJACK {
            notices.push(Notice::text(format!(
                "{} draws {card}: {hand}. Bust!",
                participant.name()
            )));
        } else {
            let bonus = self.rules.blackjack_bonus(participant.stake())?;
            let mut credits = Credits::default();
            credits.add(participant.player.id, bonus)?;
            let balances = credits.apply(tx).await?;
            notices.push(Notice::text(format!(
                "{} draws {card}: {hand}. Blackjack! +{bonus} (balance: {})",
                participant.name(),
                balance_after(&balances, &participant)
            )));
        }

        notices.extend(self.advance_turn(tx, &session).await?);
        Ok(notices)
    }

    /// End the turn of the participant whose turn it is.
    pub async fn stand<T: StoreTx>(
        &self,
        tx: &mut T,
        chat_id: ChatId,
        tg_id: TgId,
    ) -> GameResult<Vec<Notice>> {
        let session = tx.lock_session_for_update(chat_id).await?;
        let participant = tx.get_participant_for_update(tg_id, chat_id).await?;
        ensure_turn(&session, &participant)?;
        self.lock_round_players(tx, &session, None).await?;

        tx.set_participant_status(participant.id, ParticipantStatus::Assembled)
            .await?;

        let mut notices = vec![Notice::text(format!(
            "{} stands with {}",
            participant.name(),
            participant.hand
        ))];
        notices.extend(self.advance_turn(tx, &session).await?);
        Ok(notices)
    }

    /// Pause a running game.
    pub async fn stop<T: StoreTx>(&self, tx: &mut T, chat_id: ChatId) -> GameResult<Vec<Notice>> {
        tx.get_or_create_session(chat_id).await?;
        let session = tx.lock_session_for_update(chat_id).await?;

        if session.status == SessionStatus::Sleeping || session.stopped {
            return Ok(vec![Notice::text("There is no running game to stop.")]);
        }

        tx.set_session_stopped(session.id, true).await?;
        log::info!("Chat {chat_id}: game paused in {}", session.status);

        Ok(vec![Notice::text(
            "Game paused. Send /continue to resume it.",
        )])
    }

    /// Clear the pause flag and repeat whatever the session is waiting for.
    pub async fn resume<T: StoreTx>(
        &self,
        tx: &mut T,
        chat_id: ChatId,
    ) -> GameResult<Vec<Notice>> {
        tx.get_or_create_session(chat_id).await?;
        let session = tx.lock_session_for_update(chat_id).await?;

        let mut notices = Vec::new();
        if session.stopped {
            tx.set_session_stopped(session.id, false).await?;
            log::info!("Chat {chat_id}: game resumed in {}", session.status);
        }

        match session.status {
            SessionStatus::Sleeping => {
                notices.push(Notice::text(
                    "There is no game to continue. Send /start to begin one.",
                ));
            }
            SessionStatus::WaitingForCount => {
                notices.push(Notice::Prompt(TemplateKey::PlayerNumSetting));
            }
            SessionStatus::WaitingForUsers => {
                if tx.is_bet_count_reached(&session).await? {
                    self.lock_round_players(tx, &session, None).await?;
                    notices.extend(self.deal(tx, &session).await?);
                } else {
                    let bets = tx.round_participants(session.id).await?;
                    let mut lines = vec![format!(
                        "Waiting for players: {} of {}",
                        bets.len(),
                        session.expected_participant_count.unwrap_or(0)
                    )];
                    lines.extend(
                        bets.iter()
                            .map(|p| format!("{}: {}", p.name(), p.stake())),
                    );
                    notices.push(Notice::text(lines.join("\n")));
                    notices.push(Notice::Prompt(TemplateKey::Inviting));
                }
            }
            SessionStatus::Polling => {
                let participants = tx.lock_participants_for_update(&session).await?;
                match participants
                    .iter()
                    .find(|p| p.status == ParticipantStatus::Polling)
                {
                    Some(current) => notices.extend(turn_prompt(current)),
                    None => {
                        self.lock_round_players(tx, &session, None).await?;
                        notices.extend(self.advance_turn(tx, &session).await?);
                    }
                }
            }
        }

        Ok(notices)
    }

    /// Balances of everyone who played in the chat.
    pub async fn balances<T: StoreTx>(
        &self,
        tx: &mut T,
        chat_id: ChatId,
    ) -> GameResult<Vec<Notice>> {
        let players = tx.chat_players(chat_id).await?;
        if players.is_empty() {
            return Ok(vec![Notice::text("Nobody has played in this chat yet.")]);
        }

        let mut lines = vec!["Balances:".to_string()];
        lines.extend(
            players
                .iter()
                .map(|p| format!("{}: {}", p.username, p.balance)),
        );
        Ok(vec![Notice::text(lines.join("\n"))])
    }

    /// Report bets, hands and net results of the last finished round.
    pub async fn last_round<T: StoreTx>(
        &self,
        tx: &mut T,
        chat_id: ChatId,
    ) -> GameResult<Vec<Notice>> {
        let session = tx.get_or_create_session(chat_id).await?;

        if session.stopped {
            return Ok(vec![Notice::text(
                "The current round is paused. Send /continue to finish it first.",
            )]);
        }
        if session.status != SessionStatus::Sleeping {
            return Ok(vec![Notice::text(
                "A round is in progress. The report is available once it ends.",
            )]);
        }

        let participants = tx.round_participants(session.id).await?;
        if participants.is_empty() || session.dealer_hand.is_empty() {
            return Ok(vec![Notice::text("No round has been played here yet.")]);
        }

        let dealer_value = session.dealer_hand.value();
        let mut lines = vec!["Last round:".to_string()];
        for participant in &participants {
            let net =
                self.rules
                    .net_result(participant.hand.value(), dealer_value, participant.stake())?;
            lines.push(format!(
                "{}: bet {}, {} -> {net:+}",
                participant.name(),
                participant.stake(),
                participant.hand
            ));
        }
        lines.push(format!("Dealer: {}", session.dealer_hand));

        Ok(vec![Notice::text(lines.join("\n"))])
    }

    /// Rules text plus the stored rules template.
    pub fn rules_summary(&self) -> Vec<Notice> {
        vec![
            Notice::Prompt(TemplateKey::GetRules),
            Notice::text(format!(
                "A win pays {}x the bet, a loss returns {}x. Reaching 21 adds a {}x bonus. \
                 The dealer draws to {}.",
                self.rules.win_coefficient,
                self.rules.loss_coefficient,
                self.rules.blackjack_coefficient,
                self.rules.dealer_stands_on
            )),
        ]
    }

    /// Lock the player rows of every participant still in the round, plus
    /// the one `joining` it.
    async fn lock_round_players<T: StoreTx>(
        &self,
        tx: &mut T,
        session: &GameSession,
        joining: Option<i64>,
    ) -> GameResult<()> {
        let participants = tx.lock_participants_for_update(session).await?;
        let player_ids: Vec<i64> = participants
            .iter()
            .map(|p| p.player.id)
            .chain(joining)
            .collect();
        tx.lock_players_for_update(&player_ids).await?;
        Ok(())
    }

    /// Two cards to every active participant and to the dealer, then the
    /// first turn. Two-card 21s are finished on the spot.
    async fn deal<T: StoreTx>(
        &self,
        tx: &mut T,
        session: &GameSession,
    ) -> GameResult<Vec<Notice>> {
        let participants = tx.lock_participants_for_update(session).await?;

        let mut lines = vec!["All bets are in. Dealing!".to_string()];
        let mut credits = Credits::default();
        let mut naturals = Vec::new();

        for participant in participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Active)
        {
            let hand: Hand = [self.cards.draw(), self.cards.draw()].into_iter().collect();
            tx.set_participant_hand(participant.id, &hand).await?;
            lines.push(format!("{}: {hand}", participant.name()));

            if hand.is_natural() {
                tx.set_participant_status(participant.id, ParticipantStatus::Assembled)
                    .await?;
                credits.add(
                    participant.player.id,
                    self.rules.blackjack_bonus(participant.stake())?,
                )?;
                naturals.push(participant);
            }
        }

        let dealer: Hand = [self.cards.draw(), self.cards.draw()].into_iter().collect();
        tx.set_dealer_hand(session.id, &dealer).await?;
        tx.set_session_status(session.id, SessionStatus::Polling)
            .await?;
        lines.push(format!("Dealer: {dealer}"));

        let balances = credits.apply(tx).await?;
        for participant in naturals {
            lines.push(format!(
                "{} has Blackjack! +{} (balance: {})",
                participant.name(),
                self.rules.blackjack_bonus(participant.stake())?,
                balance_after(&balances, participant)
            ));
        }

        log::info!(
            "Chat {}: dealt {} hands",
            session.chat_id,
            participants.len()
        );

        let mut notices = vec![Notice::text(lines.join("\n"))];
        notices.extend(self.advance_turn(tx, session).await?);
        Ok(notices)
    }

    /// Hand the turn to the first active participant in turn order.
    async fn switch_turn<T: StoreTx>(
        &self,
        tx: &mut T,
        session: &GameSession,
    ) -> GameResult<Vec<Notice>> {
        let participants = tx.lock_participants_for_update(session).await?;
        let next = participants
            .into_iter()
            .find(|p| p.status == ParticipantStatus::Active)
            .ok_or(GameError::NoActiveParticipants)?;

        tx.set_participant_status(next.id, ParticipantStatus::Polling)
            .await?;
        Ok(turn_prompt(&next))
    }

    /// Switch the turn, or settle the round when nobody is left.
    async fn advance_turn<T: StoreTx>(
        &self,
        tx: &mut T,
        session: &GameSession,
    ) -> GameResult<Vec<Notice>> {
        match self.switch_turn(tx, session).await {
            Err(GameError::NoActiveParticipants) => self.finish_round(tx, session.chat_id).await,
            other => other,
        }
    }

    /// Dealer draws to the stand value, every finished hand is paid, and the
    /// session goes back to sleep.
    async fn finish_round<T: StoreTx>(
        &self,
        tx: &mut T,
        chat_id: ChatId,
    ) -> GameResult<Vec<Notice>> {
        let session = tx.lock_session_for_update(chat_id).await?;

        let mut dealer = session.dealer_hand.clone();
        while dealer.value() < self.rules.dealer_stands_on {
            dealer.push(self.cards.draw());
        }
        tx.set_dealer_hand(session.id, &dealer).await?;
        let dealer_value = dealer.value();

        let participants = tx.lock_participants_for_update(&session).await?;
        let mut credits = Credits::default();
        let mut results = Vec::new();

        for participant in &participants {
            if participant.status == ParticipantStatus::Assembled {
                let outcome = self.rules.outcome(participant.hand.value(), dealer_value);
                let credit = self.rules.settlement_credit(outcome, participant.stake())?;
                credits.add(participant.player.id, credit)?;
                results.push((participant, outcome, credit));
            }
            tx.set_participant_status(participant.id, ParticipantStatus::Sleeping)
                .await?;
        }
        tx.set_session_status(session.id, SessionStatus::Sleeping)
            .await?;

        let paid = credits.total();
        let balances = credits.apply(tx).await?;

        let mut lines = vec!["Final hands:".to_string()];
        lines.extend(
            participants
                .iter()
                .map(|p| format!("{}: {}", p.name(), p.hand)),
        );
        lines.push(format!("Dealer: {dealer}"));
        lines.push(String::new());
        for (participant, outcome, credit) in &results {
            let balance = balance_after(&balances, participant);
            lines.push(match outcome {
                Outcome::Win => format!(
                    "{} wins, +{credit} (balance: {balance})",
                    participant.name()
                ),
                Outcome::Loss => format!(
                    "{} loses the bet of {} (balance: {balance})",
                    participant.name(),
                    participant.stake()
                ),
            });
        }

        metrics::counter!("blackjack_rounds_settled_total").increment(1);
        metrics::counter!("blackjack_payout_units_total").increment(u64::try_from(paid).unwrap_or(0));
        log::info!(
            "Chat {chat_id}: round settled, dealer {dealer_value}, {} hands, {paid} paid out",
            results.len()
        );

        Ok(vec![Notice::text(lines.join("\n"))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credits_skip_zero_and_merge() {
        let mut credits = Credits::default();
        credits.add(2, 0).unwrap();
        credits.add(1, 100).unwrap();
        credits.add(1, 50).unwrap();
        assert_eq!(credits.total(), 150);
        assert_eq!(credits.0.len(), 1);
    }

    #[test]
    fn test_credits_overflow_is_invalid_amount() {
        let mut credits = Credits::default();
        credits.add(1, i64::MAX).unwrap();
        let err = credits.add(1, 1).unwrap_err();
        assert!(matches!(err, GameError::Store(StoreError::InvalidAmount(1))));
        assert_eq!(credits.total(), i64::MAX);
    }

    #[test]
    fn test_turn_prompt_ends_with_keyboard() {
        let participant = Participant {
            id: 1,
            session_id: 1,
            player: crate::game::models::Player {
                id: 1,
                tg_id: 10,
                username: "dana".to_string(),
                balance: 100,
            },
            status: ParticipantStatus::Polling,
            hand: Hand::new(),
            bet: Some(10),
        };

        let notices = turn_prompt(&participant);
        assert_eq!(
            notices.last(),
            Some(&Notice::Prompt(TemplateKey::GetCardOrEnough))
        );
    }
}
