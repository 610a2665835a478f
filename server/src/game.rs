//! Game sessions: lobby bookkeeping, rounds and scoring
//!
//! A [`Game`] starts life as a lobby collecting players. Once full it is
//! handed to a session task and plays rounds until someone reaches the
//! maximum score or only one player is left. Online games are fixed two
//! player quick matches; friend games are joined through a shared code and
//! can be reopened under the same code when they end.

use crate::player::{Player, PlayerId};
use crate::questions::QuestionPool;
use crate::round::{Round, RoundProgress};
use crate::session::{SessionEvent, SessionSender};
use crate::utils::get_timestamp;
use log::{debug, info, warn};
use serde::Serialize;
use shared::{
    player_disconnected, Answer, ClientAnswer, Evaluation, Joining, JoiningResult, PlayerScore,
    Question, ServerMessage, Start, Turn, Waiting, WaitingPlayer, MAX_NO_ACTIVITY, MAX_SCORE,
    WAITING_TIME,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Ordered players of one game and the way to reach them
#[derive(Debug)]
pub struct Roster {
    players: Vec<Player>,
    loopback: SessionSender,
}

impl Roster {
    pub fn new(loopback: SessionSender) -> Self {
        Self {
            players: Vec::new(),
            loopback,
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn push(&mut self, player: Player) {
        self.players.push(player);
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|player| player.id).collect()
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|player| player.id == id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == id)
    }

    pub fn name_of(&self, id: PlayerId) -> Option<&str> {
        self.get(id).map(Player::name)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.players.iter().any(|player| player.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn broadcast<T: Serialize>(&self, message: &T) {
        for player in &self.players {
            player.send_message(message);
        }
    }

    /// Sends the round start, with the turn personalized per recipient.
    pub fn send_start(&self, round_number: u32, question: &Question, turn: &Turn) {
        for player in &self.players {
            player.send_message(&ServerMessage::Start(Start {
                round_number,
                question: question.clone(),
                turn: turn.personalized(player.name(), player.round_score()),
            }));
        }
    }

    /// Sends an answer result, with the turn personalized per recipient.
    pub fn send_answer(&self, answer: &Answer) {
        for player in &self.players {
            player.send_message(&ServerMessage::Answer(Answer {
                turn: answer.turn.personalized(player.name(), player.round_score()),
                ..answer.clone()
            }));
        }
    }

    /// Arms a player's answer deadline. A connection that is already gone
    /// produces a disconnect answer on the session channel instead.
    pub fn expect_answer(&self, id: PlayerId, timeout: Duration) {
        let Some(player) = self.get(id) else {
            return;
        };
        if !player.expect_answer_message(timeout) {
            debug!("{} is no longer connected", player.name());
            let event = SessionEvent::Answer {
                player: id,
                answer: ClientAnswer::disconnected(),
            };
            if self.loopback.send(event).is_err() {
                debug!("Session channel closed");
            }
        }
    }

    /// Counts a missed turn. The player leaves the game after too many in
    /// a row or right away on a disconnect.
    pub fn check_no_activity(&mut self, answer_id: i32, id: PlayerId) {
        let Some(player) = self.get_mut(id) else {
            return;
        };
        player.increase_no_activity();
        if player.no_activity() > MAX_NO_ACTIVITY || player_disconnected(answer_id) {
            self.remove(id);
        }
    }

    /// Drops a player from the game and closes their connection.
    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        let position = self.players.iter().position(|player| player.id == id)?;
        let player = self.players.remove(position);
        info!("{} left the game", player.name());
        player.close();
        Some(player)
    }

    pub fn close(&self, id: PlayerId) {
        if let Some(player) = self.get(id) {
            player.close();
        }
    }

    pub fn close_all(&self) {
        for player in &self.players {
            player.close();
        }
    }

    /// Game scores, highest first
    pub fn scores(&self) -> Vec<PlayerScore> {
        let mut scores: Vec<PlayerScore> = self
            .players
            .iter()
            .map(|player| PlayerScore {
                name: player.name().to_string(),
                score: player.game_score(),
            })
            .collect();
        scores.sort_by(|a, b| b.score.cmp(&a.score));
        scores
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameKind {
    Online,
    Friend { code: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameProgress {
    Continue,
    Over,
    /// No question left to start the next round with
    Aborted,
}

/// A friend lobby to open again once a game has ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rematch {
    pub code: String,
    pub player_count: u8,
}

pub struct Game {
    kind: GameKind,
    player_count: u8,
    created_at: u64,
    roster: Roster,
    pool: Arc<QuestionPool>,
    round_number: u32,
    round: Option<Round>,
}

impl Game {
    pub fn new(
        kind: GameKind,
        player_count: u8,
        pool: Arc<QuestionPool>,
        session: SessionSender,
    ) -> Self {
        Self {
            kind,
            player_count,
            created_at: get_timestamp(),
            roster: Roster::new(session),
            pool,
            round_number: 0,
            round: None,
        }
    }

    pub fn kind(&self) -> &GameKind {
        &self.kind
    }

    pub fn code(&self) -> Option<&str> {
        match &self.kind {
            GameKind::Online => None,
            GameKind::Friend { code } => Some(code),
        }
    }

    pub fn player_count(&self) -> u8 {
        self.player_count
    }

    pub fn player_total(&self) -> usize {
        self.roster.len()
    }

    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Sender players use to deliver answers to this game's session
    pub fn session_sender(&self) -> SessionSender {
        self.roster.loopback.clone()
    }

    /// Lobbies expire once the matchmaking window has passed.
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) > WAITING_TIME.as_millis() as u64
    }

    pub fn ready_to_start(&self) -> bool {
        self.roster.len() == self.player_count as usize
    }

    pub fn name_already_joined(&self, name: &str) -> bool {
        self.roster.contains_name(name)
    }

    /// Seats a player in the lobby and tells everyone who is waiting.
    pub fn add_waiting_player(&mut self, player: Player) {
        player.send_message(&ServerMessage::Joining(Joining {
            joining_result: JoiningResult::Joined,
            game_code: self.code().map(str::to_string),
            player_count: self.player_count,
            game_foundation: self.created_at,
        }));
        info!("{} joined {}", player.name(), self);
        self.roster.push(player);

        let waiting_players = self
            .roster
            .iter()
            .map(|player| WaitingPlayer {
                player_name: player.name().to_string(),
            })
            .collect();
        self.roster.broadcast(&ServerMessage::Waiting(Waiting {
            start_ready: self.ready_to_start(),
            waiting_players,
        }));
    }

    /// Over once a player reached the maximum score or at most one is left
    pub fn is_over(&self) -> bool {
        self.roster.iter().any(|player| player.game_score() >= MAX_SCORE) || self.roster.len() <= 1
    }

    /// Draws the next question and starts a round. Returns false if no
    /// question is available.
    pub fn start_round(&mut self) -> bool {
        for player in self.roster.players.iter_mut() {
            player.reset_score();
        }

        let Some(question) = self.pool.draw() else {
            return false;
        };
        self.round_number += 1;
        let round = Round::new(self.round_number, question, &self.roster);
        round.start(&self.roster);
        self.round = Some(round);
        true
    }

    /// Applies an answer from a player. Only the player on move may answer;
    /// a disconnect from anyone else just takes them out of the game.
    pub fn process_answer(&mut self, player: PlayerId, answer: ClientAnswer) -> GameProgress {
        let Some(round) = self.round.as_mut() else {
            warn!("{} got an answer outside of a round", self);
            return GameProgress::Continue;
        };

        if round.current_player() != Some(player) {
            if answer.is_disconnect() {
                round.withdraw(player);
                self.roster.remove(player);
            } else {
                warn!(
                    "Ignoring answer {:?} from player {} who is not on move",
                    answer, player
                );
            }
            return GameProgress::Continue;
        }

        match round.process_answer(answer, &mut self.roster) {
            RoundProgress::Continue => GameProgress::Continue,
            RoundProgress::Finished => self.finish_round(),
        }
    }

    fn finish_round(&mut self) -> GameProgress {
        if self.evaluate_round() {
            return GameProgress::Over;
        }
        if self.start_round() {
            GameProgress::Continue
        } else {
            warn!("{} ran out of questions", self);
            GameProgress::Aborted
        }
    }

    /// Moves round scores into game scores and broadcasts the standings.
    /// Returns true when the game is over.
    pub fn evaluate_round(&mut self) -> bool {
        let Some(round) = self.round.take() else {
            return self.is_over();
        };
        for player in self.roster.players.iter_mut() {
            player.evaluate_round_score();
        }

        let game_over = self.is_over();
        info!(
            "{} finished round {}{}",
            self,
            round.number(),
            if game_over { ", game over" } else { "" }
        );
        self.roster.broadcast(&ServerMessage::Evaluation(Evaluation {
            solved_question: round.into_question(),
            player_scores: self.roster.scores(),
            game_over,
        }));
        game_over
    }

    /// Friend games with enough players left get their lobby back.
    pub fn deal_game_end(&self) -> Option<Rematch> {
        match &self.kind {
            GameKind::Friend { code } if self.roster.len() > 1 => Some(Rematch {
                code: code.clone(),
                player_count: self.roster.len() as u8,
            }),
            _ => None,
        }
    }

    pub fn close_all(&self) {
        self.roster.close_all();
    }

    #[cfg(test)]
    pub(crate) fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    #[cfg(test)]
    pub(crate) fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            GameKind::Online => write!(f, "online game"),
            GameKind::Friend { code } => write!(f, "friend game {}", code),
        }
    }
}
