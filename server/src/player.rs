//! Players and the per-connection actor that speaks for them
//!
//! A [`Player`] is the session-side record: identity, scores, inactivity
//! accounting and the handle used to talk to the client. The
//! [`PlayerActor`] runs next to the connection task and turns inbound lines
//! into join requests (before a game is found) or answers (afterwards).
//! Every way the connection can fail mid-game ends up as the disconnect
//! sentinel answer, so the session only handles one failure path.

use crate::connection::{ConnectionEvent, ConnectionHandle};
use crate::game_manager::{GameManager, JoinOutcome};
use crate::session::{SessionEvent, SessionSender};
use log::{debug, info, warn};
use serde::Serialize;
use shared::codec::{self, Expected};
use shared::{ClientAnswer, ClientMessage, FrameAssembler};
use std::time::Duration;
use tokio::sync::mpsc;

pub type PlayerId = u32;

/// A player as seen by a game
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    name: String,
    game_score: u32,
    round_score: u32,
    no_activity: u32,
    connection: ConnectionHandle,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, connection: ConnectionHandle) -> Self {
        Self {
            id,
            name: name.into(),
            game_score: 0,
            round_score: 0,
            no_activity: 0,
            connection,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn game_score(&self) -> u32 {
        self.game_score
    }

    pub fn round_score(&self) -> u32 {
        self.round_score
    }

    pub fn no_activity(&self) -> u32 {
        self.no_activity
    }

    pub fn increase_score(&mut self) {
        self.round_score += 1;
    }

    pub fn reset_score(&mut self) {
        self.round_score = 0;
    }

    /// Moves the round score into the game score.
    pub fn evaluate_round_score(&mut self) {
        self.game_score += self.round_score;
        self.round_score = 0;
    }

    pub fn increase_no_activity(&mut self) {
        self.no_activity += 1;
    }

    pub fn reset_no_activity(&mut self) {
        self.no_activity = 0;
    }

    /// Encodes and queues a message. Delivery failures are only logged; a
    /// dead connection surfaces when an answer is next expected.
    pub fn send_message<T: Serialize>(&self, message: &T) {
        match codec::encode(message) {
            Ok(line) => {
                if !self.connection.send_line(line) {
                    debug!("Dropping message for disconnected player {}", self.name);
                }
            }
            Err(e) => warn!("Failed to encode message for {}: {}", self.name, e),
        }
    }

    /// Arms the receive deadline. Returns false if the connection is gone.
    pub fn expect_answer_message(&self, timeout: Duration) -> bool {
        self.connection.expect_message(timeout)
    }

    pub fn close(&self) {
        self.connection.close();
    }

    #[cfg(test)]
    pub(crate) fn set_game_score(&mut self, score: u32) {
        self.game_score = score;
    }
}

enum State {
    Joining,
    Playing(SessionSender),
}

/// Listener for one connection
pub struct PlayerActor {
    id: PlayerId,
    connection: ConnectionHandle,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    manager: GameManager,
    assembler: FrameAssembler,
    state: State,
}

impl PlayerActor {
    pub fn new(
        id: PlayerId,
        connection: ConnectionHandle,
        events: mpsc::UnboundedReceiver<ConnectionEvent>,
        manager: GameManager,
    ) -> Self {
        Self {
            id,
            connection,
            events,
            manager,
            assembler: FrameAssembler::new(),
            state: State::Joining,
        }
    }

    /// Waits for the join request, then forwards answers until the
    /// connection is gone.
    pub async fn run(mut self) {
        // the join request gets no time beyond the protocol grace
        self.connection.expect_message(Duration::ZERO);

        while let Some(event) = self.events.recv().await {
            let keep_going = match event {
                ConnectionEvent::Line(line) => self.handle_line(&line).await,
                ConnectionEvent::Error(failure) => {
                    debug!("Player {} lost connection: {}", self.id, failure);
                    self.handle_disconnect();
                    false
                }
            };
            if !keep_going {
                break;
            }
        }
        debug!("Player {} listener finished", self.id);
    }

    async fn handle_line(&mut self, line: &str) -> bool {
        let frame = match self.assembler.push(line) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                // message is not complete
                self.connection.resume();
                return true;
            }
            Err(e) => return self.reject(e),
        };

        let expected = match self.state {
            State::Joining => Expected::Join,
            State::Playing(_) => Expected::Answer,
        };

        match codec::decode_client(&frame, expected) {
            Ok(ClientMessage::Join(request)) => {
                self.connection.confirm();
                let player = Player::new(self.id, request.player_name.clone(), self.connection.clone());
                match self.manager.connect_player(request, player).await {
                    JoinOutcome::Joined(session) => {
                        self.state = State::Playing(session);
                        true
                    }
                    outcome => {
                        info!("Player {} was not seated: {:?}", self.id, outcome);
                        self.connection.close();
                        false
                    }
                }
            }
            Ok(ClientMessage::Answer(answer)) => {
                self.connection.confirm();
                self.forward(answer);
                true
            }
            Err(e) => self.reject(e),
        }
    }

    /// Closes the connection after a protocol violation.
    fn reject(&mut self, error: codec::CodecError) -> bool {
        warn!("Protocol violation from player {}: {}", self.id, error);
        self.connection.close();
        self.handle_disconnect();
        false
    }

    fn handle_disconnect(&mut self) {
        if let State::Playing(_) = self.state {
            self.forward(ClientAnswer::disconnected());
        }
    }

    fn forward(&self, answer: ClientAnswer) {
        if let State::Playing(session) = &self.state {
            let event = SessionEvent::Answer {
                player: self.id,
                answer,
            };
            if session.send(event).is_err() {
                debug!("Session of player {} has already ended", self.id);
            }
        }
    }
}
