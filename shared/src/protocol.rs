//! Messages exchanged between the server and its clients.
//!
//! Each message travels as a single JSON object on its own line. The `type`
//! field names the message kind; the remaining fields are camelCase.

use serde::{Deserialize, Serialize};

use crate::question::Question;
use crate::{
    player_disconnected, player_no_answer, player_passes, NO_ANSWER_INDEX, PLAYER_DISCONNECTED,
};

/// Messages sent by the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    Joining(Joining),
    Waiting(Waiting),
    Start(Start),
    Answer(Answer),
    Evaluation(Evaluation),
}

/// Messages sent by a client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    Join(JoinRequest),
    Answer(ClientAnswer),
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    JoinOnlineGame,
    JoinFriendGame,
    CreateFriendGame,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoiningResult {
    Joined,
    GameNotFound,
    NameAlreadyJoined,
}

/// First message of every connection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub request_type: RequestType,
    pub player_name: String,
    #[serde(default)]
    pub game_code: Option<String>,
    /// Only meaningful for `CREATE_FRIEND_GAME`.
    #[serde(default)]
    pub player_count: Option<u8>,
}

impl JoinRequest {
    pub fn online(player_name: impl Into<String>) -> Self {
        Self {
            request_type: RequestType::JoinOnlineGame,
            player_name: player_name.into(),
            game_code: None,
            player_count: None,
        }
    }

    pub fn join_friend(player_name: impl Into<String>, game_code: impl Into<String>) -> Self {
        Self {
            request_type: RequestType::JoinFriendGame,
            player_name: player_name.into(),
            game_code: Some(game_code.into()),
            player_count: None,
        }
    }

    pub fn create_friend(player_name: impl Into<String>, player_count: u8) -> Self {
        Self {
            request_type: RequestType::CreateFriendGame,
            player_name: player_name.into(),
            game_code: None,
            player_count: Some(player_count),
        }
    }
}

/// A client's answer to the sub-question it picked, or one of the sentinels.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientAnswer {
    #[serde(rename = "answerID")]
    pub answer_id: i32,
    pub player_answer_index: i32,
}

impl ClientAnswer {
    pub fn new(answer_id: i32, player_answer_index: i32) -> Self {
        Self {
            answer_id,
            player_answer_index,
        }
    }

    /// The answer synthesized on behalf of a player whose connection failed.
    pub fn disconnected() -> Self {
        Self::new(PLAYER_DISCONNECTED, NO_ANSWER_INDEX)
    }

    pub fn is_pass(&self) -> bool {
        player_passes(self.answer_id)
    }

    pub fn is_disconnect(&self) -> bool {
        player_disconnected(self.answer_id)
    }

    pub fn is_no_answer(&self) -> bool {
        player_no_answer(self.answer_id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Joining {
    pub joining_result: JoiningResult,
    pub game_code: Option<String>,
    pub player_count: u8,
    /// Lobby creation time in milliseconds since the Unix epoch.
    pub game_foundation: u64,
}

impl Joining {
    pub fn rejected(result: JoiningResult) -> Self {
        Self {
            joining_result: result,
            game_code: None,
            player_count: 0,
            game_foundation: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Waiting {
    pub start_ready: bool,
    pub waiting_players: Vec<WaitingPlayer>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WaitingPlayer {
    pub player_name: String,
}

/// Who is on move. `my_turn` and `my_score` are filled in per recipient.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub player_on_move: Option<String>,
    pub round_players: usize,
    pub game_players: usize,
    #[serde(default)]
    pub my_turn: bool,
    #[serde(default)]
    pub my_score: u32,
}

impl Turn {
    pub fn new(player_on_move: Option<String>, round_players: usize, game_players: usize) -> Self {
        Self {
            player_on_move,
            round_players,
            game_players,
            my_turn: false,
            my_score: 0,
        }
    }

    /// Copy of the turn as seen by one recipient.
    pub fn personalized(&self, player_name: &str, round_score: u32) -> Turn {
        Turn {
            my_turn: self.player_on_move.as_deref() == Some(player_name),
            my_score: round_score,
            ..self.clone()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Start {
    pub round_number: u32,
    pub question: Question,
    pub turn: Turn,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    #[serde(rename = "answerID")]
    pub answer_id: i32,
    pub player_name: String,
    pub player_answer_index: i32,
    pub correct_answer_index: i32,
    pub turn: Turn,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub solved_question: Question,
    pub player_scores: Vec<PlayerScore>,
    pub game_over: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerScore {
    pub name: String,
    pub score: u32,
}
