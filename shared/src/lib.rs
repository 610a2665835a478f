//! Wire protocol and game constants shared by the trivia server and its clients.
//!
//! Everything that both ends of a connection must agree on lives here: the
//! timing table used to compute answer deadlines, the reserved answer
//! sentinels, the question model and the tagged JSON messages exchanged over
//! the line-based TCP protocol.

use std::time::Duration;

pub mod codec;
pub mod protocol;
pub mod question;

pub use codec::{CodecError, Expected, FrameAssembler, LineBuffer, ProtocolError};
pub use protocol::{
    Answer, ClientAnswer, ClientMessage, Evaluation, JoinRequest, Joining, JoiningResult,
    PlayerScore, RequestType, ServerMessage, Start, Turn, Waiting, WaitingPlayer,
};
pub use question::{Question, SubQuestion};

pub const DEFAULT_PORT: u16 = 4444;

/// How long a lobby may wait for players before it expires.
pub const WAITING_TIME: Duration = Duration::from_secs(60);
/// Time a player has to pick an answer once the answer screen is shown.
pub const ANSWER_TIME: Duration = Duration::from_secs(30);
/// Grace added to every deadline to absorb network latency.
pub const EXTRA_TIME: Duration = Duration::from_millis(1_500);

pub const PLAYER_PASSES: i32 = -1;
pub const PLAYER_PASSES_WITHOUT_ACTIVITY: i32 = -10;
pub const PLAYER_DISCONNECTED: i32 = -100;
/// Sent in place of both indices when no real answer was given.
pub const NO_ANSWER_INDEX: i32 = -1;

pub const MAX_SCORE: u32 = 20;
pub const MAX_NO_ACTIVITY: u32 = 3;

pub const SUB_QUESTION_COUNT: usize = 10;
pub const CANDIDATE_COUNT: usize = 4;

pub const ONLINE_PLAYER_COUNT: u8 = 2;
pub const MIN_FRIEND_PLAYERS: u8 = 2;
pub const MAX_FRIEND_PLAYERS: u8 = 5;
pub const GAME_CODE_LENGTH: usize = 8;

/// Upper bound for a single line or an assembled frame.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Screens the client walks through. Each has a fixed duration that the
/// server folds into its answer deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    GameJoining,
    WaitingForPlayers,
    GameStart,
    RoundStart,
    RoundPlayer,
    PlayerAnswers,
    ShowAnswerWaiting,
    ShowAnswer,
    ShowAnswers,
    RoundEnd,
    GameEnd,
}

impl GamePhase {
    pub fn scene_time(self) -> Duration {
        match self {
            GamePhase::GameJoining => EXTRA_TIME * 2,
            GamePhase::WaitingForPlayers => WAITING_TIME,
            GamePhase::GameStart => Duration::from_secs(3),
            GamePhase::RoundStart => Duration::from_secs(3),
            GamePhase::RoundPlayer => Duration::from_secs(3),
            GamePhase::PlayerAnswers => ANSWER_TIME,
            GamePhase::ShowAnswerWaiting => EXTRA_TIME * 2,
            GamePhase::ShowAnswer => Duration::from_secs(3),
            GamePhase::ShowAnswers => Duration::from_secs(10),
            GamePhase::RoundEnd => Duration::from_secs(5),
            GamePhase::GameEnd => WAITING_TIME - Duration::from_secs(20),
        }
    }
}

/// Deadline for the first answer of a round.
///
/// Round one is preceded by the game start screen; every later round by the
/// evaluation screens of the previous round.
pub fn round_answer_time(round_number: u32) -> Duration {
    use GamePhase::*;

    let lead_in = if round_number <= 1 {
        GameStart.scene_time()
    } else {
        ShowAnswer.scene_time() + ShowAnswers.scene_time() + RoundEnd.scene_time()
    };
    lead_in + RoundStart.scene_time() + RoundPlayer.scene_time() + ANSWER_TIME
}

/// Deadline for every answer after the first one in a round.
pub fn regular_answer_time() -> Duration {
    GamePhase::ShowAnswer.scene_time() + GamePhase::RoundPlayer.scene_time() + ANSWER_TIME
}

pub fn player_passes(answer_id: i32) -> bool {
    answer_id == PLAYER_PASSES || answer_id == PLAYER_PASSES_WITHOUT_ACTIVITY
}

pub fn player_disconnected(answer_id: i32) -> bool {
    answer_id == PLAYER_DISCONNECTED
}

/// True for any of the three sentinels standing in for "no real answer".
pub fn player_no_answer(answer_id: i32) -> bool {
    player_passes(answer_id) || player_disconnected(answer_id)
}
