//! Supervisor task for a running game
//!
//! Once a lobby is full its [`Game`] moves into a dedicated task that owns
//! it exclusively. Player actors and the game's own deadline bookkeeping
//! feed [`SessionEvent`]s into one channel; the supervisor applies them in
//! arrival order, so round state never sees concurrent mutation.

use crate::game::{Game, GameProgress, Rematch};
use crate::player::PlayerId;
use log::{error, info};
use shared::ClientAnswer;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An answer, a sentinel or a synthesized disconnect from one player
    Answer { player: PlayerId, answer: ClientAnswer },
}

pub type SessionSender = mpsc::UnboundedSender<SessionEvent>;
pub type SessionReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub fn channel() -> (SessionSender, SessionReceiver) {
    mpsc::unbounded_channel()
}

/// Plays the game to the end and closes every remaining connection.
///
/// Returns the lobby to reopen when the players may play again under the
/// same friend code.
pub async fn run(mut game: Game, mut inbox: SessionReceiver) -> Option<Rematch> {
    info!("{} started with {} players", game, game.player_total());

    let mut progress = if game.start_round() {
        GameProgress::Continue
    } else {
        error!("{} could not draw a question, ending the game", game);
        GameProgress::Aborted
    };

    while progress == GameProgress::Continue {
        let Some(SessionEvent::Answer { player, answer }) = inbox.recv().await else {
            break;
        };
        progress = game.process_answer(player, answer);
    }

    let rematch = match progress {
        GameProgress::Over => game.deal_game_end(),
        _ => None,
    };
    game.close_all();
    info!("{} finished", game);
    rematch
}
