//! One question played out turn by turn
//!
//! A round keeps its own list of players still allowed to answer. The turn
//! cursor walks that list round-robin; a correct answer moves it on, a
//! wrong answer or any sentinel drops the player on move from the round.
//! The round is over once nobody is left.

use crate::game::Roster;
use crate::player::PlayerId;
use log::{debug, info, warn};
use shared::{
    regular_answer_time, round_answer_time, Answer, ClientAnswer, Question, Turn,
    NO_ANSWER_INDEX, PLAYER_PASSES, SUB_QUESTION_COUNT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundProgress {
    Continue,
    Finished,
}

#[derive(Debug)]
pub struct Round {
    number: u32,
    question: Question,
    players: Vec<PlayerId>,
    cursor: usize,
    revealed: [bool; SUB_QUESTION_COUNT],
}

impl Round {
    /// Builds a round over a snapshot of the roster. The first player on
    /// move is `(number - 1) mod roster size`.
    pub fn new(number: u32, question: Question, roster: &Roster) -> Self {
        let players = roster.ids();
        let cursor = if players.is_empty() {
            0
        } else {
            (number.saturating_sub(1) as usize) % players.len()
        };

        Self {
            number,
            question,
            players,
            cursor,
            revealed: [false; SUB_QUESTION_COUNT],
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn question(&self) -> &Question {
        &self.question
    }

    pub fn into_question(self) -> Question {
        self.question
    }

    /// Players still eligible to answer, in turn order
    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    pub fn current_player(&self) -> Option<PlayerId> {
        self.players.get(self.cursor).copied()
    }

    pub fn is_finished(&self) -> bool {
        self.players.is_empty()
    }

    /// Announces the round and arms the first player's deadline.
    pub fn start(&self, roster: &Roster) {
        info!(
            "Round {} starts: {} ({} players)",
            self.number,
            self.question.text,
            self.players.len()
        );
        roster.send_start(self.number, &self.question.redacted(), &self.turn(roster));

        if let Some(id) = self.current_player() {
            roster.expect_answer(id, round_answer_time(self.number));
        }
    }

    /// Applies the answer of the player on move and announces the result.
    pub fn process_answer(&mut self, answer: ClientAnswer, roster: &mut Roster) -> RoundProgress {
        let Some(id) = self.current_player() else {
            return RoundProgress::Finished;
        };
        let name = roster.name_of(id).unwrap_or_default().to_string();

        let mut answer = answer;
        if !answer.is_no_answer() && !self.is_open_sub_question(answer.answer_id) {
            warn!(
                "{} answered sub-question {} which is not open, dropping the player",
                name, answer.answer_id
            );
            roster.close(id);
            answer = ClientAnswer::disconnected();
        }

        let (player_answer_index, correct_answer_index) = if answer.is_no_answer() {
            self.remove_current();
            if answer.answer_id == PLAYER_PASSES {
                if let Some(player) = roster.get_mut(id) {
                    player.reset_no_activity();
                }
            } else {
                roster.check_no_activity(answer.answer_id, id);
            }
            (NO_ANSWER_INDEX, NO_ANSWER_INDEX)
        } else {
            let correct_index = self.reveal(answer.answer_id);
            self.evaluate_answer(id, &name, answer.player_answer_index, correct_index, roster);
            (answer.player_answer_index, correct_index)
        };

        roster.send_answer(&Answer {
            answer_id: answer.answer_id,
            player_name: name,
            player_answer_index,
            correct_answer_index,
            turn: self.turn(roster),
        });

        match self.current_player() {
            Some(next) => {
                roster.expect_answer(next, regular_answer_time());
                RoundProgress::Continue
            }
            None => RoundProgress::Finished,
        }
    }

    /// Removes a player who is not on move, keeping the cursor on the
    /// player who is. Returns false if the player was not in the round.
    pub fn withdraw(&mut self, id: PlayerId) -> bool {
        let Some(position) = self.players.iter().position(|&p| p == id) else {
            return false;
        };

        self.players.remove(position);
        if position < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.players.len() {
            self.cursor = 0;
        }
        true
    }

    fn evaluate_answer(
        &mut self,
        id: PlayerId,
        name: &str,
        player_answer_index: i32,
        correct_index: i32,
        roster: &mut Roster,
    ) {
        let Some(player) = roster.get_mut(id) else {
            self.remove_current();
            return;
        };
        player.reset_no_activity();

        if player_answer_index == correct_index {
            player.increase_score();
            self.move_cursor();
        } else {
            debug!("{} answered wrong and is out of round {}", name, self.number);
            player.reset_score();
            self.remove_current();
        }
    }

    fn is_open_sub_question(&self, answer_id: i32) -> bool {
        usize::try_from(answer_id)
            .ok()
            .and_then(|index| self.revealed.get(index))
            .map_or(false, |revealed| !revealed)
    }

    /// Marks a sub-question answered and returns its correct index.
    fn reveal(&mut self, answer_id: i32) -> i32 {
        if let Ok(index) = usize::try_from(answer_id) {
            if let Some(flag) = self.revealed.get_mut(index) {
                *flag = true;
            }
        }
        self.question
            .sub_question(answer_id)
            .map_or(NO_ANSWER_INDEX, |sub_question| sub_question.correct_index)
    }

    fn move_cursor(&mut self) {
        self.cursor = (self.cursor + 1) % self.players.len();
    }

    fn remove_current(&mut self) {
        if self.cursor < self.players.len() {
            self.players.remove(self.cursor);
        }
        if self.cursor == self.players.len() {
            self.cursor = 0;
        }
    }

    fn turn(&self, roster: &Roster) -> Turn {
        let on_move = self
            .current_player()
            .and_then(|id| roster.name_of(id))
            .map(str::to_string);
        Turn::new(on_move, self.players.len(), roster.len())
    }
}
