use serde::{Deserialize, Serialize};

use crate::{CANDIDATE_COUNT, NO_ANSWER_INDEX, SUB_QUESTION_COUNT};

/// A quiz topic with exactly ten sub-questions.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Question {
    pub text: String,
    pub questions: [SubQuestion; SUB_QUESTION_COUNT],
}

/// One prompt with four candidate values.
///
/// `correct_index` is `-1` in the redacted copy sent before the answer is
/// revealed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubQuestion {
    pub key: String,
    pub values: [String; CANDIDATE_COUNT],
    pub correct_index: i32,
}

impl SubQuestion {
    pub fn new(key: impl Into<String>, values: [String; CANDIDATE_COUNT], correct_index: i32) -> Self {
        Self {
            key: key.into(),
            values,
            correct_index,
        }
    }

    pub fn has_valid_index(&self) -> bool {
        (0..CANDIDATE_COUNT as i32).contains(&self.correct_index)
    }
}

impl Question {
    /// Copy of the question with every correct index cleared.
    pub fn redacted(&self) -> Question {
        let mut copy = self.clone();
        for sub_question in copy.questions.iter_mut() {
            sub_question.correct_index = NO_ANSWER_INDEX;
        }
        copy
    }

    pub fn sub_question(&self, answer_id: i32) -> Option<&SubQuestion> {
        usize::try_from(answer_id)
            .ok()
            .and_then(|index| self.questions.get(index))
    }

    /// Every sub-question points at one of its four candidates.
    pub fn is_well_formed(&self) -> bool {
        self.questions.iter().all(SubQuestion::has_valid_index)
    }
}
