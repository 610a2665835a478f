//! Framing and decoding for the line-based JSON protocol.
//!
//! Decoding happens in two stages. A cheap completeness probe first decides
//! whether the buffered text can be a whole JSON object; a fragment is kept
//! and joined with the next line. Only a frame that passes the probe is
//! handed to `serde_json`, and any failure from that point on is a hard
//! protocol violation rather than "wait for more data".

use serde::Serialize;
use thiserror::Error;

use crate::protocol::{ClientAnswer, ClientMessage, JoinRequest, RequestType, ServerMessage};
use crate::{
    player_no_answer, MAX_FRAME_LEN, MAX_FRIEND_PLAYERS, MIN_FRIEND_PLAYERS, SUB_QUESTION_COUNT,
};

/// Semantic problems in a well-formed message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("player name is empty")]
    EmptyName,
    #[error("player count {0:?} outside 2..=5")]
    PlayerCountOutOfRange(Option<u8>),
    #[error("answer id {0} is neither a sentinel nor a sub-question index")]
    AnswerIdOutOfRange(i32),
    #[error("sub-question {0} was already answered this round")]
    AlreadyAnswered(i32),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame exceeds the maximum frame length")]
    Oversized,
    #[error("expected a {expected:?} message")]
    Unexpected { expected: Expected },
    #[error("invalid message: {0}")]
    Invalid(#[from] ProtocolError),
}

/// Message kind a connection accepts in its current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Join,
    Answer,
}

/// Splits raw socket bytes into newline-terminated lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Removes and returns the next complete line without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Bytes buffered without a terminating newline yet.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

enum Probe {
    Incomplete,
    Complete,
    Broken,
}

/// Joins line fragments until they form one complete JSON object.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: String,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line. Returns the frame once the object is complete,
    /// `Ok(None)` while more input is needed.
    pub fn push(&mut self, chunk: &str) -> Result<Option<String>, CodecError> {
        self.pending.push_str(chunk);
        if self.pending.len() > MAX_FRAME_LEN {
            self.pending.clear();
            return Err(CodecError::Oversized);
        }

        match probe(&self.pending) {
            Probe::Incomplete => Ok(None),
            Probe::Complete => Ok(Some(std::mem::take(&mut self.pending))),
            Probe::Broken => {
                self.pending.clear();
                Err(CodecError::NotAnObject)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Balanced-bracket scan that ignores brackets inside string literals.
fn probe(text: &str) -> Probe {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Probe::Incomplete;
    }
    if !trimmed.starts_with('{') {
        return Probe::Broken;
    }

    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in trimmed.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    // anything after the closing brace is garbage
                    return if offset + 1 == trimmed.len() {
                        Probe::Complete
                    } else {
                        Probe::Broken
                    };
                }
            }
            _ => {}
        }
    }
    Probe::Incomplete
}

/// Serializes a message as one protocol line, without the trailing newline.
pub fn encode<T: Serialize>(message: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Decodes a complete frame as the message kind the connection expects and
/// checks its contents.
pub fn decode_client(frame: &str, expected: Expected) -> Result<ClientMessage, CodecError> {
    let message: ClientMessage = serde_json::from_str(frame)?;
    match (&message, expected) {
        (ClientMessage::Join(request), Expected::Join) => validate_join(request)?,
        (ClientMessage::Answer(answer), Expected::Answer) => validate_answer(answer)?,
        _ => return Err(CodecError::Unexpected { expected }),
    }
    Ok(message)
}

pub fn decode_server(frame: &str) -> Result<ServerMessage, CodecError> {
    Ok(serde_json::from_str(frame)?)
}

pub fn validate_join(request: &JoinRequest) -> Result<(), ProtocolError> {
    if request.player_name.trim().is_empty() {
        return Err(ProtocolError::EmptyName);
    }
    if request.request_type == RequestType::CreateFriendGame {
        let valid = matches!(
            request.player_count,
            Some(count) if (MIN_FRIEND_PLAYERS..=MAX_FRIEND_PLAYERS).contains(&count)
        );
        if !valid {
            return Err(ProtocolError::PlayerCountOutOfRange(request.player_count));
        }
    }
    Ok(())
}

pub fn validate_answer(answer: &ClientAnswer) -> Result<(), ProtocolError> {
    let id = answer.answer_id;
    if player_no_answer(id) || (0..SUB_QUESTION_COUNT as i32).contains(&id) {
        Ok(())
    } else {
        Err(ProtocolError::AnswerIdOutOfRange(id))
    }
}
