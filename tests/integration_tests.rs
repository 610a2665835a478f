//! Integration tests for the trivia server
//!
//! These tests run a real listener on an ephemeral port and talk to it over
//! TCP exactly like a client would.

use server::game_manager::GameManager;
use server::network::Server;
use server::questions::{QuestionPool, StaticSource};
use shared::codec::{decode_server, encode};
use shared::{
    ClientAnswer, ClientMessage, JoinRequest, JoiningResult, Question, ServerMessage,
    SubQuestion, MAX_SCORE, PLAYER_DISCONNECTED, PLAYER_PASSES, SUB_QUESTION_COUNT,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Question whose sub-question `i` has correct index `i % 4`
fn question(text: &str) -> Question {
    Question {
        text: text.to_string(),
        questions: std::array::from_fn(|i| {
            SubQuestion::new(
                format!("{} {}", text, i),
                std::array::from_fn(|j| format!("option {}", j)),
                (i % 4) as i32,
            )
        }),
    }
}

async fn start_server() -> SocketAddr {
    let pool = QuestionPool::new(StaticSource::new(vec![
        question("Capitals"),
        question("Rivers"),
        question("Mountains"),
    ]));
    let mut server = Server::bind("127.0.0.1:0", GameManager::new(Arc::new(pool)))
        .await
        .expect("Failed to bind server");
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move { server.run().await });
    addr
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("Failed to connect");
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send_raw(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).await.unwrap();
    }

    async fn send(&mut self, message: &ClientMessage) {
        let line = encode(message).unwrap();
        self.send_raw(&format!("{}\n", line)).await;
    }

    async fn join(addr: SocketAddr, request: JoinRequest) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(&ClientMessage::Join(request)).await;
        client
    }

    async fn answer(&mut self, answer_id: i32, index: i32) {
        self.send(&ClientMessage::Answer(ClientAnswer::new(answer_id, index)))
            .await;
    }

    /// Next message, or `None` once the server closed the connection
    async fn recv(&mut self) -> Option<ServerMessage> {
        let line = timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("Timed out waiting for the server")
            .ok()??;
        Some(decode_server(&line).expect("Server sent an unreadable line"))
    }

    /// Skips messages until one matches
    async fn recv_until<T>(&mut self, mut pick: impl FnMut(ServerMessage) -> Option<T>) -> T {
        loop {
            let message = self.recv().await.expect("Connection closed early");
            if let Some(found) = pick(message) {
                return found;
            }
        }
    }

    async fn joining(&mut self) -> shared::Joining {
        match self.recv().await {
            Some(ServerMessage::Joining(joining)) => joining,
            other => panic!("Expected Joining, got {:?}", other),
        }
    }

    async fn start(&mut self) -> shared::Start {
        self.recv_until(|message| match message {
            ServerMessage::Start(start) => Some(start),
            _ => None,
        })
        .await
    }

    async fn next_answer(&mut self) -> shared::Answer {
        self.recv_until(|message| match message {
            ServerMessage::Answer(answer) => Some(answer),
            _ => None,
        })
        .await
    }

    async fn evaluation(&mut self) -> shared::Evaluation {
        self.recv_until(|message| match message {
            ServerMessage::Evaluation(evaluation) => Some(evaluation),
            _ => None,
        })
        .await
    }

    /// Next `Start`, `Answer` or `Evaluation`
    async fn next_game_message(&mut self) -> ServerMessage {
        self.recv_until(|message| match message {
            ServerMessage::Start(_) | ServerMessage::Answer(_) | ServerMessage::Evaluation(_) => {
                Some(message)
            }
            _ => None,
        })
        .await
    }

    async fn assert_closed(&mut self) {
        while let Some(message) = self.recv().await {
            if let ServerMessage::Answer(_) | ServerMessage::Start(_) = message {
                panic!("Unexpected game message after close: {:?}", message);
            }
        }
    }
}

/// Two online players seated in the same game, Alice first
async fn online_pair(addr: SocketAddr) -> (TestClient, TestClient) {
    let mut alice = TestClient::join(addr, JoinRequest::online("Alice")).await;
    assert_eq!(alice.joining().await.joining_result, JoiningResult::Joined);
    let mut bob = TestClient::join(addr, JoinRequest::online("Bob")).await;
    assert_eq!(bob.joining().await.joining_result, JoiningResult::Joined);
    (alice, bob)
}

/// MATCHMAKING TESTS
mod matchmaking_tests {
    use super::*;

    /// Tests that two online players get paired and see the same lobby
    #[tokio::test]
    async fn online_players_are_paired() {
        let addr = start_server().await;
        let mut alice = TestClient::join(addr, JoinRequest::online("Alice")).await;

        let joining = alice.joining().await;
        assert_eq!(joining.player_count, 2);
        assert_eq!(joining.game_code, None);
        assert!(joining.game_foundation > 0);

        match alice.recv().await {
            Some(ServerMessage::Waiting(waiting)) => {
                assert!(!waiting.start_ready);
                assert_eq!(waiting.waiting_players.len(), 1);
            }
            other => panic!("Expected Waiting, got {:?}", other),
        }

        let mut bob = TestClient::join(addr, JoinRequest::online("Bob")).await;
        bob.joining().await;

        match alice.recv().await {
            Some(ServerMessage::Waiting(waiting)) => {
                assert!(waiting.start_ready);
                let names: Vec<_> = waiting
                    .waiting_players
                    .iter()
                    .map(|p| p.player_name.clone())
                    .collect();
                assert_eq!(names, vec!["Alice", "Bob"]);
            }
            other => panic!("Expected Waiting, got {:?}", other),
        }

        let start = alice.start().await;
        assert_eq!(start.round_number, 1);
        assert!(start.turn.my_turn);
        assert_eq!(start.turn.player_on_move.as_deref(), Some("Alice"));
        assert!(start.question.questions.iter().all(|s| s.correct_index == -1));

        let start = bob.start().await;
        assert!(!start.turn.my_turn);
        assert_eq!(start.turn.game_players, 2);
    }

    /// Tests creating a friend game and joining it by code
    #[tokio::test]
    async fn friend_game_by_code() {
        let addr = start_server().await;
        let mut host = TestClient::join(addr, JoinRequest::create_friend("Host", 2)).await;
        let joining = host.joining().await;
        let code = joining.game_code.expect("Friend game without a code");
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_lowercase()));

        let mut guest = TestClient::join(addr, JoinRequest::join_friend("Guest", code.clone())).await;
        let joining = guest.joining().await;
        assert_eq!(joining.joining_result, JoiningResult::Joined);
        assert_eq!(joining.game_code, Some(code));

        assert_eq!(host.start().await.round_number, 1);
        assert_eq!(guest.start().await.round_number, 1);
    }

    /// Tests that an unknown code is answered and the connection closed
    #[tokio::test]
    async fn unknown_code_is_rejected() {
        let addr = start_server().await;
        let mut client = TestClient::join(addr, JoinRequest::join_friend("Alice", "zzzzzzzz")).await;

        let joining = client.joining().await;
        assert_eq!(joining.joining_result, JoiningResult::GameNotFound);
        assert_eq!(joining.game_code, None);
        assert_eq!(joining.player_count, 0);
        assert!(client.recv().await.is_none());
    }

    /// Tests that a taken name in a friend lobby is refused
    #[tokio::test]
    async fn taken_name_is_rejected() {
        let addr = start_server().await;
        let mut host = TestClient::join(addr, JoinRequest::create_friend("Alice", 3)).await;
        let code = host.joining().await.game_code.unwrap();

        let mut twin = TestClient::join(addr, JoinRequest::join_friend("Alice", code)).await;
        assert_eq!(
            twin.joining().await.joining_result,
            JoiningResult::NameAlreadyJoined
        );
        assert!(twin.recv().await.is_none());
    }
}

/// PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests that an out-of-range player count closes the connection silently
    #[tokio::test]
    async fn invalid_player_count_closes_connection() {
        let addr = start_server().await;
        let mut client = TestClient::join(addr, JoinRequest::create_friend("Alice", 6)).await;
        assert!(client.recv().await.is_none());
    }

    /// Tests that a join request split over two lines is reassembled
    #[tokio::test]
    async fn split_join_request_is_accepted() {
        let addr = start_server().await;
        let mut client = TestClient::connect(addr).await;
        client
            .send_raw("{\"type\":\"Join\",\"requestType\":\"JOIN_ONLINE_GAME\",\n")
            .await;
        client.send_raw("\"playerName\":\"Alice\"}\n").await;

        assert_eq!(client.joining().await.joining_result, JoiningResult::Joined);
    }

    /// Tests that garbage instead of a join request closes the connection
    #[tokio::test]
    async fn garbage_closes_connection() {
        let addr = start_server().await;
        let mut client = TestClient::connect(addr).await;
        client.send_raw("hello server\n").await;
        assert!(client.recv().await.is_none());
    }

    /// Tests that an answer id outside the sub-questions drops the player
    #[tokio::test]
    async fn out_of_range_answer_counts_as_disconnect() {
        let addr = start_server().await;
        let (mut alice, mut bob) = online_pair(addr).await;
        alice.start().await;
        bob.start().await;

        alice.answer(42, 0).await;

        let answer = bob.next_answer().await;
        assert_eq!(answer.answer_id, PLAYER_DISCONNECTED);
        assert_eq!(answer.player_name, "Alice");
        assert!(answer.turn.my_turn);
        assert_eq!(answer.turn.game_players, 1);
        alice.assert_closed().await;
    }
}

/// GAMEPLAY TESTS
mod gameplay_tests {
    use super::*;

    /// Tests a full round: right answer, wrong answer, pass, evaluation
    #[tokio::test]
    async fn full_round_and_evaluation() {
        let addr = start_server().await;
        let (mut alice, mut bob) = online_pair(addr).await;
        alice.start().await;
        bob.start().await;

        // sub-question 0 has correct index 0
        alice.answer(0, 0).await;
        let answer = bob.next_answer().await;
        assert_eq!(answer.player_name, "Alice");
        assert_eq!(answer.correct_answer_index, 0);
        assert_eq!(answer.turn.player_on_move.as_deref(), Some("Bob"));
        assert!(answer.turn.my_turn);
        let answer = alice.next_answer().await;
        assert_eq!(answer.turn.my_score, 1);

        // sub-question 1 has correct index 1
        bob.answer(1, 3).await;
        let answer = alice.next_answer().await;
        assert_eq!(answer.player_answer_index, 3);
        assert_eq!(answer.correct_answer_index, 1);
        assert_eq!(answer.turn.round_players, 1);
        assert!(answer.turn.my_turn);
        bob.next_answer().await;

        alice.answer(PLAYER_PASSES, -1).await;
        let answer = bob.next_answer().await;
        assert_eq!(answer.answer_id, PLAYER_PASSES);
        assert_eq!(answer.player_answer_index, -1);
        assert_eq!(answer.correct_answer_index, -1);
        assert_eq!(answer.turn.player_on_move, None);

        let evaluation = bob.evaluation().await;
        assert!(!evaluation.game_over);
        assert_eq!(evaluation.player_scores[0].name, "Alice");
        assert_eq!(evaluation.player_scores[0].score, 1);
        assert_eq!(evaluation.player_scores[1].score, 0);
        assert!(evaluation.solved_question.is_well_formed());

        // second round opens with the second player
        let start = bob.start().await;
        assert_eq!(start.round_number, 2);
        assert!(start.turn.my_turn);
        assert_eq!(start.turn.my_score, 0);
    }

    /// Tests that a player dropping out ends a two player game
    #[tokio::test]
    async fn disconnect_on_move_ends_two_player_game() {
        let addr = start_server().await;
        let (alice, mut bob) = online_pair(addr).await;
        bob.start().await;

        drop(alice);

        let answer = bob.next_answer().await;
        assert_eq!(answer.answer_id, PLAYER_DISCONNECTED);
        assert_eq!(answer.player_name, "Alice");
        assert_eq!(answer.turn.player_on_move.as_deref(), Some("Bob"));
        assert_eq!(answer.turn.game_players, 1);

        bob.answer(PLAYER_PASSES, -1).await;
        let evaluation = bob.evaluation().await;
        assert!(evaluation.game_over);
        assert_eq!(evaluation.player_scores.len(), 1);

        // the server hangs up after the final evaluation
        assert!(bob.recv().await.is_none());
    }

    /// Tests that a friend game left with one player does not keep its code
    #[tokio::test]
    async fn friend_code_is_dropped_with_one_player_left() {
        let addr = start_server().await;
        let mut host = TestClient::join(addr, JoinRequest::create_friend("Host", 2)).await;
        let code = host.joining().await.game_code.unwrap();
        let guest = TestClient::join(addr, JoinRequest::join_friend("Guest", code.clone())).await;
        host.start().await;

        // guest vanishes on their first turn, host is left alone
        drop(guest);
        host.answer(0, 0).await;
        host.next_answer().await;
        let answer = host.next_answer().await;
        assert_eq!(answer.answer_id, PLAYER_DISCONNECTED);
        host.answer(PLAYER_PASSES, -1).await;
        assert!(host.evaluation().await.game_over);

        // one player left, so the code is not reopened
        let mut late = TestClient::join(addr, JoinRequest::join_friend("Late", code)).await;
        assert_eq!(
            late.joining().await.joining_result,
            JoiningResult::GameNotFound
        );
    }

    /// Tests that two friends play to the winning score and get their code back
    #[tokio::test]
    async fn friend_game_plays_to_max_score_and_reopens() {
        let addr = start_server().await;
        let mut host = TestClient::join(addr, JoinRequest::create_friend("Host", 2)).await;
        let code = host.joining().await.game_code.unwrap();
        let mut guest = TestClient::join(addr, JoinRequest::join_friend("Guest", code.clone())).await;
        assert_eq!(guest.joining().await.joining_result, JoiningResult::Joined);

        // whoever is on move answers the next sub-question right, and passes
        // once all ten are solved
        let mut next_id = 0;
        let final_evaluation = loop {
            let message = host.next_game_message().await;
            guest.next_game_message().await;

            let on_move = match message {
                ServerMessage::Start(start) => {
                    next_id = 0;
                    start.turn.player_on_move
                }
                ServerMessage::Answer(answer) => {
                    if answer.answer_id >= 0 {
                        assert_eq!(answer.player_answer_index, answer.correct_answer_index);
                        next_id = answer.answer_id + 1;
                    }
                    answer.turn.player_on_move
                }
                ServerMessage::Evaluation(evaluation) if evaluation.game_over => break evaluation,
                _ => None,
            };

            if let Some(name) = on_move {
                let client = if name == "Host" { &mut host } else { &mut guest };
                if next_id < SUB_QUESTION_COUNT as i32 {
                    client.answer(next_id, next_id % 4).await;
                } else {
                    client.answer(PLAYER_PASSES, -1).await;
                }
            }
        };

        assert!(final_evaluation.game_over);
        assert_eq!(final_evaluation.player_scores.len(), 2);
        assert!(final_evaluation
            .player_scores
            .iter()
            .any(|score| score.score >= MAX_SCORE));
        assert!(host.recv().await.is_none());
        assert!(guest.recv().await.is_none());

        // the lobby comes back under the same code, sized for both players
        let mut rejoined = None;
        for _ in 0..20 {
            let mut again = TestClient::join(addr, JoinRequest::join_friend("Host", code.clone())).await;
            let joining = again.joining().await;
            if joining.joining_result == JoiningResult::Joined {
                rejoined = Some(joining);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let joining = rejoined.expect("friend code was not reopened");
        assert_eq!(joining.game_code.as_deref(), Some(code.as_str()));
        assert_eq!(joining.player_count, 2);
    }
}
