//! # Trivia Server Library
//!
//! This library implements the server side of a turn-based multiplayer
//! trivia game. Players connect over TCP, are matched into sessions and then
//! take turns answering the sub-questions of one topic per round. A wrong
//! answer knocks a player out of the round; the first player to collect
//! enough points over several rounds wins.
//!
//! ## Core Responsibilities
//!
//! ### Matchmaking
//! Incoming players either join a quick two player online game or a friend
//! game identified by a short code. Lobbies that do not fill up within the
//! matchmaking window expire and their players are disconnected.
//!
//! ### Turn Sequencing
//! Each round walks its players round-robin. The server tells every player
//! who is on move, waits for that player's answer under a deadline and
//! broadcasts the result, personalized per recipient.
//!
//! ### Failure Handling
//! Timeouts, I/O errors and protocol violations are all folded into the
//! same disconnect answer, so game logic has one failure path only. A broken
//! connection never stops the rest of the session.
//!
//! ## Architecture Design
//!
//! ### Task per Concern
//! - **Connection**: one task per socket moving lines in and out and
//!   enforcing receive deadlines
//! - **Player actor**: one task per socket decoding join requests and answers
//! - **Session**: one task per running game, the only writer of game state
//! - **Lobby reaper**: one task sweeping expired lobbies
//!
//! All of them talk over unbounded channels. The matchmaking registry is the
//! only shared state and sits behind a single async mutex.
//!
//! ### Line-Based JSON Protocol
//! Every message is one JSON object per line, tagged with its `type`. The
//! message definitions and the codec live in the `shared` crate.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! - Buffered line I/O over any async stream
//! - Receive deadlines armed by the owner
//!
//! ### Player Module (`player`)
//! - Per-player scores and inactivity accounting
//! - The actor translating lines into join requests and answers
//!
//! ### Round and Game Modules (`round`, `game`)
//! - Turn order, elimination and scoring within a question
//! - Lobby bookkeeping, evaluation and game over detection
//!
//! ### Session and Manager Modules (`session`, `game_manager`)
//! - The supervisor driving one game to its end
//! - The registry matching players to lobbies
//!
//! ### Question Module (`questions`)
//! - Loading question files and drawing them at random
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game_manager::GameManager;
//! use server::network::Server;
//! use server::questions::{DirectorySource, QuestionPool};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let pool = Arc::new(QuestionPool::new(DirectorySource::new("questions")));
//!     let manager = GameManager::new(pool);
//!
//!     let mut server = Server::bind("127.0.0.1:4444", manager).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod game;
pub mod game_manager;
pub mod network;
pub mod player;
pub mod questions;
pub mod round;
pub mod session;
pub mod utils;
