//! Matchmaking registry
//!
//! Every join request goes through [`GameManager::connect_player`], which
//! runs under one lock so that concurrent connections never seat two
//! players in the same slot or join a lobby that is already leaving for a
//! session. Full lobbies leave the registry and continue in their own
//! session task.

use crate::game::{Game, GameKind, Rematch};
use crate::player::Player;
use crate::questions::QuestionPool;
use crate::session::{self, SessionReceiver, SessionSender};
use crate::utils::{generate_game_code, get_timestamp};
use log::{info, warn};
use shared::codec::validate_join;
use shared::{
    JoinRequest, Joining, JoiningResult, ProtocolError, RequestType, ServerMessage,
    ONLINE_PLAYER_COUNT,
};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug)]
pub enum JoinOutcome {
    /// Seated in a lobby; answers go to this sender
    Joined(SessionSender),
    /// Refused with a `Joining` reply already queued
    Rejected(JoiningResult),
    /// The request itself was invalid; nothing was sent
    Invalid(ProtocolError),
}

struct Lobby {
    game: Game,
    inbox: SessionReceiver,
}

impl Lobby {
    fn new(kind: GameKind, player_count: u8, pool: Arc<QuestionPool>) -> Self {
        let (sender, inbox) = session::channel();
        Self {
            game: Game::new(kind, player_count, pool, sender),
            inbox,
        }
    }
}

#[derive(Default)]
struct Lobbies {
    online: Vec<Lobby>,
    friend: Vec<Lobby>,
}

impl Lobbies {
    /// Drops lobbies past the matchmaking window and closes whoever was
    /// still waiting in them.
    fn prune_expired(&mut self, now: u64) -> usize {
        let mut removed = 0;
        for list in [&mut self.online, &mut self.friend] {
            let before = list.len();
            list.retain(|lobby| {
                if lobby.game.is_expired(now) {
                    info!("{} expired with {} waiting", lobby.game, lobby.game.player_total());
                    lobby.game.close_all();
                    false
                } else {
                    true
                }
            });
            removed += before - list.len();
        }
        removed
    }

    fn friend_index(&self, code: &str) -> Option<usize> {
        self.friend
            .iter()
            .position(|lobby| lobby.game.code() == Some(code))
    }

    fn unused_code(&self) -> String {
        loop {
            let code = generate_game_code();
            if self.friend_index(&code).is_none() {
                return code;
            }
        }
    }
}

/// Shared handle to the registry
#[derive(Clone)]
pub struct GameManager {
    lobbies: Arc<Mutex<Lobbies>>,
    pool: Arc<QuestionPool>,
}

impl GameManager {
    pub fn new(pool: Arc<QuestionPool>) -> Self {
        Self {
            lobbies: Arc::new(Mutex::new(Lobbies::default())),
            pool,
        }
    }

    /// Seats a player according to their join request.
    pub async fn connect_player(&self, request: JoinRequest, player: Player) -> JoinOutcome {
        let mut lobbies = self.lobbies.lock().await;
        lobbies.prune_expired(get_timestamp());

        if let Err(e) = validate_join(&request) {
            warn!("Refusing join request from {}: {}", player.name(), e);
            return JoinOutcome::Invalid(e);
        }

        match request.request_type {
            RequestType::JoinOnlineGame => self.join_online_game(&mut lobbies, player),
            RequestType::JoinFriendGame => {
                let code = request.game_code.unwrap_or_default();
                self.join_friend_game(&mut lobbies, player, &code)
            }
            RequestType::CreateFriendGame => {
                let player_count = request.player_count.unwrap_or(ONLINE_PLAYER_COUNT);
                self.create_friend_game(&mut lobbies, player, player_count)
            }
        }
    }

    /// Opens the lobby for another game under the same friend code.
    pub async fn reopen(&self, rematch: Rematch) {
        let mut lobbies = self.lobbies.lock().await;
        lobbies.prune_expired(get_timestamp());
        self.reopen_friend_game(&mut lobbies, rematch.code, rematch.player_count);
    }

    /// Removes expired lobbies. Returns how many were dropped.
    pub async fn prune_expired(&self) -> usize {
        self.lobbies.lock().await.prune_expired(get_timestamp())
    }

    /// Number of open online and friend lobbies
    pub async fn lobby_count(&self) -> (usize, usize) {
        let lobbies = self.lobbies.lock().await;
        (lobbies.online.len(), lobbies.friend.len())
    }

    fn join_online_game(&self, lobbies: &mut Lobbies, player: Player) -> JoinOutcome {
        let index = match lobbies
            .online
            .iter()
            .position(|lobby| !lobby.game.name_already_joined(player.name()))
        {
            Some(index) => index,
            None => {
                let lobby = Lobby::new(GameKind::Online, ONLINE_PLAYER_COUNT, self.pool.clone());
                info!("Created {}", lobby.game);
                lobbies.online.push(lobby);
                lobbies.online.len() - 1
            }
        };
        self.attach(&mut lobbies.online, index, player)
    }

    fn join_friend_game(&self, lobbies: &mut Lobbies, player: Player, code: &str) -> JoinOutcome {
        let Some(index) = lobbies.friend_index(code) else {
            info!("{} asked for unknown game {}", player.name(), code);
            return Self::reject(&player, JoiningResult::GameNotFound);
        };
        if lobbies.friend[index].game.name_already_joined(player.name()) {
            info!("Name {} is already taken in game {}", player.name(), code);
            return Self::reject(&player, JoiningResult::NameAlreadyJoined);
        }
        self.attach(&mut lobbies.friend, index, player)
    }

    fn create_friend_game(
        &self,
        lobbies: &mut Lobbies,
        player: Player,
        player_count: u8,
    ) -> JoinOutcome {
        let code = lobbies.unused_code();
        let lobby = Lobby::new(GameKind::Friend { code }, player_count, self.pool.clone());
        info!("Created {} for {} players", lobby.game, player_count);
        lobbies.friend.push(lobby);
        let index = lobbies.friend.len() - 1;
        self.attach(&mut lobbies.friend, index, player)
    }

    fn reopen_friend_game(&self, lobbies: &mut Lobbies, code: String, player_count: u8) {
        if lobbies.friend_index(&code).is_some() {
            warn!("Friend game {} is already open, not reopening", code);
            return;
        }
        let lobby = Lobby::new(GameKind::Friend { code }, player_count, self.pool.clone());
        info!("Reopened {} for {} players", lobby.game, player_count);
        lobbies.friend.push(lobby);
    }

    /// Seats the player and starts the session once the lobby is full.
    fn attach(&self, list: &mut Vec<Lobby>, index: usize, player: Player) -> JoinOutcome {
        let lobby = &mut list[index];
        let session = lobby.game.session_sender();
        lobby.game.add_waiting_player(player);

        if lobby.game.ready_to_start() {
            let lobby = list.remove(index);
            self.start_session(lobby);
        }
        JoinOutcome::Joined(session)
    }

    fn start_session(&self, lobby: Lobby) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Some(rematch) = session::run(lobby.game, lobby.inbox).await {
                manager.reopen(rematch).await;
            }
        });
    }

    fn reject(player: &Player, result: JoiningResult) -> JoinOutcome {
        player.send_message(&ServerMessage::Joining(Joining::rejected(result)));
        JoinOutcome::Rejected(result)
    }
}
