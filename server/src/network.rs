//! TCP listener and background maintenance

use crate::connection::Connection;
use crate::game_manager::GameManager;
use crate::player::{PlayerActor, PlayerId};
use log::{error, info};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};

/// How often abandoned lobbies are swept
pub const REAPER_INTERVAL: Duration = Duration::from_secs(5);

/// Accepts connections and hands each one to a player actor
pub struct Server {
    listener: TcpListener,
    manager: GameManager,
    next_player_id: PlayerId,
}

impl Server {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        manager: GameManager,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            manager,
            next_player_id: 1,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawns task that drops lobbies nobody joined in time
    fn spawn_lobby_reaper(&self) {
        let manager = self.manager.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REAPER_INTERVAL);

            loop {
                interval.tick().await;

                let removed = manager.prune_expired().await;
                if removed > 0 {
                    info!("Removed {} expired lobbies", removed);
                }
            }
        });
    }

    /// Main accept loop
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.spawn_lobby_reaper();

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        error!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                    }

                    let id = self.next_player_id;
                    self.next_player_id = self.next_player_id.wrapping_add(1);
                    info!("Player {} connected from {}", id, peer);

                    let (connection, handle, events) = Connection::new(stream, peer);
                    connection.spawn();
                    tokio::spawn(PlayerActor::new(id, handle, events, self.manager.clone()).run());
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}
