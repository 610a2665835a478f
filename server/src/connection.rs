//! Per-socket connection service
//!
//! Each accepted socket is driven by one task that:
//! - Writes queued outbound lines in the order they were queued, from its
//!   own writer task
//! - Reads inbound lines only while a message is expected
//! - Fires a timeout when the expected message misses its deadline
//!
//! The task never interprets the lines it moves. Whoever owns the
//! [`ConnectionHandle`] queues output and arms deadlines; whoever owns the
//! event receiver gets each inbound line, or a single failure event when the
//! connection dies while a message was expected.

use log::{debug, info, warn};
use shared::{LineBuffer, EXTRA_TIME, MAX_FRAME_LEN};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

/// How long a closing connection may spend flushing queued output
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands accepted by the connection task
#[derive(Debug)]
pub enum ConnectionCommand {
    /// Queue one line for sending
    Send(String),
    /// Expect an inbound line within `timeout` plus the protocol grace
    Expect(Duration),
    /// Keep waiting under the current deadline after a partial frame
    Resume,
    /// Drop the current expectation
    Confirm,
    /// Flush everything queued so far, then close
    Close,
}

/// Why a connection stopped while a message was expected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Timeout,
    Closed,
    Io(String),
    LineTooLong,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Timeout => write!(f, "message timeout"),
            Failure::Closed => write!(f, "connection closed by peer"),
            Failure::Io(e) => write!(f, "i/o error: {}", e),
            Failure::LineTooLong => write!(f, "inbound line too long"),
        }
    }
}

/// Events delivered to the owner of the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Line(String),
    Error(Failure),
}

/// Cloneable sending side of a connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<ConnectionCommand>,
}

impl ConnectionHandle {
    pub fn new(commands: mpsc::UnboundedSender<ConnectionCommand>) -> Self {
        Self { commands }
    }

    /// Queues a line. Returns false once the connection is gone.
    pub fn send_line(&self, line: String) -> bool {
        self.commands.send(ConnectionCommand::Send(line)).is_ok()
    }

    /// Arms the receive deadline. Returns false once the connection is gone,
    /// in which case no event will ever follow.
    pub fn expect_message(&self, timeout: Duration) -> bool {
        self.commands.send(ConnectionCommand::Expect(timeout)).is_ok()
    }

    pub fn resume(&self) -> bool {
        self.commands.send(ConnectionCommand::Resume).is_ok()
    }

    pub fn confirm(&self) -> bool {
        self.commands.send(ConnectionCommand::Confirm).is_ok()
    }

    pub fn close(&self) {
        let _ = self.commands.send(ConnectionCommand::Close);
    }

    pub fn is_open(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Connection service owning one socket
pub struct Connection<S> {
    stream: S,
    peer: SocketAddr,
    commands: mpsc::UnboundedReceiver<ConnectionCommand>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
    ) -> (Self, ConnectionHandle, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let connection = Connection {
            stream,
            peer,
            commands: command_rx,
            events: event_tx,
        };
        (connection, ConnectionHandle::new(command_tx), event_rx)
    }

    /// Spawns the connection task on the current runtime
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drives the socket until it fails, times out or is closed
    ///
    /// Each delivered line consumes the current expectation, so at most one
    /// line is in flight towards the owner at a time. Lines that arrive
    /// early stay buffered until the next expectation is armed.
    pub async fn run(self) {
        let Connection {
            stream,
            peer,
            mut commands,
            events,
        } = self;
        let (mut reader, writer) = tokio::io::split(stream);
        let (outbound, queued) = mpsc::unbounded_channel();
        let mut writer_task = tokio::spawn(write_lines(writer, queued));
        let mut writer_done = false;

        let mut lines = LineBuffer::new();
        let mut buffer = [0u8; 2048];
        let mut deadline: Option<Instant> = None;
        let mut armed = false;
        let mut failure: Option<Failure> = None;

        loop {
            if armed {
                if let Some(line) = lines.next_line() {
                    debug!("Received message from {}: {}", peer, line);
                    armed = false;
                    if events.send(ConnectionEvent::Line(line)).is_err() {
                        break;
                    }
                    continue;
                }
            }

            let wake_at = deadline.unwrap_or_else(Instant::now);

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(ConnectionCommand::Send(line)) => {
                        debug!("Sending message to {}: {}", peer, line);
                        // a dead writer shows up in the branch below
                        let _ = outbound.send(line);
                    }
                    Some(ConnectionCommand::Expect(timeout)) => {
                        deadline = Some(Instant::now() + EXTRA_TIME + timeout);
                        armed = true;
                    }
                    Some(ConnectionCommand::Resume) => {
                        armed = deadline.is_some();
                    }
                    Some(ConnectionCommand::Confirm) => {
                        deadline = None;
                        armed = false;
                    }
                    Some(ConnectionCommand::Close) | None => {
                        debug!("Closing connection to {}", peer);
                        break;
                    }
                },

                written = &mut writer_task, if !writer_done => {
                    writer_done = true;
                    let reason = match written {
                        Ok(Ok(())) => "writer stopped".to_string(),
                        Ok(Err(e)) => e.to_string(),
                        Err(e) => e.to_string(),
                    };
                    failure = Some(Failure::Io(reason));
                    break;
                }

                _ = sleep_until(wake_at), if armed && deadline.is_some() => {
                    failure = Some(Failure::Timeout);
                    break;
                }

                read = reader.read(&mut buffer), if armed => match read {
                    Ok(0) => {
                        failure = Some(Failure::Closed);
                        break;
                    }
                    Ok(n) => {
                        lines.extend(&buffer[..n]);
                        if lines.pending_len() > MAX_FRAME_LEN {
                            failure = Some(Failure::LineTooLong);
                            break;
                        }
                    }
                    Err(e) => {
                        failure = Some(Failure::Io(e.to_string()));
                        break;
                    }
                },
            }
        }

        // A deadline armed after we stopped must still be answered.
        commands.close();
        while let Ok(command) = commands.try_recv() {
            if matches!(command, ConnectionCommand::Expect(_)) {
                armed = true;
                failure.get_or_insert(Failure::Closed);
            }
        }

        match failure {
            Some(failure) if armed => {
                warn!("Connection error with {}: {}", peer, failure);
                let _ = events.send(ConnectionEvent::Error(failure));
            }
            Some(failure) => info!("Connection to {} stopped: {}", peer, failure),
            None => info!("Connection to {} closed", peer),
        }

        drop(outbound);
        if !writer_done
            && tokio::time::timeout(FLUSH_TIMEOUT, &mut writer_task)
                .await
                .is_err()
        {
            warn!("Dropping unsent output to {}", peer);
            writer_task.abort();
        }
    }
}

/// Writes queued lines until the queue closes, then shuts the stream down.
async fn write_lines<W>(
    mut writer: W,
    mut queued: mpsc::UnboundedReceiver<String>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = queued.recv().await {
        write_line(&mut writer, &line).await?;
    }
    writer.shutdown().await
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
