//! TCP command server in front of the [`LidarController`].
//!
//! Every client gets its own task. Controller calls that may block (link
//! init, flush window, bounded join) run on the blocking pool, so a slow
//! `START` never stalls `PING` or `DISTANCE` on other connections.

use std::net::SocketAddr;
use std::sync::Arc;

use controller::LidarController;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::error::{CliError, Result};
use crate::protocol::{Command, Reply};

/// Handle that stops the server from outside (signals)
#[derive(Clone)]
pub struct ShutdownTrigger(Arc<watch::Sender<bool>>);

impl ShutdownTrigger {
    pub fn fire(&self) {
        self.0.send_replace(true);
    }
}

/// Listener plus the controller it serves
pub struct CommandServer {
    listener: TcpListener,
    controller: Arc<LidarController>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl CommandServer {
    pub async fn bind(addr: &str, controller: Arc<LidarController>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CliError::bind(addr, e.to_string()))?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            listener,
            controller,
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger(Arc::clone(&self.shutdown))
    }

    /// Accept clients until `SHUTDOWN` or the trigger fires
    #[instrument(name = "command_server", skip(self))]
    pub async fn run(self) -> Result<()> {
        let mut stop = self.shutdown.subscribe();
        let mut clients = JoinSet::new();
        info!(addr = ?self.listener.local_addr().ok(), "command server listening");

        loop {
            tokio::select! {
                _ = stopped(&mut stop) => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "client connected");
                        let controller = Arc::clone(&self.controller);
                        let shutdown = Arc::clone(&self.shutdown);
                        clients.spawn(async move {
                            if let Err(e) = serve_client(stream, controller, shutdown).await {
                                warn!(%peer, error = %e, "client session ended with error");
                            }
                            debug!(%peer, "client disconnected");
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                Some(_) = clients.join_next(), if !clients.is_empty() => {}
            }
        }

        drop(self.listener);
        while clients.join_next().await.is_some() {}
        info!("command server stopped");
        Ok(())
    }
}

async fn serve_client(
    stream: TcpStream,
    controller: Arc<LidarController>,
    shutdown: Arc<watch::Sender<bool>>,
) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut line = Vec::with_capacity(64);
    let mut stop = shutdown.subscribe();

    loop {
        line.clear();
        let read = tokio::select! {
            read = reader.read_until(b'\n', &mut line) => read?,
            _ = stopped(&mut stop) => break,
        };
        if read == 0 {
            break;
        }

        // Bytes that are not UTF-8 never match a verb
        let command = Command::parse(&String::from_utf8_lossy(&line));
        let reply = execute(&controller, &command).await?;
        write.write_all(format!("{reply}\n").as_bytes()).await?;
        write.flush().await?;

        match command {
            Command::Exit => break,
            Command::Shutdown => {
                shutdown.send_replace(true);
                break;
            }
            _ => {}
        }
    }
    Ok(())
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|s| *s).await;
}

/// Run one command against the controller
pub async fn execute(controller: &Arc<LidarController>, command: &Command) -> Result<Reply> {
    let reply = match command {
        Command::Ping => Reply::Pong,
        Command::Distance => Reply::Distance(controller.distance()),
        Command::Status => Reply::State(controller.state()),
        Command::Exit => Reply::Bye,
        Command::Unknown => Reply::UnknownCommand,
        Command::Mode(None) => Reply::Err,

        Command::Start => match blocking(controller, |c| c.start()).await? {
            Ok(()) => Reply::Started,
            Err(e) => {
                warn!(error = %e, "START failed");
                Reply::StartFailed
            }
        },
        Command::Stop => match blocking(controller, |c| c.stop()).await? {
            Ok(()) => Reply::Stopped,
            Err(e) => {
                warn!(error = %e, "STOP failed");
                Reply::StopFailed
            }
        },
        Command::Mode(Some(mask)) => {
            let mask = *mask;
            let result = blocking(controller, move |c| {
                c.connect()?;
                c.set_mode(mask)
            })
            .await?;
            match result {
                Ok(()) => Reply::Ok,
                Err(e) => {
                    warn!(mask, error = %e, "MODE rejected");
                    Reply::Err
                }
            }
        }
        Command::Shutdown => {
            if let Err(e) = blocking(controller, |c| c.shutdown()).await? {
                warn!(error = %e, "controller shutdown incomplete");
            }
            Reply::ShuttingDown
        }
    };
    Ok(reply)
}

async fn blocking<T, F>(controller: &Arc<LidarController>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&LidarController) -> T + Send + 'static,
{
    let controller = Arc::clone(controller);
    tokio::task::spawn_blocking(move || f(&controller))
        .await
        .map_err(|e| CliError::task(e.to_string()))
}
