//! Server network layer: TCP accept loop and per-connection reader/writer
//! tasks.

use crate::context::ServerContext;
use crate::handler::Session;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Listening server. Every accepted socket gets its own task.
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Server {
    pub async fn bind(addr: &str, ctx: Arc<ServerContext>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Server { listener, ctx })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the task is dropped.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((socket, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(handle_connection(socket, addr, ctx));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Drives one socket: lines in, replies and pushes out through a single
/// ordered queue.
async fn handle_connection(socket: TcpStream, addr: SocketAddr, ctx: Arc<ServerContext>) {
    let (reader, mut writer) = socket.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        while let Some(mut line) = rx.recv().await {
            line.push('\n');
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                error!("Failed to write to {}: {}", addr, e);
                break;
            }
        }
    });

    let mut session = Session::new(ctx, addr, tx.clone());
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(reply) = session.handle_line(&line).await {
                    if tx.send(reply.to_string()).is_err() {
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Read error from {}: {}", addr, e);
                break;
            }
        }
    }

    session.close().await;
    drop(session);
    drop(tx);
    if let Err(e) = writer_task.await {
        error!("Writer task for {} panicked: {}", addr, e);
    }
}
