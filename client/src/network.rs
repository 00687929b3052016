//! Relay between the terminal and the server socket.

use crate::game::{ClientGameState, Flow};
use crate::input::{parse_input, Input, HELP};
use crate::rendering::render;
use log::{debug, info};
use tcr_shared::Event;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

pub struct Client {
    state: ClientGameState,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self {
            state: ClientGameState::new(),
        }
    }

    pub fn state(&self) -> &ClientGameState {
        &self.state
    }

    /// Connects to `server` and relays stdin and stdout until either side
    /// closes.
    pub async fn run(&mut self, server: &str) -> Result<(), Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(server).await?;
        info!("Connected to {}", server);
        let (reader, writer) = stream.into_split();

        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        self.relay(stdin, BufReader::new(reader), writer, &mut stdout)
            .await?;
        Ok(())
    }

    /// Forwards typed commands to the server and renders every server line,
    /// whichever arrives first.
    pub async fn relay<I, R, W, O>(
        &mut self,
        input: I,
        server_in: R,
        mut server_out: W,
        out: &mut O,
    ) -> std::io::Result<()>
    where
        I: AsyncBufRead + Unpin,
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut input = input.lines();
        let mut server = server_in.lines();
        print(out, HELP).await?;

        loop {
            tokio::select! {
                line = input.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    match parse_input(&line) {
                        Ok(Input::Empty) => {}
                        Ok(Input::Help) => print(out, HELP).await?,
                        Ok(Input::Quit) => break,
                        Ok(Input::Send(command)) => {
                            debug!("Sending {}", command.keyword());
                            self.state.on_command(&command);
                            server_out.write_all(format!("{command}\n").as_bytes()).await?;
                            server_out.flush().await?;
                        }
                        Err(e) => print(out, &format!("Error: {e}")).await?,
                    }
                }
                line = server.next_line() => {
                    let Some(line) = line? else {
                        print(out, "Server closed the connection").await?;
                        break;
                    };
                    let event = Event::parse(&line);
                    let flow = self.state.apply(&event);
                    print(out, &render(&event, &self.state)).await?;
                    if flow == Flow::Quit {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

async fn print<O: AsyncWrite + Unpin>(out: &mut O, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tcr_shared::GameMode;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_rejected_login_ends_session() {
        let input = Builder::new()
            .read(b"LOGIN|alice|pw\n")
            .wait(Duration::from_secs(5))
            .build();
        let server_in = Builder::new()
            .wait(Duration::from_millis(50))
            .read(b"ERR|Invalid credentials\n")
            .build();
        let server_out = Builder::new().write(b"LOGIN|alice|pw\n").build();
        let mut out = Vec::new();

        let mut client = Client::new();
        client
            .relay(BufReader::new(input), BufReader::new(server_in), server_out, &mut out)
            .await
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.ends_with("Error: Invalid credentials\n"));
        assert!(client.state().username.is_none());
    }

    #[tokio::test]
    async fn test_bad_command_stays_local() {
        let input = Builder::new().read(b"DEPLOY|Knight\nquit\n").build();
        let server_in = Builder::new().wait(Duration::from_secs(5)).build();
        let server_out = Builder::new().build();
        let mut out = Vec::new();

        Client::new()
            .relay(BufReader::new(input), BufReader::new(server_in), server_out, &mut out)
            .await
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Error: Usage: DEPLOY|troop_name|target_tower"));
    }

    #[tokio::test]
    async fn test_match_start_is_tracked() {
        let input = Builder::new().wait(Duration::from_secs(5)).build();
        let server_in = Builder::new()
            .read(b"ACK|GAME_STARTED|SIMPLE\nSTATE|Room: room1\nPlayer: alice (YOU) (TURN)\nTURN|Your turn!\n")
            .build();
        let server_out = Builder::new().build();
        let mut out = Vec::new();

        let mut client = Client::new();
        client
            .relay(BufReader::new(input), BufReader::new(server_in), server_out, &mut out)
            .await
            .unwrap();

        assert_eq!(client.state().mode, Some(GameMode::Simple));
        assert!(client.state().my_turn);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Player: alice (YOU) (TURN)\n"));
        assert!(printed.contains(">>> Your turn!\n"));
        assert!(printed.ends_with("Server closed the connection\n"));
    }
}
