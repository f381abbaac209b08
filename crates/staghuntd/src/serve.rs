//! TCP JSON-lines server: every client plays its own session.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use staghunt_games::entities::Positions;
use staghunt_games::error::GameError;
use staghunt_games::maze::WallMap;
use staghunt_games::record::{Episode, EpisodeEnd, SessionId, TurnRecord};
use staghunt_games::session::{run_session, SessionConfig};
use staghunt_games::sim::{Frontend, Phase, TurnView};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::input::Inbox;
use crate::store::DirStore;

// ═══════════════════════════════════════════════════════════════════════════
// Protocol Messages
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Move { dir: staghunt_games::maze::Move },
    /// Repeat the latest board state.
    GetState,
    Quit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[allow(clippy::large_enum_variant)]
pub enum Event {
    State {
        turn: u32,
        phase: Phase,
        positions: Positions,
        map: WallMap,
        #[serde(default)]
        last: Option<TurnRecord>,
    },
    AwaitingMove {
        turn: u32,
        legal: Vec<staghunt_games::maze::Move>,
    },
    Rejected {
        message: String,
    },
    EpisodeEnded {
        index: u32,
        turns: usize,
        end: Option<EpisodeEnd>,
    },
    SessionEnded {
        session_id: SessionId,
        completed: usize,
        played: usize,
        #[serde(default)]
        stopped_early: Option<String>,
    },
    Error {
        message: String,
    },
}

/// Shared by every client connection.
pub struct ServerCtx {
    pub cfg: SessionConfig,
    pub move_timeout: Option<Duration>,
    pub store: DirStore,
}

/// Frontend backed by the client's connection: events go out through
/// `events`, moves come in through `moves`.
struct Remote {
    moves: Inbox<staghunt_games::maze::Move>,
    events: mpsc::UnboundedSender<Event>,
}

impl Remote {
    fn send(&self, ev: Event) {
        // The client task is gone; the next request_move reports it.
        let _ = self.events.send(ev);
    }
}

impl Frontend for Remote {
    fn request_move(&mut self, view: &TurnView<'_>) -> Option<staghunt_games::maze::Move> {
        self.send(Event::AwaitingMove {
            turn: view.turn,
            legal: view.legal.to_vec(),
        });
        self.moves.next()
    }

    fn display(&mut self, view: &TurnView<'_>) {
        self.send(Event::State {
            turn: view.turn,
            phase: view.phase,
            positions: *view.positions,
            map: view.grid.wall_map(),
            last: view.last.cloned(),
        });
    }

    fn rejected(&mut self, err: &GameError) {
        self.send(Event::Rejected {
            message: err.to_string(),
        });
    }

    fn finished(&mut self, episode: &Episode) {
        self.send(Event::EpisodeEnded {
            index: episode.index,
            turns: episode.turns.len(),
            end: episode.end.clone(),
        });
    }
}

async fn write_event(
    writer: &mut OwnedWriteHalf,
    ev: &Event,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    writer.write_all(serde_json::to_string(ev)?.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

async fn handle_client(
    stream: TcpStream,
    ctx: Arc<ServerCtx>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let (move_tx, move_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let cfg = ctx.cfg.clone();
    let mut store = ctx.store.handle();
    let inbox = Inbox::new(move_rx, Handle::current(), ctx.move_timeout);
    let session = tokio::task::spawn_blocking(move || {
        let mut remote = Remote {
            moves: inbox,
            events: event_tx,
        };
        let ev = match run_session(&cfg, &mut remote, &mut store) {
            Ok(report) => Event::SessionEnded {
                session_id: report.session_id,
                completed: report.completed(),
                played: report.episodes.len(),
                stopped_early: report.stopped_early,
            },
            Err(e) => Event::Error {
                message: e.to_string(),
            },
        };
        remote.send(ev);
    });

    let mut last_state: Option<Event> = None;
    loop {
        tokio::select! {
            ev = event_rx.recv() => {
                let Some(ev) = ev else { break };
                if matches!(ev, Event::State { .. }) {
                    last_state = Some(ev.clone());
                }
                write_event(&mut writer, &ev).await?;
                if matches!(ev, Event::SessionEnded { .. } | Event::Error { .. }) {
                    break;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Request>(&line) {
                    Ok(Request::Move { dir }) => {
                        if move_tx.send(dir).await.is_err() {
                            let ev = Event::Error { message: "session is over".to_string() };
                            write_event(&mut writer, &ev).await?;
                        }
                    }
                    Ok(Request::GetState) => {
                        let ev = last_state.clone().unwrap_or(Event::Error {
                            message: "no state yet".to_string(),
                        });
                        write_event(&mut writer, &ev).await?;
                    }
                    Ok(Request::Quit) => break,
                    Err(e) => {
                        let ev = Event::Error { message: format!("Invalid request: {}", e) };
                        write_event(&mut writer, &ev).await?;
                    }
                }
            }
        }
    }

    // Closing the move channel cancels a session still waiting for input.
    drop(move_tx);
    if let Err(e) = session.await {
        warn!("session task failed: {}", e);
    }
    Ok(())
}

/// Accept clients until the listener fails.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerCtx>) -> std::io::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        info!("Client connected: {}", addr);
        let ctx = Arc::clone(&ctx);

        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, ctx).await {
                error!("Client handler error: {}", e);
            }
            info!("Client disconnected: {}", addr);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::AppPaths;
    use staghunt_games::maze::Move;

    #[test]
    fn requests_parse_from_json_lines() {
        let r: Request = serde_json::from_str(r#"{"type":"Move","dir":"N"}"#).unwrap();
        assert!(matches!(r, Request::Move { dir: Move::North }));
        let r: Request = serde_json::from_str(r#"{"type":"Move","dir":"Stay"}"#).unwrap();
        assert!(matches!(r, Request::Move { dir: Move::Stay }));
        assert!(matches!(
            serde_json::from_str::<Request>(r#"{"type":"GetState"}"#).unwrap(),
            Request::GetState
        ));
        assert!(serde_json::from_str::<Request>(r#"{"type":"Move","dir":"up"}"#).is_err());
    }

    #[test]
    fn events_carry_their_type_tag() {
        let ev = Event::AwaitingMove {
            turn: 3,
            legal: vec![Move::East, Move::Stay],
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "AwaitingMove");
        assert_eq!(json["legal"], serde_json::json!(["E", "Stay"]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_client_plays_a_whole_session() {
        let dir = std::env::temp_dir().join(format!(
            "staghuntd-serve-{}-{}",
            std::process::id(),
            staghunt_games::record::unix_ms()
        ));
        let store = DirStore::open(AppPaths::new(Some(dir.clone())).unwrap()).unwrap();
        let ctx = Arc::new(ServerCtx {
            cfg: SessionConfig {
                max_turns: 2,
                stop_on_capture: false,
                ..SessionConfig::default()
            },
            move_timeout: None,
            store,
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, ctx));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        let mut awaited = 0;
        let mut ended = None;
        while let Some(line) = lines.next_line().await.unwrap() {
            match serde_json::from_str::<Event>(&line).unwrap() {
                Event::AwaitingMove { .. } => {
                    awaited += 1;
                    writer
                        .write_all(b"{\"type\":\"Move\",\"dir\":\"Stay\"}\n")
                        .await
                        .unwrap();
                }
                Event::SessionEnded {
                    session_id,
                    completed,
                    ..
                } => {
                    ended = Some((session_id, completed));
                    break;
                }
                Event::Error { message } => panic!("server error: {message}"),
                _ => {}
            }
        }

        assert_eq!(awaited, 2);
        assert_eq!(ended, Some((1, 1)));
        assert!(dir.join("session_1.json").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
