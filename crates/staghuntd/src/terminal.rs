//! Interactive play on stdin/stdout.

use std::io::{BufRead as _, Write as _};
use std::time::Duration;

use staghunt_games::error::GameError;
use staghunt_games::maze::Move;
use staghunt_games::record::{Episode, EpisodeEnd};
use staghunt_games::session::{run_session, SessionConfig, SessionReport};
use staghunt_games::sim::{Frontend, Phase, TurnView};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::input::Inbox;
use crate::render::render;
use crate::store::DirStore;

pub struct Terminal {
    lines: Inbox<String>,
}

impl Terminal {
    pub fn new(lines: Inbox<String>) -> Self {
        Self { lines }
    }
}

fn legal_list(legal: &[Move]) -> String {
    legal.iter().map(|m| m.as_str()).collect::<Vec<_>>().join("/")
}

impl Frontend for Terminal {
    fn request_move(&mut self, view: &TurnView<'_>) -> Option<Move> {
        loop {
            print!("turn {} [{}]> ", view.turn, legal_list(view.legal));
            let _ = std::io::stdout().flush();
            let line = self.lines.next()?;
            if line.trim().eq_ignore_ascii_case("quit") {
                return None;
            }
            match line.parse::<Move>() {
                Ok(m) => return Some(m),
                Err(e) => println!("{e}"),
            }
        }
    }

    fn display(&mut self, view: &TurnView<'_>) {
        println!();
        print!("{}", render(view.grid, view.positions));
        if let Some(last) = view.last {
            println!(
                "you moved {} (reads as {}), companion chose {} and went for {}",
                last.human_move,
                last.inferred_goal.tag(),
                last.decision.as_str(),
                last.companion_target.tag()
            );
        }
        if view.phase == Phase::Terminal {
            println!("episode over after {} turns", view.turn);
        }
    }

    fn rejected(&mut self, err: &GameError) {
        println!("{err}");
    }

    fn finished(&mut self, episode: &Episode) {
        match &episode.end {
            Some(EpisodeEnd::Completed { outcome, payoffs }) => println!(
                "episode {}: {:?}; you scored {}, the companion {}",
                episode.index + 1,
                outcome,
                payoffs.human,
                payoffs.companion
            ),
            Some(EpisodeEnd::Aborted { reason }) => {
                println!("episode {} aborted: {reason}", episode.index + 1)
            }
            None => {}
        }
    }
}

/// Play one session on this terminal.
pub async fn run(
    cfg: SessionConfig,
    timeout: Option<Duration>,
    mut store: DirStore,
) -> Result<SessionReport, Box<dyn std::error::Error + Send + Sync>> {
    let (tx, rx) = mpsc::channel(16);
    // A plain thread so a pending stdin read never holds up shutdown.
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
        debug!("stdin closed");
    });

    let handle = Handle::current();
    let report = tokio::task::spawn_blocking(move || {
        let mut term = Terminal::new(Inbox::new(rx, handle, timeout));
        println!("moves: N, E, S, W or Stay; 'quit' ends the session");
        run_session(&cfg, &mut term, &mut store)
    })
    .await??;

    println!(
        "session {} saved: {} of {} episodes completed",
        report.session_id,
        report.completed(),
        report.episodes.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_moves_are_listed_in_order() {
        assert_eq!(legal_list(&[Move::East, Move::South, Move::Stay]), "E/S/Stay");
    }
}
