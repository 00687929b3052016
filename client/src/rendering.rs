//! Text rendering of server events for the terminal.

use crate::game::ClientGameState;
use std::fmt::Write;
use tcr_shared::{Event, MatchSnapshot, TOWER_NAMES};

/// Renders one event. `state` must already include the event.
pub fn render(event: &Event, state: &ClientGameState) -> String {
    match event {
        Event::Ack(message) => format!("OK: {}", message.replace('|', " ")),
        Event::Err(reason) => format!("Error: {}", reason),
        Event::Games(games) if games.is_empty() => "No open games.".to_string(),
        Event::Games(games) => {
            let mut out = String::from("Open games:");
            for (id, host) in games {
                let _ = write!(out, "\n  {} (host: {})", id, host);
            }
            out
        }
        Event::State(body) => match (&state.snapshot, body.starts_with('{')) {
            (Some(snapshot), true) => render_snapshot(snapshot, state.username.as_deref()),
            _ => body.clone(),
        },
        Event::AttackResult {
            troop,
            tower,
            damage,
            remaining_hp,
            extra,
        } => {
            let mut out = format!(
                "{} hit {} for {} damage ({} HP left)",
                troop, tower, damage, remaining_hp
            );
            let notes: Vec<String> = extra
                .iter()
                .map(|field| match field.split_once(':') {
                    Some(("CRIT", "true")) => "critical counter".to_string(),
                    Some(("COUNTER", dmg)) => format!("counter {}", dmg),
                    Some(("CRIT", _)) => String::new(),
                    _ => field.to_lowercase(),
                })
                .filter(|note| !note.is_empty())
                .collect();
            if !notes.is_empty() {
                let _ = write!(out, " [{}]", notes.join(", "));
            }
            out
        }
        Event::QueenHeal {
            healer,
            tower,
            amount,
            new_hp,
        } => format!("{}'s Queen healed {} by {} (now {} HP)", healer, tower, amount, new_hp),
        Event::Turn { yours: true } => ">>> Your turn!".to_string(),
        Event::Turn { yours: false } => "Wait for your turn...".to_string(),
        Event::GameEnd(message) => format!("=== {} ===", message),
        Event::Text(line) => line.clone(),
    }
}

fn render_snapshot(snapshot: &MatchSnapshot, me: Option<&str>) -> String {
    let mut out = format!("Room {}", snapshot.room_id);
    if snapshot.over {
        let winner = if snapshot.winner.is_empty() {
            "draw"
        } else {
            snapshot.winner.as_str()
        };
        let _ = write!(out, " - over ({})", winner);
    } else {
        let _ = write!(
            out,
            " - {}:{:02} left",
            snapshot.remaining_secs / 60,
            snapshot.remaining_secs % 60
        );
    }

    for player in snapshot.players.values() {
        let you = if Some(player.username.as_str()) == me { " (YOU)" } else { "" };
        let _ = write!(
            out,
            "\n{}{} - level {}, {} EXP, mana {}",
            player.username, you, player.level, player.exp, player.mana
        );
        for name in TOWER_NAMES {
            if let Some(tower) = player.towers.get(name) {
                let _ = write!(out, "\n  {:<7} HP={:<5} ATK={} DEF={}", tower.name, tower.hp, tower.atk, tower.def);
            }
        }
        let troops: Vec<String> = player
            .troops
            .iter()
            .filter(|t| t.is_usable())
            .map(|t| format!("{}({})", t.name, t.hp))
            .collect();
        let _ = write!(out, "\n  Troops: {}", troops.join(" "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcr_shared::{PlayerSnapshot, Tower, Troop};
    use std::collections::BTreeMap;

    #[test]
    fn test_attack_result_notes() {
        let state = ClientGameState::new();
        let event = Event::parse("ATTACK_RESULT|Knight|Guard1|200|0|CRIT:true|COUNTER:210|DESTROYED");
        assert_eq!(
            render(&event, &state),
            "Knight hit Guard1 for 200 damage (0 HP left) [critical counter, counter 210, destroyed]"
        );

        let plain = Event::parse("ATTACK_RESULT|Pawn|Guard2|50|950|CRIT:false|COUNTER:0");
        assert_eq!(render(&plain, &state), "Pawn hit Guard2 for 50 damage (950 HP left) [counter 0]");
    }

    #[test]
    fn test_games_list() {
        let state = ClientGameState::new();
        assert_eq!(render(&Event::parse("GAMES|"), &state), "No open games.");
        assert_eq!(
            render(&Event::parse("GAMES|room1:alice"), &state),
            "Open games:\n  room1 (host: alice)"
        );
    }

    #[test]
    fn test_enhanced_snapshot() {
        let mut towers = BTreeMap::new();
        towers.insert(
            "King".to_string(),
            Tower {
                name: "King".to_string(),
                hp: 2000,
                atk: 500,
                def: 300,
            },
        );
        let mut players = BTreeMap::new();
        players.insert(
            "alice".to_string(),
            PlayerSnapshot {
                username: "alice".to_string(),
                towers,
                troops: vec![Troop {
                    name: "Pawn".to_string(),
                    hp: 50,
                    atk: 150,
                    def: 100,
                    owner: "alice".to_string(),
                }],
                mana: 4,
                exp: 20,
                level: 2,
            },
        );
        let snapshot = MatchSnapshot {
            room_id: "room2".to_string(),
            players,
            winner: String::new(),
            over: false,
            start_time: 0,
            end_time: 180,
            remaining_secs: 95,
            attack_patterns: BTreeMap::new(),
        };

        let mut state = ClientGameState::new();
        state.username = Some("alice".to_string());
        state.snapshot = Some(snapshot.clone());
        let text = render(&Event::State(snapshot.to_json().unwrap()), &state);

        assert!(text.starts_with("Room room2 - 1:35 left"));
        assert!(text.contains("alice (YOU) - level 2, 20 EXP, mana 4"));
        assert!(text.contains("Troops: Pawn(50)"));
    }
}
