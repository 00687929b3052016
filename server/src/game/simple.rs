//! Turn-based matches.
//!
//! Players alternate single deployments from a fixed hand of three troops.
//! A match ends when a King falls or a player runs out of troops, or when
//! someone leaves.

use super::combat::{self, AttackPatterns, Towers};
use super::{Outcome, Verdict};
use crate::connections::ConnectionRegistry;
use crate::error::{GameError, Result};
use crate::rooms::{Room, RoomRegistry};
use crate::specs::SpecStore;
use log::{debug, info};
use rand::Rng;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use tcr_shared::{Event, GameMode, Troop, KING, TOWER_NAMES};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct SimplePlayer {
    pub username: String,
    pub towers: Towers,
    pub troops: Vec<Troop>,
    pub turn: bool,
}

impl SimplePlayer {
    fn has_troops_left(&self) -> bool {
        self.troops.iter().any(|t| t.hp > 0)
    }
}

#[derive(Debug, Clone)]
pub struct SimpleMatch {
    pub room_id: String,
    pub players: [SimplePlayer; 2],
    pub turn_user: String,
    pub verdict: Option<Verdict>,
    pub attack_patterns: AttackPatterns,
}

impl SimpleMatch {
    /// Deals both hands and flips a coin for the first turn.
    pub fn new<R: Rng + ?Sized>(
        room_id: &str,
        host: &str,
        guest: &str,
        specs: &SpecStore,
        rng: &mut R,
    ) -> Self {
        let mut player = |username: &str| SimplePlayer {
            username: username.to_string(),
            towers: combat::build_towers(specs, |_| 1.0),
            troops: combat::deal_troops(specs, username, 1.0, rng),
            turn: false,
        };
        let mut players = [player(host), player(guest)];

        let first = rng.gen_range(0..2);
        players[first].turn = true;
        let turn_user = players[first].username.clone();

        Self {
            room_id: room_id.to_string(),
            players,
            turn_user,
            verdict: None,
            attack_patterns: AttackPatterns::new(),
        }
    }

    pub fn is_over(&self) -> bool {
        self.verdict.is_some()
    }

    pub fn has_player(&self, username: &str) -> bool {
        self.index_of(username).is_some()
    }

    pub fn opponent_of(&self, username: &str) -> Option<&str> {
        let idx = self.index_of(username)?;
        Some(self.players[1 - idx].username.as_str())
    }

    fn index_of(&self, username: &str) -> Option<usize> {
        self.players.iter().position(|p| p.username == username)
    }

    fn split(&mut self, idx: usize) -> (&mut SimplePlayer, &mut SimplePlayer) {
        let [first, second] = &mut self.players;
        if idx == 0 {
            (first, second)
        } else {
            (second, first)
        }
    }

    fn usernames(&self) -> [String; 2] {
        [
            self.players[0].username.clone(),
            self.players[1].username.clone(),
        ]
    }

    /// Resolves one deployment. Every rejection happens before any state is
    /// touched, so an `Err` leaves the match exactly as it was.
    pub fn deploy(&mut self, username: &str, troop_name: &str, tower_name: &str) -> Result<Outcome> {
        if self.is_over() {
            return Err(GameError::NoActiveGame);
        }
        let idx = self.index_of(username).ok_or(GameError::NoActiveGame)?;
        if self.turn_user != username {
            return Err(GameError::NotYourTurn);
        }
        let troop_idx = combat::find_usable(&self.players[idx].troops, troop_name)
            .ok_or(GameError::InvalidTroop)?;
        combat::validate_target(
            &self.attack_patterns,
            username,
            &self.players[1 - idx].towers,
            tower_name,
        )?;

        let opponent = self.players[1 - idx].username.clone();
        let (damage, remaining_hp, is_queen) = {
            let (me, foe) = self.split(idx);
            let tower = foe
                .towers
                .get_mut(tower_name)
                .ok_or(GameError::InvalidTower)?;
            let troop = &mut me.troops[troop_idx];
            let is_queen = troop.is_queen();
            let damage = combat::strike_tower(troop, tower);
            if !is_queen {
                troop.hp = 0;
            }
            (damage, tower.hp, is_queen)
        };
        combat::commit_target(&mut self.attack_patterns, username, tower_name);

        let attack = Event::AttackResult {
            troop: troop_name.to_string(),
            tower: tower_name.to_string(),
            damage,
            remaining_hp,
            extra: Vec::new(),
        };
        debug!(
            "{} deployed {} on {}'s {} for {} damage",
            username, troop_name, opponent, tower_name, damage
        );

        let (me, foe) = self.split(idx);
        if !me.has_troops_left() || !foe.has_troops_left() {
            let verdict = attrition_verdict(me, foe);
            return Ok(self.finish(username, &opponent, attack, verdict, "Out of troops."));
        }

        let counter = combat::counter_attack(&foe.towers[tower_name], &mut me.troops[troop_idx], false);
        debug!("{} countered {} for {}", tower_name, troop_name, counter);

        if !foe.towers.get(KING).map(|k| k.is_alive()).unwrap_or(false) {
            let verdict = Verdict::Winner(username.to_string());
            return Ok(self.finish(username, &opponent, attack, verdict, "King destroyed."));
        }

        me.turn = false;
        foe.turn = true;
        self.turn_user = opponent.clone();

        let mut deliveries = Vec::new();
        let players = self.usernames();
        for name in &players {
            deliveries.push((name.clone(), attack.clone()));
        }
        for name in &players {
            deliveries.push((name.clone(), Event::State(self.render(name))));
        }

        if is_queen {
            let (me, _) = self.split(idx);
            if let Some((healed, new_hp)) = combat::queen_heal(&mut me.towers) {
                let heal = Event::QueenHeal {
                    healer: username.to_string(),
                    tower: healed,
                    amount: tcr_shared::QUEEN_HEAL_AMOUNT,
                    new_hp,
                };
                for name in &players {
                    deliveries.push((name.clone(), heal.clone()));
                }
                for name in &players {
                    deliveries.push((name.clone(), Event::State(self.render(name))));
                }
            }
        }

        for name in &players {
            deliveries.push((
                name.clone(),
                Event::Turn {
                    yours: *name == self.turn_user,
                },
            ));
        }

        Ok(Outcome {
            deliveries,
            reply: Event::ack("Deploy successful"),
            finished: false,
        })
    }

    fn finish(
        &mut self,
        caller: &str,
        opponent: &str,
        attack: Event,
        verdict: Verdict,
        reason: &str,
    ) -> Outcome {
        info!(
            "Simple match {} over: {} ({})",
            self.room_id,
            verdict,
            reason.trim_end_matches('.')
        );
        self.verdict = Some(verdict);
        for player in self.players.iter_mut() {
            player.turn = false;
        }

        let verdict = self.verdict.as_ref();
        let end_for = |name: &str| {
            let result = verdict.map(|v| v.result_for(name).message()).unwrap_or("Draw!");
            Event::GameEnd(format!("{result} {reason}"))
        };

        let deliveries = vec![
            (caller.to_string(), attack.clone()),
            (opponent.to_string(), attack),
            (opponent.to_string(), Event::State(self.render(opponent))),
            (caller.to_string(), end_for(caller)),
            (opponent.to_string(), end_for(opponent)),
        ];

        Outcome {
            deliveries,
            reply: Event::State(self.render(caller)),
            finished: true,
        }
    }

    /// Text STATE body from `viewer`'s perspective.
    pub fn render(&self, viewer: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Room: {}", self.room_id);
        for player in &self.players {
            let you = if player.username == viewer { " (YOU)" } else { "" };
            let turn = if player.turn { " (TURN)" } else { "" };
            let _ = writeln!(out, "Player: {}{}{}", player.username, you, turn);
            let _ = writeln!(out, "  Towers:");
            for name in TOWER_NAMES {
                if let Some(tower) = player.towers.get(name) {
                    let _ = writeln!(
                        out,
                        "    {}: HP={} ATK={} DEF={}",
                        tower.name, tower.hp, tower.atk, tower.def
                    );
                }
            }
            let _ = writeln!(out, "  Troops:");
            for troop in &player.troops {
                if troop.is_queen() {
                    let _ = writeln!(
                        out,
                        "    {}: Heals the lowest HP guard tower by {}",
                        troop.name,
                        tcr_shared::QUEEN_HEAL_AMOUNT
                    );
                } else {
                    let used = if troop.hp > 0 { "" } else { " (used)" };
                    let _ = writeln!(
                        out,
                        "    {}: HP={} ATK={} DEF={}{}",
                        troop.name, troop.hp, troop.atk, troop.def, used
                    );
                }
            }
        }
        let _ = write!(out, "Current turn: {}", self.turn_user);
        if let Some(verdict) = &self.verdict {
            let _ = write!(out, "\nResult: {}", verdict);
        }
        out
    }
}

/// Decides an attrition finish: more standing towers wins, then more total
/// tower HP, otherwise a draw.
fn attrition_verdict(me: &SimplePlayer, foe: &SimplePlayer) -> Verdict {
    let mine = (
        combat::alive_towers(&me.towers),
        combat::total_tower_hp(&me.towers),
    );
    let theirs = (
        combat::alive_towers(&foe.towers),
        combat::total_tower_hp(&foe.towers),
    );
    match mine.cmp(&theirs) {
        std::cmp::Ordering::Greater => Verdict::Winner(me.username.clone()),
        std::cmp::Ordering::Less => Verdict::Winner(foe.username.clone()),
        std::cmp::Ordering::Equal => Verdict::Draw,
    }
}

/// All running Simple matches, keyed by room id.
///
/// A deploy holds the registry lock for its whole duration, broadcasts
/// included, so both players always see one deploy's events as a block.
pub struct SimpleMatches {
    matches: Mutex<HashMap<String, SimpleMatch>>,
    specs: Arc<SpecStore>,
    rooms: Arc<RoomRegistry>,
    connections: Arc<ConnectionRegistry>,
}

impl SimpleMatches {
    pub fn new(
        specs: Arc<SpecStore>,
        rooms: Arc<RoomRegistry>,
        connections: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            matches: Mutex::new(HashMap::new()),
            specs,
            rooms,
            connections,
        }
    }

    /// Builds the match for a filled room.
    pub async fn start(&self, room: &Room) -> Result<()> {
        let (host, guest) = room.players().ok_or(GameError::CannotStart)?;
        if !room.started || room.mode != GameMode::Simple {
            return Err(GameError::CannotStart);
        }

        let mut matches = self.matches.lock().await;
        if matches.contains_key(&room.id) {
            return Err(GameError::CannotStart);
        }
        let game = SimpleMatch::new(&room.id, host, guest, &self.specs, &mut rand::thread_rng());
        info!(
            "Simple match {} started: {} vs {}, {} moves first",
            room.id, host, guest, game.turn_user
        );
        matches.insert(room.id.clone(), game);
        Ok(())
    }

    /// Pushes GAME_STARTED, the opening STATE and the first TURN notice to
    /// both players.
    pub async fn announce_start(&self, room_id: &str) {
        let matches = self.matches.lock().await;
        let Some(game) = matches.get(room_id) else {
            return;
        };

        let mut deliveries = Vec::new();
        for name in game.usernames() {
            deliveries.push((name.clone(), Event::ack(format!("GAME_STARTED|{}", GameMode::Simple))));
            deliveries.push((name.clone(), Event::State(game.render(&name))));
            deliveries.push((
                name.clone(),
                Event::Turn {
                    yours: name == game.turn_user,
                },
            ));
        }
        self.connections.deliver(&deliveries).await;
    }

    pub async fn deploy(&self, username: &str, troop: &str, tower: &str) -> Result<Event> {
        let mut matches = self.matches.lock().await;
        let (room_id, game) = matches
            .iter_mut()
            .find(|(_, g)| g.has_player(username))
            .ok_or(GameError::NoActiveGame)?;
        let room_id = room_id.clone();

        let outcome = game.deploy(username, troop, tower)?;
        self.connections.deliver(&outcome.deliveries).await;

        if outcome.finished {
            matches.remove(&room_id);
            drop(matches);
            self.rooms.remove(&room_id).await;
        }
        Ok(outcome.reply)
    }

    pub async fn state(&self, username: &str) -> Result<Event> {
        let matches = self.matches.lock().await;
        matches
            .values()
            .find(|g| g.has_player(username))
            .map(|g| Event::State(g.render(username)))
            .ok_or(GameError::NotInGame)
    }

    /// Ends the caller's match and tells the opponent. Returns false if the
    /// caller was not playing.
    pub async fn exit(&self, username: &str) -> bool {
        let mut matches = self.matches.lock().await;
        let Some(room_id) = matches
            .iter()
            .find(|(_, g)| g.has_player(username))
            .map(|(id, _)| id.clone())
        else {
            return false;
        };

        if let Some(game) = matches.remove(&room_id) {
            if let Some(opponent) = game.opponent_of(username) {
                self.connections
                    .send(opponent, &Event::GameEnd("Your opponent has left the game".to_string()))
                    .await;
            }
            info!("{} left simple match {}", username, room_id);
        }
        drop(matches);
        self.rooms.remove(&room_id).await;
        true
    }

    pub async fn is_playing(&self, username: &str) -> bool {
        self.matches
            .lock()
            .await
            .values()
            .any(|g| g.has_player(username))
    }

    pub async fn contains(&self, room_id: &str) -> bool {
        self.matches.lock().await.contains_key(room_id)
    }

    #[cfg(test)]
    pub(crate) async fn insert(&self, game: SimpleMatch) {
        self.matches.lock().await.insert(game.room_id.clone(), game);
    }

    #[cfg(test)]
    pub(crate) async fn snapshot(&self, room_id: &str) -> Option<SimpleMatch> {
        self.matches.lock().await.get(room_id).cloned()
    }
}
