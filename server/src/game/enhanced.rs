//! Real-time matches.
//!
//! Both players act whenever they like. Mana regenerates on a fixed tick and
//! buys new troops; towers crit on their counter-attacks. A background
//! ticker per match drives regeneration and ends the match when its clock
//! runs out, at which point EXP is awarded and persisted.

use super::combat::{self, AttackPatterns, Towers};
use super::progress::{level_multiplier, Progress};
use super::{Outcome, Verdict};
use crate::accounts::AccountStore;
use crate::connections::ConnectionRegistry;
use crate::error::{GameError, Result};
use crate::rooms::{Room, RoomRegistry};
use crate::specs::SpecStore;
use log::{debug, error, info};
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tcr_shared::{Event, GameMode, MatchSnapshot, PlayerSnapshot, Troop, TroopSpec, KING};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};

/// Clock and economy knobs for Enhanced matches.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedSettings {
    pub match_duration: Duration,
    pub tick_interval: Duration,
    /// How long a finished match lingers so its final pushes can flush.
    pub grace_period: Duration,
    pub starting_mana: u32,
    pub max_mana: u32,
}

impl Default for EnhancedSettings {
    fn default() -> Self {
        Self {
            match_duration: Duration::from_secs(180),
            tick_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(2),
            starting_mana: 5,
            max_mana: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnhancedPlayer {
    pub username: String,
    pub towers: Towers,
    pub troops: Vec<Troop>,
    pub mana: u32,
    pub progress: Progress,
}

impl EnhancedPlayer {
    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            username: self.username.clone(),
            towers: self.towers.clone(),
            troops: self.troops.clone(),
            mana: self.mana,
            exp: self.progress.exp,
            level: self.progress.level,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnhancedMatch {
    pub room_id: String,
    pub players: [EnhancedPlayer; 2],
    pub verdict: Option<Verdict>,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub attack_patterns: AttackPatterns,
    max_mana: u32,
}

impl EnhancedMatch {
    /// Builds both sides from their persisted progress: towers scale with
    /// their own upgrade level, the opening hand with the player's level.
    pub fn new<R: Rng + ?Sized>(
        room_id: &str,
        host: Progress,
        guest: Progress,
        specs: &SpecStore,
        settings: &EnhancedSettings,
        now: SystemTime,
        rng: &mut R,
    ) -> Self {
        let mut player = |progress: Progress| EnhancedPlayer {
            username: progress.username.clone(),
            towers: combat::build_towers(specs, |name| level_multiplier(progress.tower_level(name))),
            troops: combat::deal_troops(
                specs,
                &progress.username,
                level_multiplier(progress.level),
                &mut *rng,
            ),
            mana: settings.starting_mana.min(settings.max_mana),
            progress,
        };

        Self {
            room_id: room_id.to_string(),
            players: [player(host), player(guest)],
            verdict: None,
            start_time: now,
            end_time: now + settings.match_duration,
            attack_patterns: AttackPatterns::new(),
            max_mana: settings.max_mana,
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

    fn split(&mut self, idx: usize) -> (&mut EnhancedPlayer, &mut EnhancedPlayer) {
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

    /// Resolves one deployment. `crit` decides whether the target tower's
    /// counter-attack is critical.
    pub fn deploy(
        &mut self,
        username: &str,
        troop_name: &str,
        tower_name: &str,
        crit: bool,
        now: SystemTime,
    ) -> Result<Outcome> {
        if self.is_over() {
            return Err(GameError::GameOver);
        }
        let idx = self.index_of(username).ok_or(GameError::NoActiveGame)?;
        let troop_idx = combat::find_usable(&self.players[idx].troops, troop_name)
            .ok_or(GameError::NoSuchTroop)?;
        combat::validate_target(
            &self.attack_patterns,
            username,
            &self.players[1 - idx].towers,
            tower_name,
        )?;

        let (damage, counter, remaining_hp, is_queen) = {
            let (me, foe) = self.split(idx);
            let tower = foe
                .towers
                .get_mut(tower_name)
                .ok_or(GameError::InvalidTower)?;
            let troop = &mut me.troops[troop_idx];
            let is_queen = troop.is_queen();
            let damage = combat::strike_tower(troop, tower);
            let counter = combat::counter_attack(tower, troop, crit);
            if !is_queen {
                troop.hp = 0;
            }
            (damage, counter, tower.hp, is_queen)
        };
        combat::commit_target(&mut self.attack_patterns, username, tower_name);

        let mut extra = vec![format!("CRIT:{}", crit), format!("COUNTER:{}", counter)];
        if remaining_hp == 0 {
            extra.push("DESTROYED".to_string());
        }
        let attack = Event::AttackResult {
            troop: troop_name.to_string(),
            tower: tower_name.to_string(),
            damage,
            remaining_hp,
            extra,
        };
        debug!(
            "{} deployed {} on {} in {}: {} damage, {} counter{}",
            username,
            troop_name,
            tower_name,
            self.room_id,
            damage,
            counter,
            if crit { " (crit)" } else { "" }
        );

        let players = self.usernames();
        let mut deliveries: Vec<(String, Event)> =
            players.iter().map(|name| (name.clone(), attack.clone())).collect();

        if tower_name == KING && remaining_hp == 0 {
            deliveries.extend(self.finalize(
                Verdict::Winner(username.to_string()),
                Some("King destroyed."),
                now,
            ));
            return Ok(Outcome {
                deliveries,
                reply: Event::ack("Deploy successful"),
                finished: true,
            });
        }

        let state = self.state_event(now);
        for name in &players {
            deliveries.push((name.clone(), state.clone()));
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
                let state = self.state_event(now);
                for name in &players {
                    deliveries.push((name.clone(), heal.clone()));
                }
                for name in &players {
                    deliveries.push((name.clone(), state.clone()));
                }
            }
        }

        Ok(Outcome {
            deliveries,
            reply: Event::ack("Deploy successful"),
            finished: false,
        })
    }

    /// Spends mana on a fresh troop scaled by the buyer's level.
    pub fn buy(&mut self, username: &str, spec: &TroopSpec, now: SystemTime) -> Result<Outcome> {
        if self.is_over() {
            return Err(GameError::GameOver);
        }
        let idx = self.index_of(username).ok_or(GameError::NotInEnhancedGame)?;
        let player = &mut self.players[idx];
        if player.mana < spec.mana {
            return Err(GameError::NotEnoughMana {
                required: spec.mana,
                available: player.mana,
            });
        }

        player.mana -= spec.mana;
        let multiplier = level_multiplier(player.progress.level);
        player.troops.push(Troop::from_spec(spec, username, multiplier));
        let mana = player.mana;
        debug!("{} bought {} in {}, {} mana left", username, spec.name, self.room_id, mana);

        let state = self.state_event(now);
        Ok(Outcome {
            deliveries: self
                .usernames()
                .into_iter()
                .map(|name| (name, state.clone()))
                .collect(),
            reply: Event::ack(format!("BOUGHT|{}|{}", spec.name, mana)),
            finished: false,
        })
    }

    /// One clock tick: regenerates mana, and once the deadline has passed
    /// decides the match on standing towers. Returns the final pushes when
    /// this tick ended the match.
    pub fn tick(&mut self, now: SystemTime) -> Option<Vec<(String, Event)>> {
        if self.is_over() {
            return None;
        }
        for player in self.players.iter_mut() {
            player.mana = (player.mana + 1).min(self.max_mana);
        }
        if now < self.end_time {
            return None;
        }

        let [first, second] = &self.players;
        let towers = (
            combat::alive_towers(&first.towers),
            combat::alive_towers(&second.towers),
        );
        let verdict = match towers.0.cmp(&towers.1) {
            std::cmp::Ordering::Greater => Verdict::Winner(first.username.clone()),
            std::cmp::Ordering::Less => Verdict::Winner(second.username.clone()),
            std::cmp::Ordering::Equal => Verdict::Draw,
        };
        Some(self.finalize(verdict, None, now))
    }

    /// Records the verdict, awards EXP against each opponent's pre-match
    /// level and returns the final STATE and GAME_END pushes. `reason` is
    /// appended to each GAME_END message when the match did not simply run
    /// out of time.
    fn finalize(
        &mut self,
        verdict: Verdict,
        reason: Option<&str>,
        now: SystemTime,
    ) -> Vec<(String, Event)> {
        let levels = [self.players[0].progress.level, self.players[1].progress.level];
        for (idx, player) in self.players.iter_mut().enumerate() {
            let result = verdict.result_for(&player.username);
            let award = result.exp_award(levels[1 - idx]);
            let gained = player.progress.award(award);
            info!(
                "{} earned {} EXP ({:?}), now level {}{}",
                player.username,
                award,
                result,
                player.progress.level,
                if gained > 0 { " (level up)" } else { "" }
            );
        }
        info!("Enhanced match {} over: {}", self.room_id, verdict);
        self.verdict = Some(verdict);

        let state = self.state_event(now);
        let mut deliveries = Vec::new();
        for name in self.usernames() {
            deliveries.push((name, state.clone()));
        }
        for name in self.usernames() {
            let result = self
                .verdict
                .as_ref()
                .map(|v| v.result_for(&name).message())
                .unwrap_or("Draw!");
            let message = match reason {
                Some(reason) => format!("{result} {reason}"),
                None => result.to_string(),
            };
            deliveries.push((name, Event::GameEnd(message)));
        }
        deliveries
    }

    pub fn snapshot(&self, now: SystemTime) -> MatchSnapshot {
        let remaining_secs = if self.is_over() {
            0
        } else {
            self.end_time
                .duration_since(now)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        };
        MatchSnapshot {
            room_id: self.room_id.clone(),
            players: self
                .players
                .iter()
                .map(|p| (p.username.clone(), p.snapshot()))
                .collect(),
            winner: self
                .verdict
                .as_ref()
                .map(|v| v.winner().to_string())
                .unwrap_or_default(),
            over: self.is_over(),
            start_time: unix_secs(self.start_time),
            end_time: unix_secs(self.end_time),
            remaining_secs,
            attack_patterns: self
                .attack_patterns
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    pub fn state_event(&self, now: SystemTime) -> Event {
        match self.snapshot(now).to_json() {
            Ok(json) => Event::State(json),
            Err(e) => {
                error!("Failed to serialize match {}: {}", self.room_id, e);
                Event::State("{}".to_string())
            }
        }
    }

    fn progress(&self) -> Vec<Progress> {
        self.players.iter().map(|p| p.progress.clone()).collect()
    }
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// All running Enhanced matches, keyed by room id.
///
/// Lock order is matches, then rooms; progress is persisted only after the
/// match lock has been released.
pub struct EnhancedMatches {
    matches: Mutex<HashMap<String, EnhancedMatch>>,
    specs: Arc<SpecStore>,
    rooms: Arc<RoomRegistry>,
    connections: Arc<ConnectionRegistry>,
    accounts: Arc<AccountStore>,
    settings: EnhancedSettings,
}

impl EnhancedMatches {
    pub fn new(
        specs: Arc<SpecStore>,
        rooms: Arc<RoomRegistry>,
        connections: Arc<ConnectionRegistry>,
        accounts: Arc<AccountStore>,
        settings: EnhancedSettings,
    ) -> Self {
        Self {
            matches: Mutex::new(HashMap::new()),
            specs,
            rooms,
            connections,
            accounts,
            settings,
        }
    }

    /// Builds the match for a filled room and launches its ticker.
    pub async fn start(self: &Arc<Self>, room: &Room) -> Result<()> {
        let (host, guest) = room.players().ok_or(GameError::CannotStart)?;
        if !room.started || room.mode != GameMode::Enhanced {
            return Err(GameError::CannotStart);
        }

        let host_progress = self.accounts.load_progress(host).await;
        let guest_progress = self.accounts.load_progress(guest).await;

        let mut matches = self.matches.lock().await;
        if matches.contains_key(&room.id) {
            return Err(GameError::CannotStart);
        }
        let game = EnhancedMatch::new(
            &room.id,
            host_progress,
            guest_progress,
            &self.specs,
            &self.settings,
            SystemTime::now(),
            &mut rand::thread_rng(),
        );
        info!(
            "Enhanced match {} started: {} (lvl {}) vs {} (lvl {})",
            room.id,
            host,
            game.players[0].progress.level,
            guest,
            game.players[1].progress.level
        );
        matches.insert(room.id.clone(), game);
        drop(matches);

        let this = Arc::clone(self);
        let room_id = room.id.clone();
        tokio::spawn(async move {
            this.run_ticker(room_id).await;
        });
        Ok(())
    }

    async fn run_ticker(self: Arc<Self>, room_id: String) {
        let mut ticker = interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The first tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if !self.tick(&room_id, SystemTime::now()).await {
                break;
            }
        }

        tokio::time::sleep(self.settings.grace_period).await;
        self.discard(&room_id).await;
    }

    /// Advances one match's clock. Returns false once the match is over or
    /// gone, which stops its ticker.
    pub async fn tick(&self, room_id: &str, now: SystemTime) -> bool {
        let mut matches = self.matches.lock().await;
        let Some(game) = matches.get_mut(room_id) else {
            return false;
        };
        if game.is_over() {
            return false;
        }

        match game.tick(now) {
            None => true,
            Some(deliveries) => {
                self.connections.deliver(&deliveries).await;
                let progress = game.progress();
                drop(matches);
                self.persist(&progress).await;
                false
            }
        }
    }

    /// Drops a finished match and its room once the grace period is over.
    async fn discard(&self, room_id: &str) {
        let mut matches = self.matches.lock().await;
        if matches.get(room_id).map(|g| g.is_over()).unwrap_or(false) {
            matches.remove(room_id);
            debug!("Discarded enhanced match {}", room_id);
        }
        drop(matches);
        self.rooms.remove(room_id).await;
    }

    async fn persist(&self, progress: &[Progress]) {
        for p in progress {
            self.accounts.save_progress(p).await;
        }
    }

    /// Pushes GAME_STARTED and the opening snapshot to both players.
    pub async fn announce_start(&self, room_id: &str) {
        let matches = self.matches.lock().await;
        let Some(game) = matches.get(room_id) else {
            return;
        };

        let state = game.state_event(SystemTime::now());
        let mut deliveries = Vec::new();
        for name in game.usernames() {
            deliveries.push((name.clone(), Event::ack(format!("GAME_STARTED|{}", GameMode::Enhanced))));
            deliveries.push((name, state.clone()));
        }
        self.connections.deliver(&deliveries).await;
    }

    pub async fn deploy(&self, username: &str, troop: &str, tower: &str) -> Result<Event> {
        let crit = {
            let chance = self.specs.crit_chance(tower).clamp(0.0, 1.0);
            rand::thread_rng().gen_bool(chance)
        };

        let mut matches = self.matches.lock().await;
        let (room_id, game) = matches
            .iter_mut()
            .find(|(_, g)| g.has_player(username))
            .ok_or(GameError::NoActiveGame)?;
        let room_id = room_id.clone();

        let outcome = game.deploy(username, troop, tower, crit, SystemTime::now())?;
        self.connections.deliver(&outcome.deliveries).await;

        if outcome.finished {
            let progress = game.progress();
            matches.remove(&room_id);
            drop(matches);
            self.rooms.remove(&room_id).await;
            self.persist(&progress).await;
        }
        Ok(outcome.reply)
    }

    pub async fn buy(&self, username: &str, troop: &str) -> Result<Event> {
        let mut matches = self.matches.lock().await;
        let game = matches
            .values_mut()
            .find(|g| g.has_player(username))
            .ok_or(GameError::NotInEnhancedGame)?;
        let spec = self.specs.troop(troop).ok_or(GameError::UnknownTroop)?;

        let outcome = game.buy(username, spec, SystemTime::now())?;
        self.connections.deliver(&outcome.deliveries).await;
        Ok(outcome.reply)
    }

    pub async fn state(&self, username: &str) -> Result<Event> {
        let matches = self.matches.lock().await;
        matches
            .values()
            .find(|g| g.has_player(username))
            .map(|g| g.state_event(SystemTime::now()))
            .ok_or(GameError::NotInGame)
    }

    /// Ends the caller's match without awarding EXP. A match that already
    /// finished is only dropped; its opponent has had a GAME_END already.
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
            if !game.is_over() {
                if let Some(opponent) = game.opponent_of(username) {
                    self.connections
                        .send(opponent, &Event::GameEnd("Your opponent has left the game".to_string()))
                        .await;
                }
            }
            info!("{} left enhanced match {}", username, room_id);
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
    pub(crate) async fn insert(&self, game: EnhancedMatch) {
        self.matches.lock().await.insert(game.room_id.clone(), game);
    }

    #[cfg(test)]
    pub(crate) async fn snapshot(&self, room_id: &str) -> Option<EnhancedMatch> {
        self.matches.lock().await.get(room_id).cloned()
    }
}
