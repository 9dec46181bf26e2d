//! Shared fixtures for the integration tests: a recording session and a
//! small game domain.

#![allow(dead_code, clippy::manual_async_fn)]

use cqlmodel::{
    BatchType, CompoundKeyDescriptor, ConsistencyLevel, Counter, CqlSession, CqlType, Cx, Entity,
    EntityMeta, Error, Event, Interceptor, KeyComponent, ManagerConfig, MappingErrorKind, Outcome,
    PersistenceManager, PreparedStatement, PropertyKind, PropertyMeta, Result, Row, Statement,
    ValidationErrorKind, Value,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

pub fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
    }
}

pub fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => std::panic::panic_any(format!("expected an error, got: {other:?}")),
    }
}

// ============================================================================
// Recording session
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedBatch {
    pub kind: BatchType,
    pub statements: Vec<Statement>,
    pub level: ConsistencyLevel,
}

#[derive(Debug, Default)]
struct SessionState {
    next_id: u64,
    executed: Vec<Statement>,
    batches: Vec<RecordedBatch>,
    results: Vec<(String, Vec<Row>)>,
}

/// Session that records every statement and answers reads from queued rows.
#[derive(Debug, Clone, Default)]
pub struct RecordingSession {
    state: Arc<Mutex<SessionState>>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.state().executed.clone()
    }

    pub fn executed_queries(&self) -> Vec<String> {
        self.state()
            .executed
            .iter()
            .map(|s| s.query().to_string())
            .collect()
    }

    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.state().batches.clone()
    }

    /// Round-trips other than preparing.
    pub fn round_trips(&self) -> usize {
        let state = self.state();
        state.executed.len() + state.batches.len()
    }

    /// Answer the next read whose text contains `fragment` with `rows`.
    pub fn respond(&self, fragment: &str, rows: Vec<Row>) {
        self.state().results.push((fragment.to_string(), rows));
    }

    pub fn forget(&self) {
        let mut state = self.state();
        state.executed.clear();
        state.batches.clear();
    }
}

impl CqlSession for RecordingSession {
    fn prepare(
        &self,
        _cx: &Cx,
        query: &str,
    ) -> impl Future<Output = Outcome<PreparedStatement, Error>> + Send {
        let state = Arc::clone(&self.state);
        let query = query.to_string();
        async move {
            let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
            guard.next_id += 1;
            Outcome::Ok(PreparedStatement::new(guard.next_id, query))
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        statement: &Statement,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let state = Arc::clone(&self.state);
        let statement = statement.clone();
        async move {
            let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
            let rows = guard
                .results
                .iter()
                .position(|(fragment, _)| statement.query().contains(fragment.as_str()))
                .map_or_else(Vec::new, |i| guard.results.remove(i).1);
            guard.executed.push(statement);
            Outcome::Ok(rows)
        }
    }

    fn execute_batch(
        &self,
        _cx: &Cx,
        batch_type: BatchType,
        statements: &[Statement],
        level: ConsistencyLevel,
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        let state = Arc::clone(&self.state);
        let batch = RecordedBatch {
            kind: batch_type,
            statements: statements.to_vec(),
            level,
        };
        async move {
            state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .batches
                .push(batch);
            Outcome::Ok(())
        }
    }
}

// ============================================================================
// Domain
// ============================================================================

fn unknown(entity: &str, property: &str) -> Error {
    Error::mapping(
        MappingErrorKind::UnknownProperty,
        entity,
        format!("unknown property '{property}'"),
    )
}

fn bad_key(entity: &str) -> Error {
    Error::validation(
        "id",
        ValidationErrorKind::MissingKeyComponent,
        format!("incomplete key for {entity}"),
    )
}

/// Flags the player it runs on before the first write.
struct Stamp;

impl Interceptor<Player> for Stamp {
    fn events(&self) -> &[Event] {
        &[Event::PrePersist]
    }

    fn on_event(&self, player: &mut Player, _event: Event) -> Result<()> {
        player.stamped = true;
        Ok(())
    }
}

/// A player: simple key, a list, a set, a JSON profile and a win counter.
/// Reads default to QUORUM at entity level. `stamped` is not mapped.
#[derive(Debug, Clone, Default)]
pub struct Player {
    pub id: i64,
    pub name: String,
    pub scores: Vec<i32>,
    pub badges: HashSet<String>,
    pub profile: serde_json::Value,
    pub wins: Counter,
    pub stamped: bool,
}

impl Player {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Player {
    fn entity_meta() -> Result<EntityMeta> {
        EntityMeta::builder("Player", "players")
            .property(PropertyMeta::builder("id", PropertyKind::Id, CqlType::BigInt))
            .property(PropertyMeta::builder("name", PropertyKind::Simple, CqlType::Text))
            .property(PropertyMeta::builder(
                "scores",
                PropertyKind::List,
                CqlType::List(Box::new(CqlType::Int)),
            ))
            .property(PropertyMeta::builder(
                "badges",
                PropertyKind::Set,
                CqlType::Set(Box::new(CqlType::Text)),
            ))
            .property(PropertyMeta::builder(
                "profile",
                PropertyKind::Simple,
                CqlType::Custom("PlayerProfile"),
            ))
            .property(
                PropertyMeta::builder("wins", PropertyKind::Counter, CqlType::Counter)
                    .write_level(ConsistencyLevel::All),
            )
            .read_level(ConsistencyLevel::Quorum)
            .interceptor::<Player, _>(Stamp)
            .build()
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        let mut badges: Vec<_> = self.badges.iter().cloned().collect();
        badges.sort();
        vec![
            ("name", Value::Text(self.name.clone())),
            (
                "scores",
                Value::List(self.scores.iter().copied().map(Value::Int).collect()),
            ),
            (
                "badges",
                Value::Set(badges.into_iter().map(Value::Text).collect()),
            ),
            ("profile", Value::Json(self.profile.clone())),
        ]
    }

    fn write_value(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "name" => self.name = Option::<String>::try_from(value)?.unwrap_or_default(),
            "scores" => self.scores = Vec::<i32>::try_from(value)?,
            "badges" => self.badges = Vec::<String>::try_from(value)?.into_iter().collect(),
            "profile" => {
                self.profile = match value {
                    Value::Null => serde_json::Value::Null,
                    other => serde_json::Value::try_from(other)?,
                };
            }
            other => return Err(unknown("Player", other)),
        }
        Ok(())
    }

    fn primary_key(&self) -> Vec<Value> {
        vec![Value::BigInt(self.id)]
    }

    fn with_primary_key(key: &[Value]) -> Result<Self> {
        match key {
            [Value::BigInt(id)] => Ok(Self::new(*id, "")),
            _ => Err(bad_key("Player")),
        }
    }

    fn from_row(row: &Row) -> Result<Self> {
        let mut player = Self::new(row.get_named("id")?, "");
        for name in ["name", "scores", "badges", "profile"] {
            if let Some(value) = row.get_by_name(name) {
                player.write_value(name, value.clone())?;
            }
        }
        Ok(player)
    }

    fn counter_mut(&mut self, property: &str) -> Option<&mut Counter> {
        (property == "wins").then_some(&mut self.wins)
    }
}

/// One game of a player: partition `player_id`, clustering `season`, `round`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Game {
    pub player_id: i64,
    pub season: i32,
    pub round: i32,
    pub outcome: String,
}

impl Game {
    pub fn new(player_id: i64, season: i32, round: i32, outcome: &str) -> Self {
        Self {
            player_id,
            season,
            round,
            outcome: outcome.to_string(),
        }
    }

    pub fn row(&self) -> Row {
        Row::new(
            vec![
                "player_id".into(),
                "season".into(),
                "round".into(),
                "outcome".into(),
            ],
            vec![
                Value::BigInt(self.player_id),
                Value::Int(self.season),
                Value::Int(self.round),
                Value::Text(self.outcome.clone()),
            ],
        )
    }
}

impl Entity for Game {
    fn entity_meta() -> Result<EntityMeta> {
        EntityMeta::builder("Game", "games")
            .property(
                PropertyMeta::builder("id", PropertyKind::EmbeddedId, CqlType::Custom("GameKey"))
                    .compound_key(CompoundKeyDescriptor::new(vec![
                        KeyComponent::partition("player_id", CqlType::BigInt),
                        KeyComponent::clustering("season", CqlType::Int),
                        KeyComponent::clustering("round", CqlType::Int),
                    ])),
            )
            .property(PropertyMeta::builder("outcome", PropertyKind::Simple, CqlType::Text))
            .build()
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![("outcome", Value::Text(self.outcome.clone()))]
    }

    fn write_value(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "outcome" => self.outcome = Option::<String>::try_from(value)?.unwrap_or_default(),
            other => return Err(unknown("Game", other)),
        }
        Ok(())
    }

    fn primary_key(&self) -> Vec<Value> {
        vec![
            Value::BigInt(self.player_id),
            Value::Int(self.season),
            Value::Int(self.round),
        ]
    }

    fn with_primary_key(key: &[Value]) -> Result<Self> {
        match key {
            [Value::BigInt(player_id), Value::Int(season), Value::Int(round)] => {
                Ok(Self::new(*player_id, *season, *round, ""))
            }
            _ => Err(bad_key("Game")),
        }
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            player_id: row.get_named("player_id")?,
            season: row.get_named("season")?,
            round: row.get_named("round")?,
            outcome: row.get_named::<Option<String>>("outcome")?.unwrap_or_default(),
        })
    }
}

/// Points per player and game mode, stored in a clustered counter table.
#[derive(Debug, Clone, Default)]
pub struct Leaderboard {
    pub mode: String,
    pub player_id: i64,
    pub points: Counter,
}

impl Leaderboard {
    pub fn new(mode: &str, player_id: i64) -> Self {
        Self {
            mode: mode.to_string(),
            player_id,
            points: Counter::new(),
        }
    }
}

impl Entity for Leaderboard {
    fn entity_meta() -> Result<EntityMeta> {
        EntityMeta::builder("Leaderboard", "leaderboard")
            .property(
                PropertyMeta::builder("id", PropertyKind::EmbeddedId, CqlType::Custom("RankKey"))
                    .compound_key(CompoundKeyDescriptor::new(vec![
                        KeyComponent::partition("mode", CqlType::Text),
                        KeyComponent::clustering("player_id", CqlType::BigInt),
                    ])),
            )
            .property(PropertyMeta::builder("points", PropertyKind::Counter, CqlType::Counter))
            .clustered_counter()
            .build()
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        Vec::new()
    }

    fn write_value(&mut self, property: &str, _value: Value) -> Result<()> {
        Err(unknown("Leaderboard", property))
    }

    fn primary_key(&self) -> Vec<Value> {
        vec![Value::Text(self.mode.clone()), Value::BigInt(self.player_id)]
    }

    fn with_primary_key(key: &[Value]) -> Result<Self> {
        match key {
            [Value::Text(mode), Value::BigInt(player_id)] => Ok(Self::new(mode, *player_id)),
            _ => Err(bad_key("Leaderboard")),
        }
    }

    fn from_row(row: &Row) -> Result<Self> {
        let mut entry = Self::new(&row.get_named::<String>("mode")?, row.get_named("player_id")?);
        entry
            .points
            .set_loaded(row.get_named::<Option<i64>>("points")?);
        Ok(entry)
    }

    fn counter_mut(&mut self, property: &str) -> Option<&mut Counter> {
        (property == "points").then_some(&mut self.points)
    }
}

/// A manager with the whole domain registered.
pub fn manager(
    session: &RecordingSession,
    config: ManagerConfig,
) -> PersistenceManager<RecordingSession> {
    let rt = asupersync::runtime::RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let mut manager = PersistenceManager::new(session.clone(), config);
    rt.block_on(async {
        unwrap_outcome(manager.register::<Player>(&cx).await);
        unwrap_outcome(manager.register::<Game>(&cx).await);
        unwrap_outcome(manager.register::<Leaderboard>(&cx).await);
    });
    manager
}
