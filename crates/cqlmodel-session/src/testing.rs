//! Test doubles shared by the session modules: a recording session and a few
//! sample entities.

#![allow(clippy::manual_async_fn)]

use cqlmodel_core::{
    BatchType, CompoundKeyDescriptor, ConsistencyLevel, Counter, CqlSession, CqlType, Cx, Entity,
    EntityMeta, Error, Event, Interceptor, KeyComponent, MappingErrorKind, Outcome,
    PreparedStatement, PropertyKind, PropertyMeta, Result, Row, Statement, ValidationErrorKind,
    Value,
};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

pub(crate) fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
    }
}

pub(crate) fn meta_of<T: Entity>() -> Arc<EntityMeta> {
    Arc::new(T::entity_meta().expect("valid entity metadata"))
}

// ============================================================================
// Recording session
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct MockState {
    next_id: u64,
    prepared: Vec<String>,
    executed: Vec<Statement>,
    batches: Vec<(BatchType, Vec<Statement>, ConsistencyLevel)>,
    canned: Vec<(String, Vec<Row>)>,
    fail_batches: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("lock poisoned")
    }

    pub(crate) fn prepared(&self) -> Vec<String> {
        self.lock().prepared.clone()
    }

    pub(crate) fn executed(&self) -> Vec<Statement> {
        self.lock().executed.clone()
    }

    pub(crate) fn batches(&self) -> Vec<(BatchType, Vec<Statement>, ConsistencyLevel)> {
        self.lock().batches.clone()
    }

    /// Executed statements plus batches; preparing is not counted.
    pub(crate) fn call_count(&self) -> usize {
        let state = self.lock();
        state.executed.len() + state.batches.len()
    }

    /// Rows returned by the next statement whose text contains `fragment`.
    pub(crate) fn queue_rows(&self, fragment: &str, rows: Vec<Row>) {
        self.lock().canned.push((fragment.to_string(), rows));
    }

    pub(crate) fn fail_batches(&self) {
        self.lock().fail_batches = true;
    }

    pub(crate) fn clear_history(&self) {
        let mut state = self.lock();
        state.executed.clear();
        state.batches.clear();
    }
}

impl CqlSession for MockSession {
    fn prepare(
        &self,
        _cx: &Cx,
        query: &str,
    ) -> impl Future<Output = Outcome<PreparedStatement, Error>> + Send {
        let state = Arc::clone(&self.state);
        let query = query.to_string();
        async move {
            let mut guard = state.lock().expect("lock poisoned");
            guard.next_id += 1;
            guard.prepared.push(query.clone());
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
            let mut guard = state.lock().expect("lock poisoned");
            let position = guard
                .canned
                .iter()
                .position(|(fragment, _)| statement.query().contains(fragment.as_str()));
            let rows = position.map_or_else(Vec::new, |i| guard.canned.remove(i).1);
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
        let statements = statements.to_vec();
        async move {
            let mut guard = state.lock().expect("lock poisoned");
            if guard.fail_batches {
                return Outcome::Err(Error::Custom("batch rejected".to_string()));
            }
            guard.batches.push((batch_type, statements, level));
            Outcome::Ok(())
        }
    }
}

// ============================================================================
// Sample entities
// ============================================================================

fn column<T>(row: &Row, name: &str) -> Result<Option<T>>
where
    T: TryFrom<Value, Error = Error>,
{
    match row.get_by_name(name) {
        Some(Value::Null) | None => Ok(None),
        Some(value) => T::try_from(value.clone()).map(Some),
    }
}

fn unknown(entity: &str, property: &str) -> Error {
    Error::mapping(
        MappingErrorKind::UnknownProperty,
        entity,
        format!("unknown property '{property}'"),
    )
}

/// Records every event it sees in the entity's journal, and the latest one
/// on the instance itself.
struct Journal;

impl Interceptor<User> for Journal {
    fn events(&self) -> &[Event] {
        &[
            Event::PrePersist,
            Event::PostPersist,
            Event::PreUpdate,
            Event::PostUpdate,
            Event::PreRemove,
            Event::PostRemove,
            Event::PostLoad,
        ]
    }

    fn on_event(&self, entity: &mut User, event: Event) -> Result<()> {
        entity
            .journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        entity.last_event = Some(event);
        Ok(())
    }
}

/// Simple id, every container kind, a lazy field, a read-only field and a
/// simple counter.
#[derive(Debug, Clone, Default)]
pub(crate) struct User {
    pub id: i64,
    pub name: String,
    pub age: Option<i32>,
    pub tags: Vec<String>,
    pub followers: HashSet<String>,
    pub preferences: HashMap<i32, String>,
    pub bio: Option<String>,
    pub created: Option<i64>,
    pub visits: Counter,
    pub journal: Arc<Mutex<Vec<Event>>>,
    pub last_event: Option<Event>,
}

impl User {
    pub(crate) fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Events seen by this instance and every copy of it.
    pub(crate) fn journal(&self) -> Vec<Event> {
        self.journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Entity for User {
    fn entity_meta() -> Result<EntityMeta> {
        EntityMeta::builder("User", "users")
            .property(PropertyMeta::builder("id", PropertyKind::Id, CqlType::BigInt))
            .property(PropertyMeta::builder("name", PropertyKind::Simple, CqlType::Text))
            .property(
                PropertyMeta::builder("age", PropertyKind::Simple, CqlType::Int)
                    .write_level(ConsistencyLevel::Quorum),
            )
            .property(PropertyMeta::builder(
                "tags",
                PropertyKind::List,
                CqlType::List(Box::new(CqlType::Text)),
            ))
            .property(PropertyMeta::builder(
                "followers",
                PropertyKind::Set,
                CqlType::Set(Box::new(CqlType::Text)),
            ))
            .property(PropertyMeta::builder(
                "preferences",
                PropertyKind::Map,
                CqlType::Map(Box::new(CqlType::Int), Box::new(CqlType::Text)),
            ))
            .property(
                PropertyMeta::builder("bio", PropertyKind::Simple, CqlType::Text)
                    .lazy()
                    .read_level(ConsistencyLevel::LocalQuorum),
            )
            .property(
                PropertyMeta::builder("created", PropertyKind::Simple, CqlType::Timestamp)
                    .read_only(),
            )
            .property(PropertyMeta::builder(
                "visits",
                PropertyKind::Counter,
                CqlType::Counter,
            ))
            .interceptor::<User, _>(Journal)
            .build()
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        let mut followers: Vec<_> = self.followers.iter().cloned().collect();
        followers.sort();
        let mut preferences: Vec<_> = self.preferences.iter().collect();
        preferences.sort();
        vec![
            ("name", Value::Text(self.name.clone())),
            ("age", self.age.into()),
            (
                "tags",
                Value::List(self.tags.iter().cloned().map(Value::Text).collect()),
            ),
            (
                "followers",
                Value::Set(followers.into_iter().map(Value::Text).collect()),
            ),
            (
                "preferences",
                Value::Map(
                    preferences
                        .into_iter()
                        .map(|(k, v)| (Value::Int(*k), Value::Text(v.clone())))
                        .collect(),
                ),
            ),
            ("bio", self.bio.clone().into()),
            ("created", self.created.map_or(Value::Null, Value::Timestamp)),
        ]
    }

    fn write_value(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "name" => self.name = Option::<String>::try_from(value)?.unwrap_or_default(),
            "age" => self.age = Option::<i32>::try_from(value)?,
            "tags" => self.tags = Vec::<String>::try_from(value)?,
            "followers" => self.followers = Vec::<String>::try_from(value)?.into_iter().collect(),
            "preferences" => {
                self.preferences = match value {
                    Value::Map(entries) => entries
                        .into_iter()
                        .map(|(k, v)| -> Result<(i32, String)> {
                            Ok((i32::try_from(k)?, String::try_from(v)?))
                        })
                        .collect::<Result<_>>()?,
                    _ => HashMap::new(),
                };
            }
            "bio" => self.bio = Option::<String>::try_from(value)?,
            "created" => {
                self.created = match value {
                    Value::Timestamp(ts) => Some(ts),
                    _ => None,
                };
            }
            other => return Err(unknown("User", other)),
        }
        Ok(())
    }

    fn primary_key(&self) -> Vec<Value> {
        vec![Value::BigInt(self.id)]
    }

    fn with_primary_key(key: &[Value]) -> Result<Self> {
        match key {
            [Value::BigInt(id)] => Ok(Self::new(*id, "")),
            _ => Err(Error::validation(
                "id",
                ValidationErrorKind::MissingKeyComponent,
                "User key is a single bigint",
            )),
        }
    }

    fn from_row(row: &Row) -> Result<Self> {
        let mut user = Self::new(row.get_named("id")?, "");
        for name in ["name", "age", "tags", "followers", "preferences", "bio", "created"] {
            if let Some(value) = row.get_by_name(name) {
                user.write_value(name, value.clone())?;
            }
        }
        Ok(user)
    }

    fn counter_mut(&mut self, property: &str) -> Option<&mut Counter> {
        (property == "visits").then_some(&mut self.visits)
    }
}

pub(crate) fn user_row(id: i64, name: &str, age: Option<i32>) -> Row {
    Row::new(
        vec!["id".into(), "name".into(), "age".into()],
        vec![Value::BigInt(id), Value::Text(name.into()), age.into()],
    )
}

/// Clustered entity: partition `user_id`, clustering `rank`.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Tweet {
    pub user_id: i64,
    pub rank: i32,
    pub content: String,
}

impl Entity for Tweet {
    fn entity_meta() -> Result<EntityMeta> {
        EntityMeta::builder("Tweet", "tweets")
            .property(
                PropertyMeta::builder("id", PropertyKind::EmbeddedId, CqlType::Custom("TweetKey"))
                    .compound_key(CompoundKeyDescriptor::new(vec![
                        KeyComponent::partition("user_id", CqlType::BigInt),
                        KeyComponent::clustering("rank", CqlType::Int),
                    ])),
            )
            .property(PropertyMeta::builder("content", PropertyKind::Simple, CqlType::Text))
            .build()
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![("content", Value::Text(self.content.clone()))]
    }

    fn write_value(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "content" => self.content = Option::<String>::try_from(value)?.unwrap_or_default(),
            other => return Err(unknown("Tweet", other)),
        }
        Ok(())
    }

    fn primary_key(&self) -> Vec<Value> {
        vec![Value::BigInt(self.user_id), Value::Int(self.rank)]
    }

    fn with_primary_key(key: &[Value]) -> Result<Self> {
        match key {
            [Value::BigInt(user_id), Value::Int(rank)] => Ok(Self {
                user_id: *user_id,
                rank: *rank,
                content: String::new(),
            }),
            _ => Err(Error::validation(
                "id",
                ValidationErrorKind::MissingKeyComponent,
                "Tweet key is (bigint, int)",
            )),
        }
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            user_id: row.get_named("user_id")?,
            rank: row.get_named("rank")?,
            content: column(row, "content")?.unwrap_or_default(),
        })
    }
}

/// Clustered counter table: partition `user_id`, clustering `day`, counters
/// `likes` and `views`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Stats {
    pub user_id: i64,
    pub day: String,
    pub likes: Counter,
    pub views: Counter,
}

impl Stats {
    pub(crate) fn new(user_id: i64, day: &str) -> Self {
        Self {
            user_id,
            day: day.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Stats {
    fn entity_meta() -> Result<EntityMeta> {
        EntityMeta::builder("Stats", "stats")
            .property(
                PropertyMeta::builder("id", PropertyKind::EmbeddedId, CqlType::Custom("StatsKey"))
                    .compound_key(CompoundKeyDescriptor::new(vec![
                        KeyComponent::partition("user_id", CqlType::BigInt),
                        KeyComponent::clustering("day", CqlType::Text),
                    ])),
            )
            .property(PropertyMeta::builder("likes", PropertyKind::Counter, CqlType::Counter))
            .property(PropertyMeta::builder("views", PropertyKind::Counter, CqlType::Counter))
            .clustered_counter()
            .build()
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        Vec::new()
    }

    fn write_value(&mut self, property: &str, _value: Value) -> Result<()> {
        Err(unknown("Stats", property))
    }

    fn primary_key(&self) -> Vec<Value> {
        vec![Value::BigInt(self.user_id), Value::Text(self.day.clone())]
    }

    fn with_primary_key(key: &[Value]) -> Result<Self> {
        match key {
            [Value::BigInt(user_id), Value::Text(day)] => Ok(Self::new(*user_id, day)),
            _ => Err(Error::validation(
                "id",
                ValidationErrorKind::MissingKeyComponent,
                "Stats key is (bigint, text)",
            )),
        }
    }

    fn from_row(row: &Row) -> Result<Self> {
        let mut stats = Self::new(row.get_named("user_id")?, &row.get_named::<String>("day")?);
        stats.likes.set_loaded(column(row, "likes")?);
        stats.views.set_loaded(column(row, "views")?);
        Ok(stats)
    }

    fn counter_mut(&mut self, property: &str) -> Option<&mut Counter> {
        match property {
            "likes" => Some(&mut self.likes),
            "views" => Some(&mut self.views),
            _ => None,
        }
    }
}
