//! In-process API facade with definition validation, intent queueing, and
//! SQLite save storage consuming full snapshots.

use std::fmt;
use std::path::Path;

use contracts::{
    GameDefinition, IntentRecord, StateSnapshot, TickSummary, UiTree, ValidationIssue,
};
use engine_core::{EngineError, GameEngine, LayerRegistry};
use serde_json::{json, Value};

mod persistence;
mod server;

pub use persistence::{PersistenceError, SaveRecord, SqliteSaveStore};
pub use server::{serve, ServerError};

#[derive(Debug)]
pub enum InitError {
    Parse(String),
    Rejected(Vec<ValidationIssue>),
    Engine(EngineError),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(reason) => write!(f, "definition does not deserialize: {reason}"),
            Self::Rejected(issues) => write!(f, "definition rejected with {} issue(s)", issues.len()),
            Self::Engine(err) => write!(f, "engine initialization failed: {err}"),
        }
    }
}

impl std::error::Error for InitError {}

impl From<EngineError> for InitError {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::DefinitionRejected(issues) => Self::Rejected(issues),
            other => Self::Engine(other),
        }
    }
}

#[derive(Debug)]
struct SaveState {
    store: SqliteSaveStore,
    last_saved_tick: Option<u64>,
}

#[derive(Debug)]
pub struct EngineApi {
    engine: GameEngine,
    saves: Option<SaveState>,
}

impl EngineApi {
    /// Validates and builds the runtime from raw definition JSON; fails fast
    /// with the aggregate issue list.
    pub fn initialize(raw: Value, registry: &LayerRegistry) -> Result<Self, InitError> {
        let definition: GameDefinition =
            serde_json::from_value(raw).map_err(|err| InitError::Parse(err.to_string()))?;
        let engine = GameEngine::with_fixed_timestep(definition, registry)?;
        Ok(Self {
            engine,
            saves: None,
        })
    }

    pub fn game_id(&self) -> &str {
        self.engine.game_id()
    }

    pub fn status(&self) -> Value {
        json!({
            "game_id": self.engine.game_id(),
            "tick": self.engine.current_tick(),
            "last_saved_tick": self.saves.as_ref().and_then(|state| state.last_saved_tick),
        })
    }

    /// Appends to the next tick's input queue.
    pub fn enqueue_intent(&mut self, intent: IntentRecord) {
        self.engine.enqueue_intent(intent);
    }

    /// Advances `steps` frames and returns the last summary.
    pub fn tick(&mut self, steps: u64) -> Result<Option<TickSummary>, EngineError> {
        let mut last = None;
        for _ in 0..steps.max(1) {
            last = Some(self.engine.tick()?);
        }
        Ok(last)
    }

    pub fn last_summary(&self) -> Option<&TickSummary> {
        self.engine.last_tick_summary()
    }

    pub fn ui(&self) -> Option<&UiTree> {
        self.engine.last_tick_summary().map(|summary| &summary.ui)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.engine.snapshot()
    }

    pub fn engine_mut(&mut self) -> &mut GameEngine {
        &mut self.engine
    }

    pub fn attach_save_store(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let store = SqliteSaveStore::open(path)?;
        self.saves = Some(SaveState {
            store,
            last_saved_tick: None,
        });
        Ok(())
    }

    pub fn attach_in_memory_save_store(&mut self) -> Result<(), PersistenceError> {
        let store = SqliteSaveStore::open_in_memory()?;
        self.saves = Some(SaveState {
            store,
            last_saved_tick: None,
        });
        Ok(())
    }

    /// Persists the current full snapshot. The saver is external to the
    /// core: it only ever consumes whole snapshots.
    pub fn save(&mut self) -> Result<(), PersistenceError> {
        let snapshot = self.engine.snapshot();
        let tick = self.engine.current_tick();
        let game_id = self.engine.game_id().to_string();
        let Some(state) = self.saves.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };
        state.store.save_snapshot(&game_id, tick, &snapshot)?;
        state.last_saved_tick = Some(tick);
        Ok(())
    }

    pub fn load_latest_save(&self) -> Result<Option<SaveRecord>, PersistenceError> {
        let Some(state) = self.saves.as_ref() else {
            return Err(PersistenceError::NotAttached);
        };
        state.store.load_latest(self.engine.game_id())
    }

    pub fn destroy(&mut self) -> Result<(), EngineError> {
        self.engine.destroy()
    }
}
