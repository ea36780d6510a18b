use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{DatastoreError, DatastoreResult};
use crate::mirror::MirrorReader;
use crate::schema::SchemaContext;

/// Observable lifecycle phase of a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    Uninitialized,
    Initializing,
    Initialized,
    Closed,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What an initialized store runs: its mirror and the listener feeding it.
pub struct Running {
    mirror: MirrorReader,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Running {
    pub fn new(
        mirror: MirrorReader,
        shutdown: oneshot::Sender<()>,
        listener: JoinHandle<()>,
    ) -> Self {
        Self {
            mirror,
            shutdown: Mutex::new(Some(shutdown)),
            listener: Mutex::new(Some(listener)),
        }
    }

    pub fn mirror(&self) -> &MirrorReader {
        &self.mirror
    }

    /// Signal the listener and wait for it to drain. Safe to call twice.
    pub async fn stop(&self) {
        if let Some(shutdown) = self
            .shutdown
            .lock()
            .expect("lifecycle lock poisoned")
            .take()
        {
            let _ = shutdown.send(());
        }
        let listener = self
            .listener
            .lock()
            .expect("lifecycle lock poisoned")
            .take();
        if let Some(listener) = listener {
            if let Err(e) = listener.await {
                warn!(store = %self.mirror.name(), error = %e, "feed listener ended abnormally");
            }
        }
    }
}

enum State {
    Uninitialized,
    Initializing,
    Initialized(Arc<Running>),
    Closed,
}

/// Init guard of one store: `Uninitialized → Initialized → Closed`.
///
/// The schema context must be supplied before `init`; a second `init`
/// is rejected.
pub struct Lifecycle {
    name: String,
    schema: RwLock<Option<Arc<dyn SchemaContext>>>,
    state: RwLock<State>,
}

impl Lifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: RwLock::new(None),
            state: RwLock::new(State::Uninitialized),
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        match *self.state.read().expect("lifecycle lock poisoned") {
            State::Uninitialized => LifecyclePhase::Uninitialized,
            State::Initializing => LifecyclePhase::Initializing,
            State::Initialized(_) => LifecyclePhase::Initialized,
            State::Closed => LifecyclePhase::Closed,
        }
    }

    /// Record the schema context. A later call replaces it for
    /// transactions opened afterwards.
    pub fn set_schema(&self, schema: Arc<dyn SchemaContext>) -> DatastoreResult<()> {
        if self.phase() == LifecyclePhase::Closed {
            return Err(DatastoreError::Closed(self.name.clone()));
        }
        info!(store = %self.name, schema = schema.name(), "schema context received");
        *self.schema.write().expect("lifecycle lock poisoned") = Some(schema);
        Ok(())
    }

    pub fn schema(&self) -> Option<Arc<dyn SchemaContext>> {
        self.schema.read().expect("lifecycle lock poisoned").clone()
    }

    /// Claim the right to initialize. Dropping the claim without
    /// finishing it returns the store to `Uninitialized`.
    pub fn begin_init(&self) -> DatastoreResult<InitClaim<'_>> {
        let mut state = self.state.write().expect("lifecycle lock poisoned");
        match *state {
            State::Uninitialized => {}
            State::Initializing | State::Initialized(_) => {
                return Err(DatastoreError::AlreadyInitialized(self.name.clone()))
            }
            State::Closed => return Err(DatastoreError::Closed(self.name.clone())),
        }
        let schema = self
            .schema()
            .ok_or_else(|| DatastoreError::SchemaContextMissing(self.name.clone()))?;
        *state = State::Initializing;
        Ok(InitClaim {
            lifecycle: self,
            schema,
            settled: false,
        })
    }

    fn abort_init(&self) {
        let mut state = self.state.write().expect("lifecycle lock poisoned");
        if matches!(*state, State::Initializing) {
            debug!(store = %self.name, "initialization aborted");
            *state = State::Uninitialized;
        }
    }

    /// The running store, or why there is none.
    pub fn running(&self) -> DatastoreResult<Arc<Running>> {
        match &*self.state.read().expect("lifecycle lock poisoned") {
            State::Initialized(running) => Ok(Arc::clone(running)),
            State::Uninitialized | State::Initializing => {
                Err(DatastoreError::NotInitialized(self.name.clone()))
            }
            State::Closed => Err(DatastoreError::Closed(self.name.clone())),
        }
    }

    /// Move to `Closed`, handing back what was running so the caller can
    /// stop it. An initialization in progress loses its claim.
    pub fn close(&self) -> Option<Arc<Running>> {
        let previous = std::mem::replace(
            &mut *self.state.write().expect("lifecycle lock poisoned"),
            State::Closed,
        );
        match previous {
            State::Initialized(running) => Some(running),
            _ => None,
        }
    }
}

/// An initialization in progress.
pub struct InitClaim<'a> {
    lifecycle: &'a Lifecycle,
    schema: Arc<dyn SchemaContext>,
    settled: bool,
}

impl InitClaim<'_> {
    pub fn schema(&self) -> &Arc<dyn SchemaContext> {
        &self.schema
    }

    /// Install `running` as the live store. If the store was closed while
    /// the claim was held, `running` is handed back for the caller to stop.
    pub fn finish(mut self, running: Running) -> Result<Arc<Running>, Running> {
        self.settled = true;
        let mut state = self.lifecycle.state.write().expect("lifecycle lock poisoned");
        if !matches!(*state, State::Initializing) {
            return Err(running);
        }
        let running = Arc::new(running);
        *state = State::Initialized(Arc::clone(&running));
        Ok(running)
    }
}

impl Drop for InitClaim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.lifecycle.abort_init();
        }
    }
}
