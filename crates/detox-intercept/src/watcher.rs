//! Attach interceptors to file inputs as they appear

use crate::dom::{ChangeEvent, ChangeListener, FileInput, InputId};
use crate::interceptor::{EnabledFlag, Interceptor};
use crate::notify::Notifier;
use crate::pipeline::FileProcessor;
use detox_guard::config::InterceptorConfig;
use futures::{Stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info};

/// Change to the set of file inputs on the page
pub enum DomMutation {
    /// Inputs inserted into the page, including the ones present at load
    Added(Vec<Arc<dyn FileInput>>),
    /// Inputs that left the page
    Removed(Vec<InputId>),
}

type Registry = Mutex<HashMap<InputId, Arc<Interceptor>>>;

/// Keeps exactly one [`Interceptor`] per live input
///
/// An input carries a single capture listener for its whole lifetime. The
/// listener resolves the input's current interceptor through the registry,
/// so an input that leaves the page and comes back is intercepted again.
pub struct InputWatcher {
    config: InterceptorConfig,
    enabled: EnabledFlag,
    processor: Arc<dyn FileProcessor>,
    notifier: Arc<dyn Notifier>,
    interceptors: Arc<Registry>,
    /// Inputs carrying this watcher's listener
    listening: Mutex<HashSet<InputId>>,
}

impl InputWatcher {
    pub fn new(
        config: InterceptorConfig,
        enabled: EnabledFlag,
        processor: Arc<dyn FileProcessor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            enabled,
            processor,
            notifier,
            interceptors: Arc::new(Mutex::new(HashMap::new())),
            listening: Mutex::new(HashSet::new()),
        }
    }

    /// Attach to `input` unless it is already attached.
    /// Returns `true` if a new interceptor was created.
    pub fn observe(&self, input: Arc<dyn FileInput>) -> bool {
        let id = input.id();
        let mut interceptors = self.interceptors();
        if interceptors.contains_key(&id) {
            return false;
        }

        let mut listening = lock(&self.listening);
        if !listening.contains(&id) {
            if !input.mark_attached() {
                debug!(input = %id, "Input already carries a listener");
                return false;
            }
            input.add_capture_listener(route_to(Arc::downgrade(&self.interceptors), id));
            listening.insert(id);
            debug!(input = %id, "Listener attached");
        } else {
            debug!(input = %id, "Input is back on the page");
        }

        let interceptor = Interceptor::new(
            input,
            self.enabled.clone(),
            self.processor.clone(),
            self.notifier.clone(),
            &self.config,
        );
        interceptors.insert(id, interceptor);
        true
    }

    /// Drop the interceptor of an input that left the page. Its listener
    /// stays and passes events through until the input is observed again.
    pub fn forget(&self, id: InputId) -> bool {
        self.interceptors().remove(&id).is_some()
    }

    pub fn get(&self, id: InputId) -> Option<Arc<Interceptor>> {
        self.interceptors().get(&id).cloned()
    }

    /// Number of inputs being watched
    pub fn len(&self) -> usize {
        self.interceptors().len()
    }

    /// Apply mutations until the stream ends
    pub async fn run<S>(&self, mutations: S)
    where
        S: Stream<Item = DomMutation>,
    {
        futures::pin_mut!(mutations);
        while let Some(mutation) = mutations.next().await {
            match mutation {
                DomMutation::Added(inputs) => {
                    let attached = inputs.into_iter().filter(|input| self.observe(input.clone())).count();
                    if attached > 0 {
                        info!(attached, watching = self.len(), "New file input(s) found");
                    }
                }
                DomMutation::Removed(ids) => {
                    for id in ids {
                        if self.forget(id) {
                            debug!(input = %id, "File input removed");
                        }
                    }
                }
            }
        }
    }

    fn interceptors(&self) -> MutexGuard<'_, HashMap<InputId, Arc<Interceptor>>> {
        lock(&self.interceptors)
    }
}

/// Capture listener that hands each event to the input's current interceptor
fn route_to(registry: Weak<Registry>, id: InputId) -> ChangeListener {
    Arc::new(move |event: &ChangeEvent| {
        let Some(registry) = registry.upgrade() else {
            return;
        };
        let interceptor = lock(&registry).get(&id).cloned();
        if let Some(interceptor) = interceptor {
            interceptor.handle_change(event);
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
