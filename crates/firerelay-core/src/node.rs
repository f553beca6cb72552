//! Cooperative main loop tying the remote app to the relay.


use log::{debug, info, warn};

use crate::{
    dispatch::{DispatchOutcome, ResultDispatcher},
    relay::{RelayController, RelayDriver},
    remote::{INIT_READ_TAG, RemoteApp, ResultQueue, STREAM_TAG},
};

/// Delay between loop iterations.
pub const LOOP_INTERVAL_MS: u64 = 500;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NodeConfig {
    /// Also watch the relay path for changes after the initial read.
    pub follow_changes: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TickResult {
    NotReady,
    /// The app became ready during this tick and the initial read was issued.
    BecameReady,
    Running,
}

/// One-way latch set when the app first reports ready.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReadinessLatch {
    set: bool,
}

impl ReadinessLatch {
    /// Returns true only on the call that sets the latch.
    pub fn set_once(&mut self) -> bool {
        let first = !self.set;
        self.set = true;
        first
    }

    pub fn is_set(&self) -> bool {
        self.set
    }
}

pub struct RelayNode<A, D> {
    app: A,
    relay: RelayController<D>,
    dispatcher: ResultDispatcher,
    results: ResultQueue,
    readiness: ReadinessLatch,
    config: NodeConfig,
}

impl<A, D> RelayNode<A, D>
where
    A: RemoteApp,
    D: RelayDriver,
{
    pub fn new(app: A, relay: RelayController<D>, config: NodeConfig) -> Self {
        Self {
            app,
            relay,
            dispatcher: ResultDispatcher::default(),
            results: ResultQueue::new(),
            readiness: ReadinessLatch::default(),
            config,
        }
    }

    /// Advances the remote app and issues the initial read once it is ready.
    pub async fn tick(&mut self, now_ms: u64) -> TickResult {
        self.app.poll(now_ms, &mut self.results).await;

        if !self.app.ready() {
            if !self.readiness.is_set() {
                debug!("app not ready");
                return TickResult::NotReady;
            }
            return TickResult::Running;
        }

        if !self.readiness.set_once() {
            return TickResult::Running;
        }

        info!("app ready");
        let path = self.dispatcher.watched_path();
        if !self.app.get(path, INIT_READ_TAG) {
            warn!("initial read of {} could not be queued", path);
        }
        if self.config.follow_changes && !self.app.stream(path, STREAM_TAG) {
            warn!("cannot watch {}", path);
        }
        TickResult::BecameReady
    }

    /// Dispatches every queued result; returns how many were handled.
    pub fn drain_results(&mut self) -> usize {
        let mut handled = 0usize;
        while let Some(result) = self.results.pop() {
            let outcome = self.dispatcher.handle(&result, &mut self.relay);
            if outcome == DispatchOutcome::RelayWriteFailed {
                // Have the next watch read deliver the value again.
                self.app.forget_delivered(result.path());
            }
            if outcome != DispatchOutcome::Pending {
                handled += 1;
            }
        }
        handled
    }

    #[cfg(test)]
    pub fn is_ready(&self) -> bool {
        self.readiness.is_set()
    }

    pub fn relay_state(&self) -> bool {
        self.relay.state()
    }

    #[cfg(test)]
    pub fn relay(&self) -> &RelayController<D> {
        &self.relay
    }

    #[cfg(test)]
    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }
}
