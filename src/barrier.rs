use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap as HashMap;
use log::debug;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::errors::{Error, Result};

/// A named rendezvous point shared by a fixed number of parties.
///
/// `wait` blocks the calling actor until every party has arrived, then
/// releases all of them atomically; no caller returns before the last party
/// has called in. Each point is arrive-once: it is used at most once per
/// scenario run and is never reset.
///
/// A party that can never arrive must not leave the others hanging. Two
/// mechanisms bound every wait: an aborting actor forfeits the points it has
/// not reached, and each wait carries a timeout. Either one breaks the point,
/// releasing all current and future waiters with a cancellation error.
pub struct SyncPoint {
    name: String,
    parties: usize,
    state: Mutex<PointState>,
    notify: Notify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Broken {
    Timeout,
    Forfeited,
}

struct PointState {
    arrived: usize,
    released: bool,
    broken: Option<Broken>,
}

impl SyncPoint {
    pub fn new(name: impl Into<String>, parties: usize) -> Self {
        Self {
            name: name.into(),
            parties,
            state: Mutex::new(PointState {
                arrived: 0,
                released: false,
                broken: None,
            }),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Arrives at the point and blocks until all parties have arrived, the
    /// point is broken, or `timeout` elapses.
    pub async fn wait(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        {
            let mut state = self.state.lock();
            if state.broken.is_some() {
                return Err(self.cancellation(&state));
            }
            if state.arrived == self.parties {
                // More arrivals than parties means the same point was reused
                // within one run, which the arrive-once contract forbids.
                return Err(Error::BarrierOverArrival(self.name.clone()));
            }
            state.arrived += 1;
            if state.arrived == self.parties {
                state.released = true;
                drop(state);
                debug!("barrier {:?} released", self.name);
                self.notify.notify_waiters();
                return Ok(());
            }
        }

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.state.lock();
                if state.released {
                    return Ok(());
                }
                if state.broken.is_some() {
                    return Err(self.cancellation(&state));
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let mut state = self.state.lock();
                if state.released {
                    return Ok(());
                }
                if state.broken.is_none() {
                    state.broken = Some(Broken::Timeout);
                }
                let err = self.cancellation(&state);
                drop(state);
                // Release everyone else too; one stuck party must not strand
                // the rest.
                self.notify.notify_waiters();
                return Err(err);
            }
        }
    }

    /// Marks the point as unable to complete because a party aborted before
    /// arriving. All current and future waiters are released with a
    /// cancellation error. Forfeiting an already-released point is a no-op.
    pub fn forfeit(&self) {
        let mut state = self.state.lock();
        if state.released || state.broken.is_some() {
            return;
        }
        state.broken = Some(Broken::Forfeited);
        drop(state);
        debug!("barrier {:?} forfeited", self.name);
        self.notify.notify_waiters();
    }

    fn cancellation(&self, state: &PointState) -> Error {
        match state.broken {
            Some(Broken::Timeout) => Error::BarrierTimeout(self.name.clone()),
            _ => Error::BarrierBroken(self.name.clone()),
        }
    }
}

/// The set of synchronization points one scenario run uses, keyed by name.
///
/// Party counts are derived from the actors' step sequences: a point expects
/// exactly as many arrivals as there are actors referencing it. The set is
/// built once per run; points are not reusable across runs.
pub struct BarrierSet {
    points: HashMap<String, Arc<SyncPoint>>,
    timeout: Duration,
}

impl BarrierSet {
    /// Builds a set from `(name, parties)` pairs.
    pub fn new(parties: impl IntoIterator<Item = (String, usize)>, timeout: Duration) -> Self {
        let points = parties
            .into_iter()
            .map(|(name, count)| {
                let point = Arc::new(SyncPoint::new(name.clone(), count));
                (name, point)
            })
            .collect();
        Self { points, timeout }
    }

    /// Arrives at the named point and waits for the remaining parties.
    pub async fn wait(&self, name: &str) -> Result<()> {
        let point = self
            .points
            .get(name)
            .ok_or_else(|| Error::UnknownBarrier(name.to_string()))?;
        point.wait(self.timeout).await
    }

    /// Forfeits the named point on behalf of a party that will never arrive.
    pub fn forfeit(&self, name: &str) {
        if let Some(point) = self.points.get(name) {
            point.forfeit();
        }
    }

    pub fn point(&self, name: &str) -> Option<&Arc<SyncPoint>> {
        self.points.get(name)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
