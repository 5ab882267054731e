use alloc::{boxed::Box, vec::Vec};

use driver_interface::{DeviceId, DriverResult};
use log::{debug, error, warn};

use crate::{
    error::{BindError, ReleaseFailure},
    resource::{Action, Entry, Resource, ResourceGuard, ResourceKind, Slot},
};

/// The ordered list of everything one bound device owns.
///
/// Entries are released newest first, whichever way the chain ends: bind
/// rollback, unbind, or drop.
pub struct ResourceChain {
    owner: DeviceId,
    entries: Vec<Box<dyn Entry>>,
}

impl ResourceChain {
    pub fn new(owner: DeviceId) -> Self {
        Self {
            owner,
            entries: Vec::new(),
        }
    }

    pub fn owner(&self) -> DeviceId {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Acquisition steps, oldest first.
    pub fn steps(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.step()).collect()
    }

    /// Runs `f` and records what it acquired. Nothing is recorded on failure.
    pub fn acquire<R, F>(&mut self, step: &'static str, f: F) -> Result<Slot<R>, BindError>
    where
        R: Resource,
        F: FnOnce() -> DriverResult<R>,
    {
        let res = f().map_err(|source| BindError::ResourceUnavailable {
            step,
            kind: R::KIND,
            source,
        })?;
        Ok(self.push(ResourceGuard::new(step, res)))
    }

    /// Like [`acquire`](Self::acquire), for steps that publish the device
    /// to an outer subsystem.
    pub fn register<R, F>(&mut self, step: &'static str, f: F) -> Result<Slot<R>, BindError>
    where
        R: Resource,
        F: FnOnce() -> DriverResult<R>,
    {
        let res = f().map_err(|source| BindError::RegistrationFailed { step, source })?;
        Ok(self.push(ResourceGuard::new(step, res)))
    }

    /// Records an undo step that has no resource value.
    pub fn add_action<F>(&mut self, step: &'static str, kind: ResourceKind, release: F)
    where
        F: FnOnce() -> DriverResult + Send + Sync + 'static,
    {
        self.entries
            .push(Box::new(Action::new(step, kind, Box::new(release))));
    }

    pub fn get<R: Resource>(&self, slot: Slot<R>) -> Option<&R> {
        self.entries
            .get(slot.index)?
            .as_any()
            .downcast_ref::<ResourceGuard<R>>()?
            .get()
    }

    fn push<R: Resource>(&mut self, guard: ResourceGuard<R>) -> Slot<R> {
        let slot = Slot::new(self.entries.len());
        debug!("[{}] {}: acquired {:?}", self.owner, guard.step(), R::KIND);
        self.entries.push(Box::new(guard));
        slot
    }

    /// Rolls back a failed bind. Returns how many entries were released.
    pub fn unwind(mut self) -> usize {
        let mut n = 0;
        while let Some(mut entry) = self.entries.pop() {
            if let Err(e) = entry.release() {
                error!(
                    "[{}] unwind {}: release of {:?} failed: {e}",
                    self.owner,
                    entry.step(),
                    entry.kind()
                );
            }
            n += 1;
        }
        n
    }

    /// Releases every entry, newest first, carrying on past failures.
    pub fn release_all(mut self) -> Vec<ReleaseFailure> {
        let mut failures = Vec::new();
        while let Some(mut entry) = self.entries.pop() {
            if let Err(error) = entry.release() {
                warn!(
                    "[{}] {}: release of {:?} failed: {error}",
                    self.owner,
                    entry.step(),
                    entry.kind()
                );
                failures.push(ReleaseFailure {
                    step: entry.step(),
                    kind: entry.kind(),
                    error,
                });
            }
        }
        failures
    }
}

impl Drop for ResourceChain {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            warn!(
                "[{}] chain dropped holding {} entries, releasing",
                self.owner,
                self.entries.len()
            );
        }
        while let Some(mut entry) = self.entries.pop() {
            if let Err(e) = entry.release() {
                warn!(
                    "[{}] {}: release of {:?} failed: {e}",
                    self.owner,
                    entry.step(),
                    entry.kind()
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    use driver_interface::DriverError;

    use super::*;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    struct Tracked {
        name: &'static str,
        log: Log,
        fail: bool,
    }

    impl Resource for Tracked {
        const KIND: ResourceKind = ResourceKind::IoRegion;

        fn release(&mut self) -> DriverResult {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                Err(DriverError::Busy)
            } else {
                Ok(())
            }
        }
    }

    fn tracked(name: &'static str, log: &Log, fail: bool) -> DriverResult<Tracked> {
        Ok(Tracked {
            name,
            log: log.clone(),
            fail,
        })
    }

    #[test]
    fn test_unwind_reverse_order() {
        let log = Log::default();
        let mut chain = ResourceChain::new(DeviceId::from(1u64));
        chain.acquire("a", || tracked("a", &log, false)).unwrap();
        let l = log.clone();
        chain.add_action("b", ResourceKind::Action, move || {
            l.lock().unwrap().push("b");
            Ok(())
        });
        chain.acquire("c", || tracked("c", &log, false)).unwrap();

        let err = chain
            .acquire::<Tracked, _>("d", || Err(DriverError::NoMemory))
            .unwrap_err();
        assert_eq!(err.step(), Some("d"));
        assert_eq!(chain.len(), 3);

        assert_eq!(chain.unwind(), 3);
        assert_eq!(*log.lock().unwrap(), ["c", "b", "a"]);
    }

    #[test]
    fn test_release_all_continues_past_failure() {
        let log = Log::default();
        let mut chain = ResourceChain::new(DeviceId::from(2u64));
        chain.acquire("a", || tracked("a", &log, false)).unwrap();
        chain.acquire("b", || tracked("b", &log, true)).unwrap();
        chain.acquire("c", || tracked("c", &log, false)).unwrap();

        let failures = chain.release_all();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].step, "b");
        assert_eq!(failures[0].error, DriverError::Busy);
        assert_eq!(*log.lock().unwrap(), ["c", "b", "a"]);
    }

    #[test]
    fn test_get_by_slot() {
        let log = Log::default();
        let mut chain = ResourceChain::new(DeviceId::from(3u64));
        let a = chain.acquire("a", || tracked("a", &log, false)).unwrap();
        assert_eq!(chain.get(a).map(|t| t.name), Some("a"));
        assert_eq!(chain.steps(), ["a"]);
    }

    #[test]
    fn test_drop_releases_reverse() {
        let log = Log::default();
        {
            let mut chain = ResourceChain::new(DeviceId::from(4u64));
            chain.acquire("a", || tracked("a", &log, false)).unwrap();
            chain.acquire("b", || tracked("b", &log, false)).unwrap();
        }
        assert_eq!(*log.lock().unwrap(), ["b", "a"]);
    }

    #[test]
    fn test_drop_continues_past_failure() {
        let log = Log::default();
        {
            let mut chain = ResourceChain::new(DeviceId::from(6u64));
            chain.acquire("a", || tracked("a", &log, false)).unwrap();
            chain.acquire("b", || tracked("b", &log, true)).unwrap();
            chain.acquire("c", || tracked("c", &log, false)).unwrap();
        }
        assert_eq!(*log.lock().unwrap(), ["c", "b", "a"]);
    }

    #[test]
    fn test_register_failure_kind() {
        let mut chain = ResourceChain::new(DeviceId::from(5u64));
        let err = chain
            .register::<Tracked, _>("register", || Err(DriverError::Busy))
            .unwrap_err();
        assert_eq!(
            err,
            BindError::RegistrationFailed {
                step: "register",
                source: DriverError::Busy
            }
        );
        assert!(chain.is_empty());
    }
}
