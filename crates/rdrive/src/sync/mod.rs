mod rwlock;

pub use rwlock::{RawSpinRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
