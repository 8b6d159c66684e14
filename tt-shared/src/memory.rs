//! Pluggable memory accounting for module, bank and mixer buffers
//!
//! Buffers themselves live in ordinary `Vec`s. What is pluggable is the
//! policy: every buffer is announced to a [`MemoryManager`] with its
//! [`AllocType`] before it is handed out and released when it is dropped, so a
//! host can enforce per-kind budgets or track footprint per pool.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

use crate::MemoryError;

/// What an allocation is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocType {
    SongHeader,
    Instrument,
    Sample,
    Pattern,
    SwMixer,
    Player,
}

impl AllocType {
    pub const COUNT: usize = 6;

    pub const ALL: [AllocType; Self::COUNT] = [
        AllocType::SongHeader,
        AllocType::Instrument,
        AllocType::Sample,
        AllocType::Pattern,
        AllocType::SwMixer,
        AllocType::Player,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Allocation policy shared by loaders and the mixer
///
/// Implementations are called from both loading threads and the mixer thread
/// and must be thread-safe.
pub trait MemoryManager: Send + Sync + fmt::Debug {
    /// Reserve `bytes` for a buffer of the given kind
    fn alloc(&self, bytes: usize, kind: AllocType) -> Result<(), MemoryError>;

    /// Release a reservation made by [`MemoryManager::alloc`]
    fn free(&self, bytes: usize, kind: AllocType);
}

pub type SharedMemoryManager = Arc<dyn MemoryManager>;

/// Unbounded manager that accepts every request
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapMemoryManager;

impl HeapMemoryManager {
    pub fn shared() -> SharedMemoryManager {
        Arc::new(Self)
    }
}

impl MemoryManager for HeapMemoryManager {
    fn alloc(&self, _bytes: usize, _kind: AllocType) -> Result<(), MemoryError> {
        Ok(())
    }

    fn free(&self, _bytes: usize, _kind: AllocType) {}
}

/// Manager with per-kind usage counters and optional budgets
#[derive(Debug, Default)]
pub struct TrackingMemoryManager {
    in_use: [AtomicUsize; AllocType::COUNT],
    peak: [AtomicUsize; AllocType::COUNT],
    budgets: [Option<usize>; AllocType::COUNT],
}

impl TrackingMemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the bytes that may be in use for `kind` at any moment
    pub fn with_budget(mut self, kind: AllocType, bytes: usize) -> Self {
        self.budgets[kind.index()] = Some(bytes);
        self
    }

    /// Bytes currently reserved for `kind`
    pub fn in_use(&self, kind: AllocType) -> usize {
        self.in_use[kind.index()].load(Ordering::Acquire)
    }

    /// Highest reservation seen for `kind`
    pub fn peak(&self, kind: AllocType) -> usize {
        self.peak[kind.index()].load(Ordering::Acquire)
    }

    /// Bytes currently reserved across all kinds
    pub fn total_in_use(&self) -> usize {
        AllocType::ALL.iter().map(|&k| self.in_use(k)).sum()
    }
}

impl MemoryManager for TrackingMemoryManager {
    fn alloc(&self, bytes: usize, kind: AllocType) -> Result<(), MemoryError> {
        let counter = &self.in_use[kind.index()];
        let mut current = counter.load(Ordering::Acquire);
        loop {
            let next = current + bytes;
            if let Some(budget) = self.budgets[kind.index()]
                && next > budget
            {
                return Err(MemoryError::BudgetExceeded {
                    kind,
                    requested: bytes,
                    in_use: current,
                    budget,
                });
            }
            match counter.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.peak[kind.index()].fetch_max(next, Ordering::AcqRel);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn free(&self, bytes: usize, kind: AllocType) {
        let counter = &self.in_use[kind.index()];
        let previous = counter.fetch_sub(bytes, Ordering::AcqRel);
        if previous < bytes {
            warn!("{:?} freed {} bytes with only {} in use", kind, bytes, previous);
            counter.store(0, Ordering::Release);
        }
    }
}

/// Typed buffer accounted against a [`MemoryManager`]
///
/// The reservation is made when the allocation is created and released when
/// it is dropped.
pub struct Allocation<T> {
    data: Vec<T>,
    bytes: usize,
    kind: AllocType,
    manager: SharedMemoryManager,
}

impl<T: Clone + Default> Allocation<T> {
    /// Allocate `len` default-initialized (zeroed for numeric types) elements
    pub fn zeroed(
        manager: &SharedMemoryManager,
        len: usize,
        kind: AllocType,
    ) -> Result<Self, MemoryError> {
        let bytes = len * std::mem::size_of::<T>();
        manager.alloc(bytes, kind)?;
        Ok(Self {
            data: vec![T::default(); len],
            bytes,
            kind,
            manager: Arc::clone(manager),
        })
    }

    /// Reset every element to its default value
    pub fn zero_mem(&mut self) {
        self.data.fill(T::default());
    }
}

impl<T> Allocation<T> {
    /// Account an already-built vector
    pub fn from_vec(
        manager: &SharedMemoryManager,
        data: Vec<T>,
        kind: AllocType,
    ) -> Result<Self, MemoryError> {
        let bytes = data.len() * std::mem::size_of::<T>();
        manager.alloc(bytes, kind)?;
        Ok(Self {
            data,
            bytes,
            kind,
            manager: Arc::clone(manager),
        })
    }

    pub fn kind(&self) -> AllocType {
        self.kind
    }

    /// Bytes reserved with the manager
    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> Deref for Allocation<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> DerefMut for Allocation<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> Drop for Allocation<T> {
    fn drop(&mut self) {
        self.manager.free(self.bytes, self.kind);
    }
}

impl<T> fmt::Debug for Allocation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("kind", &self.kind)
            .field("len", &self.data.len())
            .field("bytes", &self.bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_counts_and_releases() {
        let tracker = Arc::new(TrackingMemoryManager::new());
        let manager: SharedMemoryManager = tracker.clone();

        let samples = Allocation::<i16>::zeroed(&manager, 100, AllocType::Sample).unwrap();
        let pattern = Allocation::from_vec(&manager, vec![0u8; 64], AllocType::Pattern).unwrap();
        assert_eq!(samples.len(), 100);
        assert_eq!(tracker.in_use(AllocType::Sample), 200);
        assert_eq!(tracker.in_use(AllocType::Pattern), 64);
        assert_eq!(tracker.total_in_use(), 264);

        drop(samples);
        assert_eq!(tracker.in_use(AllocType::Sample), 0);
        assert_eq!(tracker.peak(AllocType::Sample), 200);
        drop(pattern);
        assert_eq!(tracker.total_in_use(), 0);
    }

    #[test]
    fn test_budget_is_enforced_per_kind() {
        let tracker = Arc::new(TrackingMemoryManager::new().with_budget(AllocType::Sample, 256));
        let manager: SharedMemoryManager = tracker.clone();

        let first = Allocation::<u8>::zeroed(&manager, 200, AllocType::Sample).unwrap();
        let err = Allocation::<u8>::zeroed(&manager, 100, AllocType::Sample).unwrap_err();
        assert!(matches!(err, MemoryError::BudgetExceeded { in_use: 200, .. }));
        // Other kinds are unaffected
        assert!(Allocation::<u8>::zeroed(&manager, 1000, AllocType::Pattern).is_ok());

        drop(first);
        assert!(Allocation::<u8>::zeroed(&manager, 256, AllocType::Sample).is_ok());
    }

    #[test]
    fn test_zero_mem() {
        let manager = HeapMemoryManager::shared();
        let mut buf = Allocation::from_vec(&manager, vec![1.0f32, 2.0, 3.0], AllocType::SwMixer)
            .unwrap();
        buf[1] = 5.0;
        buf.zero_mem();
        assert_eq!(buf.as_slice(), &[0.0, 0.0, 0.0]);
        assert_eq!(buf.kind(), AllocType::SwMixer);
        assert_eq!(buf.byte_len(), 12);
    }

    #[test]
    fn test_concurrent_tracking() {
        let tracker = Arc::new(TrackingMemoryManager::new());
        let manager: SharedMemoryManager = tracker.clone();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let a = Allocation::<u8>::zeroed(&manager, 16, AllocType::Player).unwrap();
                        drop(a);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.in_use(AllocType::Player), 0);
        assert!(tracker.peak(AllocType::Player) >= 16);
    }
}
