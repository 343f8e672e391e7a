//! Read Gate
//!
//! Counting semaphore that bounds how many lookups run at once.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

/// Admission control for lookups
///
/// Callers past `capacity` block in [`acquire`](Self::acquire) until a
/// [`ReadPermit`] is dropped.
pub struct ReadGate {
    capacity: usize,
    in_use: Mutex<usize>,
    freed: Condvar,
    /// Highest number of permits ever held at once
    peak: AtomicUsize,
}

/// An admission slot; released on drop
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct ReadPermit<'a> {
    gate: &'a ReadGate,
}

impl ReadGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_use: Mutex::new(0),
            freed: Condvar::new(),
            peak: AtomicUsize::new(0),
        }
    }

    /// Block until a slot is free, then take it
    pub fn acquire(&self) -> ReadPermit<'_> {
        let mut in_use = self.in_use.lock();
        while *in_use >= self.capacity {
            self.freed.wait(&mut in_use);
        }
        self.admit(&mut in_use)
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<ReadPermit<'_>> {
        let mut in_use = self.in_use.lock();
        if *in_use >= self.capacity {
            return None;
        }
        Some(self.admit(&mut in_use))
    }

    fn admit(&self, in_use: &mut usize) -> ReadPermit<'_> {
        *in_use += 1;
        self.peak.fetch_max(*in_use, Ordering::Relaxed);
        ReadPermit { gate: self }
    }

    /// Permits currently held
    pub fn in_flight(&self) -> usize {
        *self.in_use.lock()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Highest concurrent admission observed; never exceeds `capacity`
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }
}

impl Drop for ReadPermit<'_> {
    fn drop(&mut self) {
        let mut in_use = self.gate.in_use.lock();
        *in_use -= 1;
        drop(in_use);
        self.gate.freed.notify_one();
    }
}
