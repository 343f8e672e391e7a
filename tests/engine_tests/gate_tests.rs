//! Tests for ReadGate
//!
//! These tests verify:
//! - Admissions never exceed capacity
//! - Dropping a permit frees its slot
//! - Blocked callers wake when a slot frees up

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use segkv::engine::ReadGate;

// =============================================================================
// Admission Tests
// =============================================================================

#[test]
fn test_gate_admits_up_to_capacity() {
    let gate = ReadGate::new(2);

    let a = gate.try_acquire();
    let b = gate.try_acquire();
    let c = gate.try_acquire();

    assert!(a.is_some());
    assert!(b.is_some());
    assert!(c.is_none());
    assert_eq!(gate.in_flight(), 2);
    assert_eq!(gate.capacity(), 2);
}

#[test]
fn test_gate_permit_drop_frees_slot() {
    let gate = ReadGate::new(1);

    let permit = gate.acquire();
    assert!(gate.try_acquire().is_none());

    drop(permit);

    assert_eq!(gate.in_flight(), 0);
    assert!(gate.try_acquire().is_some());
}

#[test]
fn test_gate_peak_tracks_high_water_mark() {
    let gate = ReadGate::new(3);

    {
        let _a = gate.acquire();
        let _b = gate.acquire();
    }
    let _c = gate.acquire();

    assert_eq!(gate.peak(), 2);
    assert_eq!(gate.in_flight(), 1);
}

// =============================================================================
// Blocking Tests
// =============================================================================

#[test]
fn test_gate_blocked_acquire_wakes_on_release() {
    let gate = Arc::new(ReadGate::new(1));
    let admitted = Arc::new(AtomicBool::new(false));

    let permit = gate.acquire();

    let handle = {
        let gate = Arc::clone(&gate);
        let admitted = Arc::clone(&admitted);
        thread::spawn(move || {
            let _permit = gate.acquire();
            admitted.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!admitted.load(Ordering::SeqCst));

    drop(permit);
    handle.join().unwrap();

    assert!(admitted.load(Ordering::SeqCst));
    assert_eq!(gate.in_flight(), 0);
}

#[test]
fn test_gate_never_exceeds_capacity_under_contention() {
    let gate = Arc::new(ReadGate::new(3));
    let mut handles = vec![];

    for _ in 0..16 {
        let gate = Arc::clone(&gate);
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                let _permit = gate.acquire();
                assert!(gate.in_flight() <= 3);
                thread::yield_now();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(gate.peak() <= 3);
    assert!(gate.peak() >= 1);
    assert_eq!(gate.in_flight(), 0);
}
