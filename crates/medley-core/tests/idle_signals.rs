//! Integration tests for signals driven from idle sources.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use medley_core::{IdleControl, MainContext, Signal, TimeSlice};
use parking_lot::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_sliced_work_emits_in_order() {
    init_tracing();
    let context = MainContext::new();
    let produced = Arc::new(Signal::<u32>::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let seen_clone = seen.clone();
    produced.connect(move |&n| seen_clone.lock().push(n));

    let signal = produced.clone();
    let mut queue: Vec<u32> = (0..10).rev().collect();
    let mut slice = TimeSlice::new(Duration::ZERO);
    context
        .add_idle(move || {
            slice.restart();
            while slice.has_time() {
                let Some(n) = queue.pop() else {
                    return IdleControl::Break;
                };
                signal.emit(n);
                slice.record();
            }
            IdleControl::Continue
        })
        .unwrap();

    // One item per turn, plus the turn that finds the queue empty.
    assert_eq!(context.run_until_idle(100), 11);
    assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
}

#[test]
fn test_sources_added_from_other_threads() {
    init_tracing();
    let context = MainContext::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let context = context.clone();
            let runs = runs.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    let runs = runs.clone();
                    context
                        .add_idle(move || {
                            runs.fetch_add(1, Ordering::SeqCst);
                            IdleControl::Break
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(context.pending_count(), 20);
    assert_eq!(context.run_turn(), 20);
    assert_eq!(runs.load(Ordering::SeqCst), 20);
    assert!(!context.has_pending());
}

#[test]
fn test_slot_schedules_follow_up_work() {
    init_tracing();
    let context = MainContext::new();
    let changed = Arc::new(Signal::<String>::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    let weak = Arc::downgrade(&context);
    let log_clone = log.clone();
    changed.connect(move |name| {
        log_clone.lock().push(format!("changed {name}"));
        if let Some(context) = weak.upgrade() {
            let log = log_clone.clone();
            let name = name.clone();
            let _ = context.add_idle(move || {
                log.lock().push(format!("refreshed {name}"));
                IdleControl::Break
            });
        }
    });

    changed.emit("music".to_string());
    changed.emit("videos".to_string());
    assert_eq!(log.lock().len(), 2);

    context.run_until_idle(10);
    assert_eq!(
        *log.lock(),
        ["changed music", "changed videos", "refreshed music", "refreshed videos"]
    );

    context.shutdown();
    changed.emit("photos".to_string());
    context.run_until_idle(10);
    assert_eq!(log.lock().len(), 5);
}
