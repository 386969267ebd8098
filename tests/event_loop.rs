use sockloop::{EventLoop, EventLoopBuilder};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn started(name: &str) -> EventLoop {
    EventLoopBuilder::new().name(name).start().unwrap()
}

#[test]
fn test_execute_runs_on_named_worker_thread() {
    let event_loop = started("worker-under-test");
    let (tx, rx) = mpsc::channel();

    let handle = event_loop.clone();
    event_loop.execute(move || {
        let name = thread::current().name().map(str::to_string);
        tx.send((name, handle.in_current())).unwrap();
    });

    let (name, in_current) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(name.as_deref(), Some("worker-under-test"));
    assert!(in_current);
    assert!(!event_loop.in_current());

    event_loop.shutdown();
}

#[test]
fn test_execute_on_loop_thread_runs_inline() {
    let event_loop = started("inline");
    let (tx, rx) = mpsc::channel();

    let inner = event_loop.clone();
    event_loop.execute(move || {
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = ran.clone();
        inner.execute(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(ran.load(Ordering::SeqCst)).unwrap();
    });

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 1);
    event_loop.shutdown();
}

#[test]
fn test_submissions_from_one_thread_keep_their_order() {
    let event_loop = started("ordering");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel();

    for index in 0..200 {
        let seen = seen.clone();
        event_loop.execute(move || seen.lock().unwrap().push(index));
    }
    event_loop.execute(move || tx.send(()).unwrap());

    rx.recv_timeout(WAIT).unwrap();
    assert_eq!(*seen.lock().unwrap(), (0..200).collect::<Vec<_>>());

    event_loop.shutdown();
}

#[test]
fn test_execute_after_fires_by_deadline() {
    let event_loop = started("deadlines");
    let (tx, rx) = mpsc::channel();
    let start = Instant::now();

    for (label, delay) in [("slow", 150), ("fast", 30), ("medium", 90)] {
        let tx = tx.clone();
        event_loop.execute_after(Duration::from_millis(delay), move || {
            tx.send((label, start.elapsed())).unwrap();
        });
    }

    let fired: Vec<_> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
    let labels: Vec<_> = fired.iter().map(|(label, _)| *label).collect();
    assert_eq!(labels, vec!["fast", "medium", "slow"]);
    assert!(fired[0].1 >= Duration::from_millis(30));
    assert!(fired[2].1 >= Duration::from_millis(150));

    event_loop.shutdown();
}

#[test]
fn test_delayed_task_wakes_a_long_idle_wait() {
    let event_loop = EventLoopBuilder::new()
        .name("idle")
        .idle_timeout(Duration::from_secs(600))
        .start()
        .unwrap();
    let (tx, rx) = mpsc::channel();

    // Let the worker block in its idle wait first.
    thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    event_loop.execute_after(Duration::from_millis(20), move || tx.send(()).unwrap());

    rx.recv_timeout(WAIT).unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));

    event_loop.shutdown();
}

#[test]
fn test_cancelled_task_never_runs() {
    let event_loop = started("cancel");
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = ran.clone();
    let handle = event_loop.execute_after(Duration::from_millis(50), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(event_loop.pending_tasks(), 1);

    handle.cancel();
    assert!(handle.is_cancelled());
    assert_eq!(event_loop.pending_tasks(), 0);

    thread::sleep(Duration::from_millis(150));
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    event_loop.shutdown();
}

#[test]
fn test_pending_count_tracks_inserts_cancels_and_runs() {
    let event_loop = started("accounting");
    let (tx, rx) = mpsc::channel();

    let handles: Vec<_> = (0..10)
        .map(|_| event_loop.execute_after(Duration::from_secs(60), || {}))
        .collect();
    event_loop.execute_after(Duration::from_millis(10), move || tx.send(()).unwrap());
    assert_eq!(event_loop.pending_tasks(), 11);

    for handle in &handles[..4] {
        handle.cancel();
    }
    assert_eq!(event_loop.pending_tasks(), 7);

    rx.recv_timeout(WAIT).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(event_loop.pending_tasks(), 6);

    event_loop.shutdown();
}

#[test]
fn test_repeating_timer_until_cancelled() {
    let event_loop = started("repeat");
    let ticks = Arc::new(AtomicUsize::new(0));

    let counter = ticks.clone();
    let handle = event_loop.execute_timer(Duration::from_millis(20), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    thread::sleep(Duration::from_millis(250));
    handle.cancel();
    let at_cancel = ticks.load(Ordering::SeqCst);
    assert!(at_cancel >= 3, "only {at_cancel} ticks");

    thread::sleep(Duration::from_millis(100));
    assert!(ticks.load(Ordering::SeqCst) <= at_cancel + 1);
    assert_eq!(event_loop.pending_tasks(), 0);

    event_loop.shutdown();
}

#[test]
fn test_shutdown_discards_pending_tasks() {
    let event_loop = started("discard");
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = ran.clone();
    event_loop.execute_after(Duration::from_secs(30), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    event_loop.shutdown();

    assert!(!event_loop.is_running());
    assert_eq!(event_loop.pending_tasks(), 0);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn test_shutdown_from_loop_thread_is_rejected() {
    let event_loop = started("self-shutdown");
    let (tx, rx) = mpsc::channel();

    let inner = event_loop.clone();
    event_loop.execute(move || {
        let result = catch_unwind(AssertUnwindSafe(|| inner.shutdown()));
        tx.send(result.is_err()).unwrap();
    });

    assert!(rx.recv_timeout(WAIT).unwrap());
    assert!(event_loop.is_running());

    event_loop.shutdown();
}

#[test]
fn test_restart_after_shutdown() {
    let event_loop = EventLoop::new().unwrap();
    assert!(!event_loop.is_running());

    event_loop.startup().unwrap();
    event_loop.shutdown();
    event_loop.startup().unwrap();

    let (tx, rx) = mpsc::channel();
    event_loop.execute(move || tx.send(()).unwrap());
    rx.recv_timeout(WAIT).unwrap();

    event_loop.shutdown();
}

#[test]
#[should_panic]
fn test_double_startup_panics() {
    let event_loop = started("twice");
    let _ = event_loop.startup();
}

#[test]
#[should_panic]
fn test_zero_interval_timer_panics() {
    let event_loop = EventLoop::new().unwrap();
    event_loop.execute_timer(Duration::ZERO, || {});
}

#[test]
fn test_unbounded_delays_are_accepted() {
    let event_loop = started("unbounded");
    let ran = Arc::new(AtomicUsize::new(0));

    let once = ran.clone();
    let delayed = event_loop.execute_after(Duration::MAX, move || {
        once.fetch_add(1, Ordering::SeqCst);
    });
    let repeating = ran.clone();
    let timer = event_loop.execute_timer(Duration::MAX, move || {
        repeating.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(event_loop.pending_tasks(), 2);

    // The loop keeps serving other work.
    let (tx, rx) = mpsc::channel();
    event_loop.execute(move || tx.send(()).unwrap());
    rx.recv_timeout(WAIT).unwrap();

    delayed.cancel();
    timer.cancel();
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(event_loop.pending_tasks(), 0);

    event_loop.shutdown();
}

#[test]
fn test_unbounded_idle_timeout() {
    let event_loop = EventLoopBuilder::new()
        .name("forever")
        .idle_timeout(Duration::MAX)
        .start()
        .unwrap();
    let (tx, rx) = mpsc::channel();

    thread::sleep(Duration::from_millis(20));
    event_loop.execute(move || tx.send(()).unwrap());

    rx.recv_timeout(WAIT).unwrap();
    event_loop.shutdown();
}
