use sockloop::{Interest, Selectable, Selector};
use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Interest>>,
}

impl Recorder {
    fn take(&self) -> Vec<Interest> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl Selectable for Recorder {
    fn on_events(self: Arc<Self>, events: Interest) {
        self.events.lock().unwrap().push(events);
    }
}

fn pair() -> (UnixStream, UnixStream) {
    let (left, right) = UnixStream::pair().unwrap();
    left.set_nonblocking(true).unwrap();
    right.set_nonblocking(true).unwrap();
    (left, right)
}

#[test]
fn test_read_readiness_is_delivered() {
    let selector = Selector::new(16).unwrap();
    let (left, mut right) = pair();
    let recorder = Arc::new(Recorder::default());

    selector
        .register(left.as_raw_fd(), recorder.clone(), Interest::READ)
        .unwrap();
    right.write_all(b"x").unwrap();

    let ready = selector.wait_for_events(Duration::from_secs(1)).unwrap();

    assert_eq!(ready, 1);
    let events = recorder.take();
    assert_eq!(events.len(), 1);
    assert!(events[0].contains(Interest::READ));
    assert!(!events[0].contains(Interest::WRITE));
}

#[test]
fn test_read_and_write_coalesce_into_one_callback() {
    let selector = Selector::new(16).unwrap();
    let (left, mut right) = pair();
    let recorder = Arc::new(Recorder::default());

    right.write_all(b"x").unwrap();
    selector
        .register(
            left.as_raw_fd(),
            recorder.clone(),
            Interest::READ | Interest::WRITE,
        )
        .unwrap();

    selector.wait_for_events(Duration::from_secs(1)).unwrap();

    let events = recorder.take();
    assert_eq!(events.len(), 1);
    assert!(events[0].contains(Interest::READ | Interest::WRITE));
}

#[test]
fn test_enable_writable_toggles_only_write_interest() {
    let selector = Selector::new(16).unwrap();
    let (left, _right) = pair();
    let fd = left.as_raw_fd();
    let recorder = Arc::new(Recorder::default());

    selector.register(fd, recorder.clone(), Interest::READ).unwrap();

    // Nothing to read and no write interest: the wait times out.
    assert_eq!(selector.wait_for_events(Duration::from_millis(50)).unwrap(), 0);

    selector.enable_writable(fd, true).unwrap();
    assert_eq!(selector.interest(fd), Some(Interest::READ | Interest::WRITE));
    selector.wait_for_events(Duration::from_secs(1)).unwrap();
    assert_eq!(recorder.take(), vec![Interest::WRITE]);

    selector.enable_writable(fd, false).unwrap();
    assert_eq!(selector.interest(fd), Some(Interest::READ));
    assert_eq!(selector.wait_for_events(Duration::from_millis(50)).unwrap(), 0);
    assert!(recorder.take().is_empty());
}

#[test]
fn test_deregistered_descriptor_is_never_delivered() {
    let selector = Selector::new(16).unwrap();
    let (left, mut right) = pair();
    let recorder = Arc::new(Recorder::default());

    selector
        .register(left.as_raw_fd(), recorder.clone(), Interest::READ)
        .unwrap();
    right.write_all(b"x").unwrap();
    selector.deregister(left.as_raw_fd()).unwrap();

    selector.wait_for_events(Duration::from_millis(50)).unwrap();

    assert!(recorder.take().is_empty());
    assert_eq!(selector.registered(), 0);
}

#[test]
fn test_deregistration_inside_a_batch_drops_later_events() {
    struct Remover {
        selector: Arc<Selector>,
        victim: i32,
        hits: Mutex<usize>,
    }

    impl Selectable for Remover {
        fn on_events(self: Arc<Self>, _events: Interest) {
            *self.hits.lock().unwrap() += 1;
            self.selector.deregister(self.victim).unwrap();
        }
    }

    let selector = Arc::new(Selector::new(16).unwrap());
    let (first, mut first_peer) = pair();
    let (second, mut second_peer) = pair();

    let first_remover = Arc::new(Remover {
        selector: selector.clone(),
        victim: second.as_raw_fd(),
        hits: Mutex::new(0),
    });
    let second_remover = Arc::new(Remover {
        selector: selector.clone(),
        victim: first.as_raw_fd(),
        hits: Mutex::new(0),
    });

    selector
        .register(first.as_raw_fd(), first_remover.clone(), Interest::READ)
        .unwrap();
    selector
        .register(second.as_raw_fd(), second_remover.clone(), Interest::READ)
        .unwrap();
    first_peer.write_all(b"x").unwrap();
    second_peer.write_all(b"x").unwrap();

    selector.wait_for_events(Duration::from_secs(1)).unwrap();

    // Whichever ran first removed the other one before its turn.
    let hits = *first_remover.hits.lock().unwrap() + *second_remover.hits.lock().unwrap();
    assert_eq!(hits, 1);
}

#[test]
fn test_reused_descriptor_never_sees_events_of_its_predecessor() {
    // Closes the victim during dispatch and registers a fresh, idle socket
    // that normally lands on the victim's number.
    struct Swapper {
        selector: Arc<Selector>,
        victim: Mutex<Option<UnixStream>>,
        fresh: Mutex<Option<(UnixStream, UnixStream)>>,
        recorder: Arc<Recorder>,
    }

    impl Selectable for Swapper {
        fn on_events(self: Arc<Self>, _events: Interest) {
            let Some(victim) = self.victim.lock().unwrap().take() else {
                return;
            };

            self.selector.deregister(victim.as_raw_fd()).unwrap();
            drop(victim);

            let (fresh, peer) = pair();
            self.selector
                .register(fresh.as_raw_fd(), self.recorder.clone(), Interest::READ)
                .unwrap();
            *self.fresh.lock().unwrap() = Some((fresh, peer));
        }
    }

    for _ in 0..20 {
        let selector = Arc::new(Selector::new(16).unwrap());
        let (trigger, mut trigger_peer) = pair();
        let (victim, mut victim_peer) = pair();
        let recorder = Arc::new(Recorder::default());

        let trigger_fd = trigger.as_raw_fd();
        let victim_fd = victim.as_raw_fd();
        let swapper = Arc::new(Swapper {
            selector: selector.clone(),
            victim: Mutex::new(Some(victim)),
            fresh: Mutex::new(None),
            recorder: recorder.clone(),
        });

        selector
            .register(trigger_fd, swapper.clone(), Interest::READ)
            .unwrap();
        selector
            .register(victim_fd, swapper.clone(), Interest::READ)
            .unwrap();
        trigger_peer.write_all(b"x").unwrap();
        victim_peer.write_all(b"x").unwrap();

        selector.wait_for_events(Duration::from_secs(1)).unwrap();
        assert!(swapper.fresh.lock().unwrap().is_some());
        assert!(recorder.take().is_empty());

        // The fresh socket has nothing to read.
        selector.wait_for_events(Duration::from_millis(50)).unwrap();
        assert!(recorder.take().is_empty());

        selector.clean();
        drop(trigger);
    }
}

#[test]
fn test_wakeup_interrupts_a_blocked_wait() {
    let selector = Arc::new(Selector::new(16).unwrap());

    let waker = selector.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        waker.wakeup().unwrap();
    });

    let start = Instant::now();
    let ready = selector.wait_for_events(Duration::from_secs(10)).unwrap();

    assert_eq!(ready, 0);
    assert!(start.elapsed() < Duration::from_secs(5));
    handle.join().unwrap();
}

#[test]
fn test_event_buffer_grows_under_load() {
    let selector = Selector::new(2).unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut pairs = Vec::new();

    for _ in 0..40 {
        let (local, mut peer) = pair();
        peer.write_all(b"x").unwrap();
        selector
            .register(local.as_raw_fd(), recorder.clone(), Interest::READ)
            .unwrap();
        pairs.push((local, peer));
    }
    assert_eq!(selector.registered(), 40);

    // Level triggered: every descriptor keeps reporting until it is read.
    let mut waits = 0;
    let mut best = 0;
    while best < 40 && waits < 10 {
        best = best.max(selector.wait_for_events(Duration::from_secs(1)).unwrap());
        waits += 1;
    }

    assert_eq!(best, 40);
}

#[test]
fn test_clean_forgets_everything() {
    let selector = Selector::new(16).unwrap();
    let (left, mut right) = pair();
    let recorder = Arc::new(Recorder::default());

    selector
        .register(left.as_raw_fd(), recorder.clone(), Interest::READ)
        .unwrap();
    right.write_all(b"x").unwrap();

    selector.clean();

    assert_eq!(selector.registered(), 0);
    assert_eq!(Arc::strong_count(&recorder), 1);
    assert_eq!(selector.wait_for_events(Duration::from_millis(50)).unwrap(), 0);
}

#[test]
#[should_panic]
fn test_negative_descriptor_is_rejected() {
    let selector = Selector::new(16).unwrap();
    let _ = selector.register(-1, Arc::new(Recorder::default()), Interest::READ);
}
