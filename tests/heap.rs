use sockloop::utils::heap::Heap;

// Deterministic pseudo-random sequence so failures reproduce.
fn sequence(count: usize, mut seed: u64) -> Vec<u64> {
    (0..count)
        .map(|_| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            seed >> 33
        })
        .collect()
}

#[test]
fn test_pop_always_returns_smallest() {
    let values = sequence(500, 7);
    let mut heap = Heap::new();
    for value in &values {
        heap.push(*value);
    }

    let mut sorted = values.clone();
    sorted.sort_unstable();

    let mut popped = Vec::new();
    while let Some(value) = heap.pop() {
        popped.push(value);
    }

    assert_eq!(popped, sorted);
    assert!(heap.is_empty());
}

#[test]
fn test_interleaved_push_and_pop() {
    let mut heap = Heap::new();
    let mut shadow: Vec<u64> = Vec::new();

    for (step, value) in sequence(300, 42).into_iter().enumerate() {
        heap.push(value);
        shadow.push(value);

        if step % 3 == 0 {
            let smallest = *shadow.iter().min().unwrap();
            let position = shadow.iter().position(|v| *v == smallest).unwrap();
            shadow.swap_remove(position);

            assert_eq!(heap.pop(), Some(smallest));
        }

        assert_eq!(heap.len(), shadow.len());
        assert_eq!(heap.peek(), shadow.iter().min());
    }
}

#[test]
fn test_heapify_root_after_in_place_update() {
    let mut heap = Heap::new();
    for value in [10, 20, 30, 40, 50] {
        heap.push(value);
    }

    // The root moves past every other element, like a rescheduled timer.
    *heap.peek_mut().unwrap() = 45;
    heap.heapify_root();

    assert_eq!(heap.pop(), Some(20));
    assert_eq!(heap.pop(), Some(30));
    assert_eq!(heap.pop(), Some(40));
    assert_eq!(heap.pop(), Some(45));
    assert_eq!(heap.pop(), Some(50));
    assert_eq!(heap.pop(), None);
}

#[test]
fn test_empty_heap() {
    let mut heap: Heap<u32> = Heap::new();

    assert_eq!(heap.peek(), None);
    assert_eq!(heap.peek_mut(), None);
    assert_eq!(heap.pop(), None);

    heap.heapify_root();
    assert_eq!(heap.len(), 0);
}

#[test]
fn test_clear_and_iter() {
    let mut heap = Heap::new();
    for value in [3, 1, 2] {
        heap.push(value);
    }

    let mut stored: Vec<_> = heap.iter().copied().collect();
    stored.sort();
    assert_eq!(stored, vec![1, 2, 3]);

    heap.clear();
    assert!(heap.is_empty());
}
