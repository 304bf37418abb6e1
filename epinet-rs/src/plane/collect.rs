use std::sync::atomic::{AtomicU64, Ordering};

/// Cross-partition OR, used to agree on fired triggers.
pub fn reduce_or(bits: &[bool]) -> bool {
    bits.iter().any(|&b| b)
}

/// Cross-partition sum.
pub fn reduce_sum<I: IntoIterator<Item = u64>>(values: I) -> u64 {
    values.into_iter().sum()
}

/// Rank 0 collects one item per rank, in rank order.
pub fn master_collect<T, I: IntoIterator<Item = T>>(items: I) -> Vec<T> {
    items.into_iter().collect()
}

/// Ring exchange: deliver every outbox message to its destination rank,
/// visiting senders in rank order so per-source ordering is preserved.
/// `outboxes[sender]` holds `(receiver, message)` pairs.
pub fn exchange<M>(outboxes: Vec<Vec<(usize, M)>>, ranks: usize) -> Vec<Vec<M>> {
    let mut inboxes: Vec<Vec<M>> = (0..ranks).map(|_| Vec::new()).collect();
    for outbox in outboxes {
        for (receiver, message) in outbox {
            if receiver < ranks {
                inboxes[receiver].push(message);
            }
        }
    }
    inboxes
}

/// A small block of atomically updated shared counters, standing in for the
/// one-sided window of the original process model. Used for global sequence
/// numbers, never for main-path data.
#[derive(Debug, Default)]
pub struct Window {
    counters: Vec<AtomicU64>,
}

impl Window {
    pub fn new(counters: usize) -> Self {
        Window {
            counters: (0..counters).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Atomically fetch-and-increment counter `index`.
    pub fn next(&self, index: usize) -> u64 {
        self.counters[index].fetch_add(1, Ordering::SeqCst)
    }

    pub fn get(&self, index: usize) -> u64 {
        self.counters[index].load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_preserves_source_order() {
        let outboxes = vec![
            vec![(1, "a0"), (1, "a1")],
            vec![(0, "b0")],
            vec![(1, "c0"), (0, "c1")],
        ];
        let inboxes = exchange(outboxes, 3);
        assert_eq!(inboxes[0], vec!["b0", "c1"]);
        assert_eq!(inboxes[1], vec!["a0", "a1", "c0"]);
        assert!(inboxes[2].is_empty());
    }

    #[test]
    fn window_counts() {
        let window = Window::new(2);
        assert_eq!(window.next(0), 0);
        assert_eq!(window.next(0), 1);
        assert_eq!(window.next(1), 0);
        assert_eq!(window.get(0), 2);
        window.reset();
        assert_eq!(window.get(0), 0);
    }
}
