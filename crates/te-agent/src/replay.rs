//! Experience replay memory

use rand::seq::index;
use rand::Rng;
use te_common::{RingBuffer, TeError, TeResult};

/// One `(s, a, r, s', done)` experience
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Encoded state before acting
    pub state: Vec<f64>,
    /// Chosen path index
    pub action: usize,
    /// Observed reward
    pub reward: f64,
    /// Encoded state after acting
    pub next_state: Vec<f64>,
    /// Whether the episode ended on this step
    pub terminal: bool,
}

/// Bounded FIFO of transitions with uniform sampling
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    slots: RingBuffer<Transition>,
}

impl ReplayBuffer {
    /// Buffer holding at most `capacity` transitions
    pub fn new(capacity: usize) -> TeResult<Self> {
        Ok(Self {
            slots: RingBuffer::new(capacity)?,
        })
    }

    /// Store a transition, evicting the oldest one when full
    pub fn push(&mut self, transition: Transition) {
        self.slots.push(transition);
    }

    /// Draw `batch_size` distinct transitions uniformly at random
    pub fn sample<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> TeResult<Vec<&Transition>> {
        let available = self.slots.len();
        if available < batch_size {
            return Err(TeError::InsufficientData {
                available,
                required: batch_size,
            });
        }
        Ok(index::sample(rng, available, batch_size)
            .into_iter()
            .filter_map(|i| self.slots.get(i))
            .collect())
    }

    /// Stored transitions
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maximum stored transitions
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Transitions oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Transition> + '_ {
        self.slots.iter()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn transition(id: usize) -> Transition {
        Transition {
            state: vec![id as f64],
            action: id % 4,
            reward: id as f64,
            next_state: vec![id as f64 + 1.0],
            terminal: false,
        }
    }

    #[test]
    fn test_insufficient_data() {
        let mut buffer = ReplayBuffer::new(10).unwrap();
        for i in 0..3 {
            buffer.push(transition(i));
        }
        let mut rng = StdRng::seed_from_u64(0);
        let err = buffer.sample(4, &mut rng).unwrap_err();
        assert!(err.is_insufficient_data());
        assert_eq!(buffer.sample(3, &mut rng).unwrap().len(), 3);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        assert!(ReplayBuffer::new(0).is_err());
    }

    #[test]
    fn test_sampling_covers_buffer() {
        let mut buffer = ReplayBuffer::new(8).unwrap();
        for i in 0..8 {
            buffer.push(transition(i));
        }
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = [false; 8];
        for _ in 0..200 {
            for t in buffer.sample(2, &mut rng).unwrap() {
                seen[t.reward as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    proptest! {
        #[test]
        fn prop_fifo_eviction(capacity in 1usize..32, extra in 0usize..64) {
            let mut buffer = ReplayBuffer::new(capacity).unwrap();
            let total = capacity + extra;
            for i in 0..total {
                buffer.push(transition(i));
            }
            prop_assert_eq!(buffer.len(), capacity);
            let kept: Vec<f64> = buffer.iter().map(|t| t.reward).collect();
            let expected: Vec<f64> = (total - capacity..total).map(|i| i as f64).collect();
            prop_assert_eq!(kept, expected);
        }

        #[test]
        fn prop_samples_are_distinct(len in 1usize..40, seed in any::<u64>()) {
            let mut buffer = ReplayBuffer::new(64).unwrap();
            for i in 0..len {
                buffer.push(transition(i));
            }
            let mut rng = StdRng::seed_from_u64(seed);
            let batch = len / 2 + 1;
            let sample = buffer.sample(batch, &mut rng).unwrap();
            let mut ids: Vec<usize> = sample.iter().map(|t| t.reward as usize).collect();
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), batch);
        }
    }
}
