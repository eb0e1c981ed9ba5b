use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch: 2024-01-01T00:00:00Z in milliseconds since Unix epoch.
const FELLOWSHIP_EPOCH_MS: u64 = 1_704_067_200_000;

const WORKER_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;

struct State {
    last_ms: u64,
    sequence: u64,
}

/// 64-bit time-ordered message ID generator.
///
/// Layout (MSB → LSB): 42 bits of milliseconds since the fellowship epoch,
/// 10 bits of worker ID, 12 bits of per-millisecond sequence.
///
/// IDs are strictly increasing per generator. If the wall clock steps
/// backwards the generator keeps counting from the last observed millisecond.
pub struct SnowflakeGenerator {
    worker_id: u64,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    /// Worker IDs above 1023 are masked into range.
    pub fn new(worker_id: u16) -> Self {
        Self {
            worker_id: (worker_id & MAX_WORKER_ID) as u64,
            state: Mutex::new(State {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn generate(&self) -> i64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let now_ms = current_ms().max(state.last_ms);

        if now_ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted: borrow the next millisecond.
                state.last_ms += 1;
            }
        } else {
            state.sequence = 0;
            state.last_ms = now_ms;
        }

        let ts = state.last_ms.saturating_sub(FELLOWSHIP_EPOCH_MS);
        let id = (ts << (WORKER_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | state.sequence;

        id as i64
    }
}

fn current_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(FELLOWSHIP_EPOCH_MS)
}

/// Extract the creation timestamp (ms since Unix epoch) from a snowflake ID.
pub fn snowflake_timestamp_ms(id: i64) -> u64 {
    let ts = (id as u64) >> (WORKER_BITS + SEQUENCE_BITS);
    ts + FELLOWSHIP_EPOCH_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generates_unique_increasing_ids() {
        let gen = SnowflakeGenerator::new(3);
        let mut ids = HashSet::new();
        let mut prev = 0i64;
        for _ in 0..10_000 {
            let id = gen.generate();
            assert!(id > prev, "not monotonic: {prev} >= {id}");
            assert!(ids.insert(id), "duplicate snowflake: {id}");
            prev = id;
        }
    }

    #[test]
    fn timestamp_is_recoverable() {
        let gen = SnowflakeGenerator::new(0);
        let before = current_ms();
        let id = gen.generate();
        let extracted = snowflake_timestamp_ms(id);
        // Sequence overflow may push the id at most a few ms ahead.
        assert!(extracted >= before && extracted <= current_ms() + 5);
    }

    #[test]
    fn worker_id_is_masked() {
        let gen = SnowflakeGenerator::new(u16::MAX);
        let id = gen.generate() as u64;
        assert_eq!((id >> SEQUENCE_BITS) & ((1 << WORKER_BITS) - 1), MAX_WORKER_ID as u64);
    }
}
