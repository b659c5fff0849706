//! Latest-reading slot shared between a channel worker and its readers.
//!
//! A sequence lock over plain atomics: the single writer bumps the sequence
//! to odd, stores the fields, then bumps it to even. Readers retry while the
//! sequence is odd or changed underneath them.

use super::types::SensorReading;
use std::sync::atomic::{fence, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

const FLAG_PRESENT: u8 = 0b001;
const FLAG_VALID: u8 = 0b010;
const FLAG_CONTACT: u8 = 0b100;

/// Reads give up after this many torn attempts.
const MAX_READ_ATTEMPTS: usize = 64;

#[derive(Debug)]
pub struct LatestSlot {
    epoch: Instant,
    seq: AtomicU64,
    value_bits: AtomicU64,
    offset_nanos: AtomicU64,
    flags: AtomicU8,
}

impl LatestSlot {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            seq: AtomicU64::new(0),
            value_bits: AtomicU64::new(0),
            offset_nanos: AtomicU64::new(0),
            flags: AtomicU8::new(0),
        }
    }

    /// Replace the stored reading. Must only be called from one thread.
    pub fn publish(&self, reading: &SensorReading) {
        let offset = reading.at.saturating_duration_since(self.epoch);
        let offset = u64::try_from(offset.as_nanos()).unwrap_or(u64::MAX);

        let mut flags = FLAG_PRESENT;
        if reading.valid {
            flags |= FLAG_VALID;
        }
        if reading.contact {
            flags |= FLAG_CONTACT;
        }

        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.value_bits
            .store(reading.value.to_bits(), Ordering::Relaxed);
        self.offset_nanos.store(offset, Ordering::Relaxed);
        self.flags.store(flags, Ordering::Relaxed);

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Load a consistent copy of the stored reading, if any.
    pub fn load(&self) -> Option<SensorReading> {
        for _ in 0..MAX_READ_ATTEMPTS {
            let before = self.seq.load(Ordering::Acquire);
            if before % 2 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let value_bits = self.value_bits.load(Ordering::Relaxed);
            let offset = self.offset_nanos.load(Ordering::Relaxed);
            let flags = self.flags.load(Ordering::Relaxed);

            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) != before {
                std::hint::spin_loop();
                continue;
            }

            if flags & FLAG_PRESENT == 0 {
                return None;
            }
            return Some(SensorReading {
                value: f64::from_bits(value_bits),
                at: self.epoch + Duration::from_nanos(offset),
                valid: flags & FLAG_VALID != 0,
                contact: flags & FLAG_CONTACT != 0,
            });
        }
        None
    }
}

impl Default for LatestSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn reading(value: f64) -> SensorReading {
        SensorReading {
            value,
            at: Instant::now(),
            valid: true,
            contact: true,
        }
    }

    #[test]
    fn test_empty_slot() {
        assert!(LatestSlot::new().load().is_none());
    }

    #[test]
    fn test_publish_overwrites() {
        let slot = LatestSlot::new();
        slot.publish(&reading(1.0));
        slot.publish(&SensorReading {
            valid: false,
            contact: false,
            ..reading(2.5)
        });

        let latest = slot.load().unwrap();
        assert_eq!(latest.value, 2.5);
        assert!(!latest.valid);
        assert!(!latest.contact);
    }

    #[test]
    fn test_timestamp_preserved() {
        let slot = LatestSlot::new();
        let r = reading(3.0);
        slot.publish(&r);
        let loaded = slot.load().unwrap();
        let skew = if loaded.at > r.at {
            loaded.at - r.at
        } else {
            r.at - loaded.at
        };
        assert!(skew < Duration::from_micros(1));
    }

    #[test]
    fn test_concurrent_readers_see_whole_values() {
        let slot = Arc::new(LatestSlot::new());
        let writer_slot = slot.clone();

        let writer = std::thread::spawn(move || {
            for i in 0..10_000u32 {
                let v = f64::from(i);
                // valid flag encodes parity so torn reads would be detectable
                writer_slot.publish(&SensorReading {
                    value: v,
                    at: Instant::now(),
                    valid: i % 2 == 0,
                    contact: true,
                });
            }
        });

        for _ in 0..10_000 {
            if let Some(r) = slot.load() {
                assert_eq!(r.valid, (r.value as u32) % 2 == 0);
            }
        }
        writer.join().unwrap();
    }
}
