use rand::Rng;
use serde::{Deserialize, Serialize};

const MOISTURE_MIN: f64 = 0.0;
const MOISTURE_MAX: f64 = 100.0;

/// One moisture sample as stored under a device node
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: i64,
    pub moisture: f64,
}

impl Reading {
    pub fn is_valid(&self) -> bool {
        self.moisture.is_finite() && (MOISTURE_MIN..=MOISTURE_MAX).contains(&self.moisture)
    }
}

/// Soil slowly dries out and jumps back up when watered.
pub fn next_moisture(rng: &mut impl Rng, current: f64) -> f64 {
    let next = if rng.gen_bool(0.05) {
        rng.gen_range(70.0..95.0) // watering
    } else {
        current - rng.gen_range(0.0..1.5)
    };
    next.clamp(MOISTURE_MIN, MOISTURE_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_moisture_stays_in_range() {
        let mut rng = rand::thread_rng();
        let mut moisture = 1.0;
        for _ in 0..1000 {
            moisture = next_moisture(&mut rng, moisture);
            assert!((MOISTURE_MIN..=MOISTURE_MAX).contains(&moisture));
        }
    }

    #[test]
    fn test_reading_validation() {
        assert!(Reading { timestamp: 1, moisture: 42.0 }.is_valid());
        assert!(!Reading { timestamp: 1, moisture: 120.0 }.is_valid());
        assert!(!Reading { timestamp: 1, moisture: f64::NAN }.is_valid());
    }
}
