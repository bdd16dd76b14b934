//! Monotone compressing curve for values above a threshold.

/// Identity at or below `threshold`; above it the excess is compressed by
/// `threshold * (value / threshold) ^ power`. Callers guarantee a positive
/// finite threshold and a power in `(0, 1]`.
pub fn softcap(value: f64, threshold: f64, power: f64) -> f64 {
    if value <= threshold {
        return value;
    }
    threshold * (value / threshold).powf(power)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_below_threshold() {
        assert_eq!(softcap(50.0, 100.0, 0.5), 50.0);
        assert_eq!(softcap(100.0, 100.0, 0.5), 100.0);
    }

    #[test]
    fn compresses_above_threshold() {
        let capped = softcap(400.0, 100.0, 0.5);
        assert_eq!(capped, 200.0);
        assert!(capped < 400.0);
    }

    #[test]
    fn stays_monotone_across_the_threshold() {
        let mut previous = 0.0;
        for step in 0..200 {
            let value = f64::from(step) * 2.5;
            let capped = softcap(value, 100.0, 0.4);
            assert!(capped >= previous);
            previous = capped;
        }
    }

    #[test]
    fn power_one_is_identity_everywhere() {
        assert_eq!(softcap(350.0, 100.0, 1.0), 350.0);
    }
}
