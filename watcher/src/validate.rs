use crate::errors::{Error, Result};

const DEVICE_MAX_LEN: usize = 128;

// Characters the realtime database rejects in keys. Allowing '/' would also
// let a device name address an arbitrary path in the telemetry tree.
const FORBIDDEN_CHARS: [char; 6] = ['.', '$', '#', '[', ']', '/'];

/// Validates a device name received from a chat command
pub fn validate_device(device: &str) -> Result<()> {
    if device.is_empty() {
        return Err(Error::InvalidDevice("Device name cannot be empty".to_string()));
    }

    if device.len() > DEVICE_MAX_LEN {
        return Err(Error::InvalidDevice(format!(
            "Device name longer than {} bytes",
            DEVICE_MAX_LEN
        )));
    }

    if let Some(c) = device
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(Error::InvalidDevice(format!(
            "Device name contains forbidden character {:?}",
            c
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_device() {
        assert!(validate_device("soil-1").is_ok());
        assert!(validate_device("greenhouse_bed 3").is_ok());
    }

    #[test]
    fn test_empty_device() {
        assert!(validate_device("").is_err());
    }

    #[test]
    fn test_path_separator_rejected() {
        assert!(validate_device("soil-1/..").is_err());
        assert!(validate_device("a/b").is_err());
    }

    #[test]
    fn test_firebase_key_chars_rejected() {
        for name in ["a.b", "a$b", "a#b", "a[b", "a]b"] {
            assert!(validate_device(name).is_err(), "{} should be rejected", name);
        }
    }

    #[test]
    fn test_control_characters_rejected() {
        assert!(validate_device("soil\n1").is_err());
    }

    #[test]
    fn test_too_long_device() {
        let name = "x".repeat(DEVICE_MAX_LEN + 1);
        assert!(validate_device(&name).is_err());
        assert!(validate_device(&name[..DEVICE_MAX_LEN]).is_ok());
    }
}
