//! Serde adapter that writes a [`Duration`] as whole milliseconds.
//!
//! Use with `#[serde(with = "blockstore_types::duration_ms")]`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    serializer.serialize_u64(millis)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timed {
        #[serde(with = "crate::duration_ms")]
        timeout: Duration,
    }

    #[test]
    fn writes_milliseconds() {
        let timed = Timed {
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(serde_json::to_string(&timed).unwrap(), r#"{"timeout":1500}"#);
        let back: Timed = serde_json::from_str(r#"{"timeout":250}"#).unwrap();
        assert_eq!(back.timeout, Duration::from_millis(250));
    }
}
