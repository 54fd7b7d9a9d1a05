//! Decides whether a poll result continues the current tail entry or starts a new one.

use shared::types::Entry;
use uuid::Uuid;

/// What a single observation does to the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Same ip as the tail: move its `last_updated` to `timestamp`
    Extend { id: Uuid, timestamp: i64 },
    /// Different ip, or empty log: record a new entry
    New {
        ip: String,
        timestamp: i64,
        changed_after: i64,
    },
}

/// `previous` is the current tail. The sentinel ip compares like any other
/// address, so consecutive lookup failures extend one entry.
pub fn reconcile(previous: Option<&Entry>, ip: &str, timestamp: i64) -> Outcome {
    match previous {
        Some(prev) if prev.ip == ip => Outcome::Extend {
            id: prev.id,
            timestamp,
        },
        Some(prev) => Outcome::New {
            ip: ip.to_string(),
            timestamp,
            changed_after: timestamp - prev.timestamp,
        },
        None => Outcome::New {
            ip: ip.to_string(),
            timestamp,
            changed_after: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::SENTINEL_IP;

    fn entry(ip: &str, timestamp: i64) -> Entry {
        Entry {
            id: Uuid::new_v4(),
            timestamp,
            ip: ip.to_string(),
            changed_after: 0,
            last_updated: timestamp,
        }
    }

    #[test]
    fn test_first_observation_is_new() {
        assert_eq!(
            reconcile(None, "1.2.3.4", 1_000),
            Outcome::New { ip: "1.2.3.4".to_string(), timestamp: 1_000, changed_after: 0 }
        );
    }

    #[test]
    fn test_same_ip_extends_tail() {
        let prev = entry("1.2.3.4", 1_000);
        assert_eq!(
            reconcile(Some(&prev), "1.2.3.4", 2_000),
            Outcome::Extend { id: prev.id, timestamp: 2_000 }
        );
    }

    #[test]
    fn test_changed_ip_measures_gap_from_tail_start() {
        let mut prev = entry("1.2.3.4", 1_000);
        prev.last_updated = 2_000;

        assert_eq!(
            reconcile(Some(&prev), "5.6.7.8", 3_000),
            Outcome::New { ip: "5.6.7.8".to_string(), timestamp: 3_000, changed_after: 2_000 }
        );
    }

    #[test]
    fn test_sentinel_behaves_like_an_address() {
        let failed = entry(SENTINEL_IP, 1_000);
        assert!(matches!(
            reconcile(Some(&failed), SENTINEL_IP, 2_000),
            Outcome::Extend { .. }
        ));

        let ok = entry("1.2.3.4", 1_000);
        assert!(matches!(
            reconcile(Some(&ok), SENTINEL_IP, 2_000),
            Outcome::New { changed_after: 1_000, .. }
        ));
    }
}
