// # Memory Event Log
//
// In-memory implementation of EventLog.
//
// Append-only like every log implementation; ids are assigned from a
// monotonic counter. Not persistent — meant for tests and ephemeral runs.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::event_log::{ChangeEvent, EventLog, NewChangeEvent};

/// In-memory event log implementation
#[derive(Debug, Clone, Default)]
pub struct MemoryEventLog {
    inner: Arc<RwLock<Vec<ChangeEvent>>>,
}

impl MemoryEventLog {
    /// Create a new empty memory event log
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, event: NewChangeEvent) -> Result<ChangeEvent, Error> {
        let mut events = self.inner.write().await;
        let stored = ChangeEvent {
            id: events.len() as i64 + 1,
            timestamp: event.timestamp,
            address: event.address,
            city: event.city,
            region: event.region,
            country: event.country,
        };
        events.push(stored.clone());
        Ok(stored)
    }

    async fn query_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ChangeEvent>, Error> {
        let events = self.inner.read().await;
        let mut matched: Vec<ChangeEvent> = events
            .iter()
            .filter(|event| event.timestamp >= from && event.timestamp < to)
            .cloned()
            .collect();
        matched.sort_by_key(|event| (event.timestamp, event.id));
        Ok(matched)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ChangeEvent>, Error> {
        let events = self.inner.read().await;
        let mut all: Vec<ChangeEvent> = events.clone();
        all.sort_by_key(|event| std::cmp::Reverse((event.timestamp, event.id)));
        all.truncate(limit);
        Ok(all)
    }

    async fn find_address(&self, address: IpAddr) -> Result<Vec<ChangeEvent>, Error> {
        let events = self.inner.read().await;
        let mut matched: Vec<ChangeEvent> = events
            .iter()
            .filter(|event| event.address == address)
            .cloned()
            .collect();
        matched.sort_by_key(|event| std::cmp::Reverse((event.timestamp, event.id)));
        Ok(matched)
    }

    async fn count(&self) -> Result<u64, Error> {
        Ok(self.inner.read().await.len() as u64)
    }

    async fn distinct_address_count(&self) -> Result<u64, Error> {
        let events = self.inner.read().await;
        let mut addresses: Vec<IpAddr> = events.iter().map(|event| event.address).collect();
        addresses.sort();
        addresses.dedup();
        Ok(addresses.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_at(addr: &str, ts: DateTime<Utc>) -> NewChangeEvent {
        NewChangeEvent {
            timestamp: ts,
            address: addr.parse().unwrap(),
            city: None,
            region: None,
            country: None,
        }
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids() {
        let log = MemoryEventLog::new();
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let first = log.append(event_at("1.2.3.4", t)).await.unwrap();
        let second = log.append(event_at("5.6.7.8", t)).await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(log.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn range_is_ascending_and_bounded() {
        let log = MemoryEventLog::new();
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        // Appended out of order on purpose
        log.append(event_at("2.2.2.2", base + chrono::Duration::hours(2)))
            .await
            .unwrap();
        log.append(event_at("1.1.1.1", base + chrono::Duration::hours(1)))
            .await
            .unwrap();
        log.append(event_at("3.3.3.3", base + chrono::Duration::hours(30)))
            .await
            .unwrap();

        let events = log
            .query_range(base, base + chrono::Duration::hours(3))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].timestamp < events[1].timestamp);
    }

    #[tokio::test]
    async fn distinct_counts_unique_addresses() {
        let log = MemoryEventLog::new();
        let t = Utc::now();
        log.append(event_at("1.2.3.4", t)).await.unwrap();
        log.append(event_at("5.6.7.8", t)).await.unwrap();
        log.append(event_at("1.2.3.4", t)).await.unwrap();

        assert_eq!(log.count().await.unwrap(), 3);
        assert_eq!(log.distinct_address_count().await.unwrap(), 2);
    }
}
