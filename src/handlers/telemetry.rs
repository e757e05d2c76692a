//! TelemetryProbe: geo probe plus an access log entry.

use chrono::{FixedOffset, Utc};
use tracing::{error, info, instrument};

use super::Handler;
use super::geo_probe::locate_caller;
use crate::model::{ApiEvent, ApiResponse, TelemetryRecord};
use crate::services::{GeoLocator, RecordStore};

pub struct TelemetryProbe<L, S> {
    locator: L,
    store: S,
    /// Offset applied to record timestamps.
    offset: FixedOffset,
}

impl<L: GeoLocator, S: RecordStore> TelemetryProbe<L, S> {
    pub fn new(locator: L, store: S, offset: FixedOffset) -> Self {
        Self {
            locator,
            store,
            offset,
        }
    }
}

impl<L, S> Handler for TelemetryProbe<L, S>
where
    L: GeoLocator + 'static,
    S: RecordStore + 'static,
{
    const ALLOWED_METHODS: &'static str = "GET";

    #[instrument(skip_all, fields(request_id = %event.request_id()))]
    async fn handle(&self, event: ApiEvent) -> ApiResponse {
        let probe = locate_caller(&self.locator, event.source_ip()).await;
        let record = TelemetryRecord::new(&probe, event.user_agent(), Utc::now(), self.offset);

        // The caller gets the probe result whether or not the log write lands.
        match self.store.put_record(&record).await {
            Ok(()) => info!(record_id = %record.record_id, "Telemetry record persisted"),
            Err(e) => error!(
                record_id = %record.record_id,
                kind = e.kind(),
                error = %e,
                "Telemetry write failed"
            ),
        }

        ApiResponse::ok(Self::ALLOWED_METHODS, &probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::model::{GeoLookup, HttpContext, ProbeResult, RequestContext};
    use std::sync::Mutex;

    struct StaticLocator;

    impl GeoLocator for StaticLocator {
        async fn locate(&self, _ip: &str) -> Result<GeoLookup, ServiceError> {
            Ok(GeoLookup {
                city: Some("Hanoi".to_string()),
                country: Some("Vietnam".to_string()),
                isp: Some("VNPT".to_string()),
                lat: Some(21.03),
                lon: Some(105.85),
                ..Default::default()
            })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<Vec<TelemetryRecord>>,
        fail: bool,
    }

    impl RecordStore for MemoryStore {
        async fn put_record(&self, record: &TelemetryRecord) -> Result<(), ServiceError> {
            if self.fail {
                return Err(ServiceError::Malformed("table unavailable".to_string()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn event() -> ApiEvent {
        ApiEvent {
            request_context: RequestContext {
                request_id: "req-9".to_string(),
                http: Some(HttpContext {
                    method: "GET".to_string(),
                    source_ip: Some("203.0.113.7".to_string()),
                    user_agent: Some("Mozilla/5.0".to_string()),
                }),
            },
            ..Default::default()
        }
    }

    fn ict() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    #[tokio::test]
    async fn test_record_written_with_probe_fields() {
        let handler = TelemetryProbe::new(StaticLocator, MemoryStore::default(), ict());

        let response = handler.handle(event()).await;
        assert_eq!(response.status_code, 200);

        let records = handler.store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.ip_address, "203.0.113.7");
        assert_eq!(record.city, "Hanoi");
        assert_eq!(record.user_agent, "Mozilla/5.0");
        assert_eq!(record.timestamp.len(), "2024-01-01 00:00:00".len());
    }

    #[tokio::test]
    async fn test_store_failure_does_not_change_response() {
        let ok = TelemetryProbe::new(StaticLocator, MemoryStore::default(), ict());
        let failing = TelemetryProbe::new(
            StaticLocator,
            MemoryStore {
                fail: true,
                ..Default::default()
            },
            ict(),
        );

        let ok_response = ok.handle(event()).await;
        let failed_response = failing.handle(event()).await;

        assert_eq!(failed_response, ok_response);
        let body: ProbeResult = serde_json::from_str(&failed_response.body).unwrap();
        assert_eq!(body.country, "Vietnam");
    }

    #[tokio::test]
    async fn test_distinct_record_ids() {
        let handler = TelemetryProbe::new(StaticLocator, MemoryStore::default(), ict());
        handler.handle(event()).await;
        handler.handle(event()).await;

        let records = handler.store.records.lock().unwrap();
        assert_ne!(records[0].record_id, records[1].record_id);
    }
}
