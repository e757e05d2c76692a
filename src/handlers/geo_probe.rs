//! GeoProbe: tell the caller where their IP appears to be.

use tracing::{debug, info, instrument, warn};

use super::Handler;
use crate::model::{ApiEvent, ApiResponse, ProbeResult, UNKNOWN};
use crate::services::GeoLocator;

pub struct GeoProbe<L> {
    locator: L,
}

impl<L: GeoLocator> GeoProbe<L> {
    pub fn new(locator: L) -> Self {
        Self { locator }
    }
}

impl<L: GeoLocator + 'static> Handler for GeoProbe<L> {
    const ALLOWED_METHODS: &'static str = "GET";

    #[instrument(skip_all, fields(request_id = %event.request_id()))]
    async fn handle(&self, event: ApiEvent) -> ApiResponse {
        let probe = locate_caller(&self.locator, event.source_ip()).await;
        info!(country = %probe.country, "Geo probe served");
        ApiResponse::ok(Self::ALLOWED_METHODS, &probe)
    }
}

/// Look up `ip` and fill whatever the lookup could not resolve.
///
/// Never fails: a lookup error is logged and yields the all-default result.
pub(crate) async fn locate_caller<L: GeoLocator>(locator: &L, ip: &str) -> ProbeResult {
    if ip == UNKNOWN {
        debug!("Caller IP unavailable, skipping geolocation");
        return ProbeResult::from_lookup(ip, None);
    }

    let lookup = match locator.locate(ip).await {
        Ok(lookup) => Some(lookup),
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "Geo lookup failed");
            None
        }
    };

    ProbeResult::from_lookup(ip, lookup)
}
