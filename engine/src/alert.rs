//! Alert Dispatcher.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use corelib::{Alert, Event, Indicator};
use tracing::{debug, info};

use crate::error::Result;
use crate::metrics::{Counters, bump};
use crate::sink::{AlertSink, deliver_with_retry};

pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    counters: Counters,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>, counters: Counters) -> Self {
        Self { sink, counters }
    }

    /// Emits an alert for a significant event. Returns `Ok(None)` for an
    /// event that is not significant.
    pub async fn dispatch(
        &self,
        indicator: &Indicator,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        if !event.surprise.significant {
            debug!(event_id = %event.id, "not significant; no alert");
            return Ok(None);
        }

        let alert = Alert {
            event_id: event.id,
            indicator: indicator.code.clone(),
            indicator_name: indicator.name.clone(),
            impact: indicator.impact,
            release: event.release.clone(),
            surprise: event.surprise.clone(),
            emitted_at: now,
        };

        let sink = &self.sink;
        let res = deliver_with_retry("alert", || sink.send_alert(&alert)).await;
        match res {
            Ok(()) => {
                bump(&self.counters.alerts_sent);
                info!(event_id = %event.id, indicator = %indicator.code, "alert sent");
                Ok(Some(alert))
            }
            Err(e) => {
                bump(&self.counters.delivery_failures);
                Err(e)
            }
        }
    }
}
