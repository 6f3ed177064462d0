use std::borrow::Borrow;

use futures::future::poll_fn;
use influxdb::Type;
use tower::Service;
use tracing::{error, warn};

use super::{Dispatcher, Event, InfluxDbService, Measurement, Metric, Request, Tags, TrainingMetric};
use crate::settings::InfluxSettings;

/// Sends metrics and events to InfluxDB.
pub struct Recorder {
    /// The buffered write pipeline.
    service: InfluxDbService,
}

impl Recorder {
    /// Builds a recorder for the configured InfluxDB instance.
    pub fn new(settings: InfluxSettings) -> Self {
        Self {
            service: InfluxDbService::new(Dispatcher::new(settings.url, settings.db)),
        }
    }

    /// Records a measurement, optionally tagged.
    pub fn metric<V, T>(&self, measurement: Measurement, value: V, tags: T)
    where
        V: Into<Type>,
        T: Into<Option<Tags>>,
    {
        let mut metric = Metric::new(measurement, value);
        if let Some(tags) = tags.into() {
            metric = metric.with_tags(tags);
        }

        self.call(metric.into())
    }

    /// Records the per-epoch metrics of a training run.
    pub fn training(&self, metric: TrainingMetric) {
        self.call(metric.into())
    }

    /// Records an event with an optional description and tags.
    pub fn event<T, D, S>(&self, title: T, description: Option<D>, tags: Option<&[S]>)
    where
        T: Into<String>,
        D: Into<String>,
        S: Borrow<str>,
    {
        let mut event = Event::new(title);
        if let Some(description) = description {
            event = event.with_description(description);
        }
        if let Some(tags) = tags {
            event = event.with_tags(tags);
        }

        self.call(event.into())
    }

    fn call(&self, req: Request) {
        let mut handle = self.service.0.clone();
        tokio::spawn(async move {
            if let Err(err) = poll_fn(|cx| handle.poll_ready(cx)).await {
                error!("influx service temporarily unavailable: {}", err);
                return;
            }

            if let Err(err) = handle.call(req).await {
                warn!("influx service error: {}", err)
            }
        });
    }
}
