use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use derive_more::From;
use influxdb::Client as InfluxClient;
use tower::Service;
use tracing::debug;

use super::models::{Event, Metric, TrainingMetric};

/// A single data point bound for InfluxDB.
#[derive(From)]
pub(in crate::metrics) enum Request {
    Metric(Metric),
    Event(Event),
    Training(TrainingMetric),
}

impl Request {
    fn into_write_query(self) -> influxdb::WriteQuery {
        match self {
            Request::Metric(metric) => metric.into(),
            Request::Event(event) => event.into(),
            Request::Training(training) => training.into(),
        }
    }
}

/// Leaf service that performs the actual writes with the InfluxDB client.
#[derive(Clone)]
pub(in crate::metrics) struct Dispatcher {
    client: InfluxClient,
}

impl Dispatcher {
    pub fn new(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            client: InfluxClient::new(url, database),
        }
    }
}

impl Service<Request> for Dispatcher {
    type Response = ();
    type Error = anyhow::Error;
    #[allow(clippy::type_complexity)]
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let client = self.client.clone();
        Box::pin(async move {
            debug!("dispatching a data point");
            client
                .query(&req.into_write_query())
                .await
                .map_err(|err| anyhow::anyhow!("failed to dispatch the data point: {}", err))?;
            Ok(())
        })
    }
}
