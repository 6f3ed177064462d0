use std::{borrow::Borrow, iter::IntoIterator};

use chrono::{DateTime, Utc};
use influxdb::{InfluxDbWriteable, Timestamp, Type, WriteQuery};

/// The measurements the coordinator reports.
pub enum Measurement {
    /// The phase a pipeline transitioned into.
    Phase,
    /// The number of the round a pipeline opened.
    RoundTotalNumber,
    /// The privacy budget spent on a round.
    RoundEpsilon,
    /// A request a phase accepted.
    MessageAccepted,
    /// A request a phase rejected.
    MessageRejected,
    /// A request a phase discarded.
    MessageDiscarded,
}

impl From<Measurement> for &'static str {
    fn from(measurement: Measurement) -> &'static str {
        match measurement {
            Measurement::Phase => "phase",
            Measurement::RoundTotalNumber => "round_total_number",
            Measurement::RoundEpsilon => "round_epsilon",
            Measurement::MessageAccepted => "message_accepted",
            Measurement::MessageRejected => "message_rejected",
            Measurement::MessageDiscarded => "message_discarded",
        }
    }
}

impl From<Measurement> for String {
    fn from(measurement: Measurement) -> Self {
        <&str>::from(measurement).into()
    }
}

/// Tags attached to a data point.
pub struct Tags(Vec<(String, Type)>);

impl Tags {
    /// Creates an empty tag set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends one tag.
    pub fn add(&mut self, tag: impl Into<String>, value: impl Into<Type>) {
        self.0.push((tag.into(), value.into()))
    }
}

impl Default for Tags {
    fn default() -> Self {
        Self::new()
    }
}

impl IntoIterator for Tags {
    type Item = <Vec<(String, Type)> as IntoIterator>::Item;
    type IntoIter = <Vec<(String, Type)> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A single measurement sample.
pub(in crate::metrics) struct Metric {
    name: Measurement,
    time: DateTime<Utc>,
    value: Type,
    tags: Option<Tags>,
}

impl Metric {
    pub(in crate::metrics) fn new(measurement: Measurement, value: impl Into<Type>) -> Self {
        Self {
            name: measurement,
            time: Utc::now(),
            value: value.into(),
            tags: None,
        }
    }

    pub(in crate::metrics) fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = Some(tags);
        self
    }
}

impl From<Metric> for WriteQuery {
    fn from(metric: Metric) -> Self {
        let mut query = Timestamp::from(metric.time).into_query(metric.name);
        query = query.add_field("value", metric.value);

        if let Some(tags) = metric.tags {
            for (tag, value) in tags {
                query = query.add_tag(tag, value);
            }
        }

        query
    }
}

/// A training progress data point for one epoch of a project.
pub struct TrainingMetric {
    time: DateTime<Utc>,
    project: String,
    epoch: u64,
    loss: f64,
    accuracy: f64,
}

impl TrainingMetric {
    /// Creates a new training metric.
    pub fn new(project: impl Into<String>, epoch: u64, loss: f64, accuracy: f64) -> Self {
        Self {
            time: Utc::now(),
            project: project.into(),
            epoch,
            loss,
            accuracy,
        }
    }
}

impl From<TrainingMetric> for WriteQuery {
    fn from(metric: TrainingMetric) -> Self {
        Timestamp::from(metric.time)
            .into_query("training")
            .add_tag("project", metric.project)
            .add_field("epoch", metric.epoch)
            .add_field("loss", metric.loss)
            .add_field("accuracy", metric.accuracy)
    }
}

/// An annotation written alongside the metrics.
pub(in crate::metrics) struct Event {
    name: &'static str,
    time: DateTime<Utc>,
    title: String,
    description: Option<String>,
    tags: Option<String>,
}

impl Event {
    pub(in crate::metrics) fn new(title: impl Into<String>) -> Self {
        Self {
            name: "event",
            time: Utc::now(),
            title: title.into(),
            description: None,
            tags: None,
        }
    }

    pub(in crate::metrics) fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub(in crate::metrics) fn with_tags(mut self, tags: &[impl Borrow<str>]) -> Self {
        self.tags = Some(tags.join(","));
        self
    }
}

impl From<Event> for WriteQuery {
    fn from(event: Event) -> Self {
        let mut query = Timestamp::from(event.time).into_query(event.name);
        query = query.add_field("title", event.title);

        if let Some(description) = event.description {
            query = query.add_field("description", description);
        }

        if let Some(tags) = event.tags {
            query = query.add_field("tags", tags);
        }

        query
    }
}
