//! The InfluxDB backed recorder and its write pipeline.

mod dispatcher;
mod models;
mod recorder;
mod service;

pub(in crate::metrics) use self::{
    dispatcher::{Dispatcher, Request},
    models::{Event, Metric},
    service::InfluxDbService,
};
pub use self::{
    models::{Measurement, Tags, TrainingMetric},
    recorder::Recorder,
};
