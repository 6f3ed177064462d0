//! Recording of coordinator metrics and events.
//!
//! The [`metric!`] and [`event!`] macros write to the process wide recorder
//! and are no-ops until one is installed with [`GlobalRecorder::install`].

pub mod recorders;

use once_cell::sync::OnceCell;

pub use self::recorders::influxdb::{Measurement, Recorder, Tags, TrainingMetric};

static RECORDER: OnceCell<Recorder> = OnceCell::new();

/// Handle for the process wide metrics recorder.
pub struct GlobalRecorder;

impl GlobalRecorder {
    /// Returns the installed recorder, or `None` if none has been installed
    /// yet. Never blocks.
    pub fn global() -> Option<&'static Recorder> {
        RECORDER.get()
    }

    /// Installs `recorder` as the process wide recorder.
    ///
    /// Fails with `Err(recorder)` if one is already installed.
    pub fn install(recorder: Recorder) -> Result<(), Recorder> {
        RECORDER.set(recorder)
    }
}

/// Records an event.
///
/// # Example
///
/// ```ignore
/// // A bare title:
/// event!("Round start");
///
/// // A title and a description:
/// event!("Phase error", "the alignment timed out");
///
/// // A title, a description and tags:
/// event!(
///     "Phase error",
///     "the alignment timed out",
///     ["fraud-ring", "aligning"],
/// );
/// ```
#[macro_export]
macro_rules! event {
    ($title: expr $(,)?) => {
        if let Some(recorder) = crate::metrics::GlobalRecorder::global() {
            recorder.event::<_, &str, &str>($title, None, None);
        }
    };
    ($title: expr, $description: expr $(,)?) => {
        if let Some(recorder) = crate::metrics::GlobalRecorder::global() {
            recorder.event::<_, _, &str>($title, Some($description), None);
        }
    };
    ($title: expr, $description: expr, [$($tags: expr),+] $(,)?) => {
        if let Some(recorder) = crate::metrics::GlobalRecorder::global() {
            recorder.event($title, Some($description), Some(&[$($tags),+]))
        }
    };
}

/// Records a metric.
///
/// # Example
///
/// ```ignore
/// // A plain measurement:
/// metric!(Measurement::RoundTotalNumber, 42);
///
/// // With a tag:
/// metric!(Measurement::RoundEpsilon, 0.7, ("round_id", 42));
///
/// // With several tags:
/// metric!(
///     Measurement::RoundEpsilon,
///     0.7,
///     ("round_id", 42),
///     ("phase", 3),
/// );
///
/// // Message counters and per-epoch training metrics have shorthands:
/// metric!(accepted: 42, PhaseName::Aggregating);
/// metric!(training: "fraud-ring", 3, 0.25, 0.75);
/// ```
#[macro_export]
macro_rules! metric {
    (accepted: $round_id: expr, $phase: expr $(,)?) => {
        crate::metric!(
            crate::metrics::Measurement::MessageAccepted,
            1,
            ("round_id", $round_id),
            ("phase", $phase as u8),
        );
    };
    (rejected: $round_id: expr, $phase: expr $(,)?) => {
        crate::metric!(
            crate::metrics::Measurement::MessageRejected,
            1,
            ("round_id", $round_id),
            ("phase", $phase as u8),
        );
    };
    (discarded: $round_id: expr, $phase: expr $(,)?) => {
        crate::metric!(
            crate::metrics::Measurement::MessageDiscarded,
            1,
            ("round_id", $round_id),
            ("phase", $phase as u8),
        );
    };
    (training: $project: expr, $epoch: expr, $loss: expr, $accuracy: expr $(,)?) => {
        if let Some(recorder) = crate::metrics::GlobalRecorder::global() {
            recorder.training(crate::metrics::TrainingMetric::new(
                $project, $epoch, $loss, $accuracy,
            ));
        }
    };
    ($measurement: expr, $value: expr $(,)?) => {
        if let Some(recorder) = crate::metrics::GlobalRecorder::global() {
            recorder.metric::<_, Option<crate::metrics::Tags>>($measurement, $value, None);
        }
    };
    ($measurement: expr, $value: expr, $(($tag: expr, $val: expr)),+ $(,)?) => {
        if let Some(recorder) = crate::metrics::GlobalRecorder::global() {
            let mut tags = crate::metrics::Tags::new();
            $(
                tags.add($tag, $val);
            )+
            recorder.metric($measurement, $value, tags);
        }
    };
}
