use crate::error::LivenessError;
use crate::notifier::DispatchReport;
use crate::process::ProcessRecord;

pub enum WatchEvent {
    /// A watched process ended; notifications were dispatched for it.
    Ended {
        record: ProcessRecord,
        report: DispatchReport,
    },
    /// The liveness check itself failed. The record was dropped without notifying.
    Lost {
        record: ProcessRecord,
        error: LivenessError,
    },
    /// A newly matching process was added to the watch set.
    Discovered(ProcessRecord),
}

/// Everything that happened during one poll cycle, in order.
#[derive(Default)]
pub struct CycleReport {
    pub events: Vec<WatchEvent>,
}

impl CycleReport {
    pub fn ended(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.events.iter().filter_map(|e| match e {
            WatchEvent::Ended { record, .. } => Some(record),
            _ => None,
        })
    }

    /// Records dropped because their liveness check failed, with the cause.
    pub fn lost(&self) -> impl Iterator<Item = (&ProcessRecord, &LivenessError)> {
        self.events.iter().filter_map(|e| match e {
            WatchEvent::Lost { record, error } => Some((record, error)),
            _ => None,
        })
    }

    /// Ended processes for which no backend delivered a notification.
    pub fn unnotified(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.events.iter().filter_map(|e| match e {
            WatchEvent::Ended { record, report } if report.delivered.is_empty() => Some(record),
            _ => None,
        })
    }

    pub fn discovered(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.events.iter().filter_map(|e| match e {
            WatchEvent::Discovered(record) => Some(record),
            _ => None,
        })
    }
}
