use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Mutex;

use energymetrics::metrics::{EnergyMetricPoint, MetricSink};

/// Keeps every batch it is asked to write.
#[derive(Default)]
pub struct RecordingSink {
    pub batches: Mutex<Vec<Vec<EnergyMetricPoint>>>,
}

impl RecordingSink {
    pub fn batches(&self) -> Vec<Vec<EnergyMetricPoint>> {
        self.batches.lock().unwrap().clone()
    }
}

impl MetricSink for RecordingSink {
    fn write_points<'a>(&'a self, points: &'a [EnergyMetricPoint]) -> BoxFuture<'a, Result<()>> {
        async move {
            self.batches.lock().unwrap().push(points.to_vec());
            Ok(())
        }
        .boxed()
    }
}
