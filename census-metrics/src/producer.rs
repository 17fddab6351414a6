use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::Metric;

/// A source of metrics.
///
/// Producers are read in regular intervals by a [`IntervalReader`](crate::IntervalReader), or on
/// demand. Every call returns a fresh snapshot; implementations must not hand out data that
/// is mutated after `read` returns.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Returns a snapshot of all metrics of this producer.
    async fn read(&self) -> Vec<Metric>;
}

/// A set of [producers](Producer), keyed by identity.
///
/// The registry can be shared across threads. Adding the same producer twice has no effect.
#[derive(Default)]
pub struct ProducerRegistry {
    producers: RwLock<Vec<Arc<dyn Producer>>>,
}

impl fmt::Debug for ProducerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerRegistry")
            .field("producers", &self.producers.read().len())
            .finish()
    }
}

impl ProducerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a producer unless it is already registered.
    pub fn add(&self, producer: Arc<dyn Producer>) {
        let mut producers = self.producers.write();
        if !producers.iter().any(|p| same_producer(p, &producer)) {
            producers.push(producer);
        }
    }

    /// Removes a previously added producer.
    pub fn remove(&self, producer: &Arc<dyn Producer>) {
        self.producers
            .write()
            .retain(|p| !same_producer(p, producer));
    }

    /// Returns a snapshot of all registered producers.
    pub fn producers(&self) -> Vec<Arc<dyn Producer>> {
        self.producers.read().clone()
    }

    /// Reads all registered producers and concatenates their metrics.
    pub async fn read_all(&self) -> Vec<Metric> {
        let mut metrics = Vec::new();
        for producer in self.producers() {
            metrics.extend(producer.read().await);
        }
        metrics
    }
}

fn same_producer(a: &Arc<dyn Producer>, b: &Arc<dyn Producer>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{Descriptor, MetricType};

    struct Fixed(&'static str);

    #[async_trait]
    impl Producer for Fixed {
        async fn read(&self) -> Vec<Metric> {
            vec![Metric {
                descriptor: Descriptor {
                    name: self.0.to_owned(),
                    description: String::new(),
                    unit: "1".to_owned(),
                    metric_type: MetricType::GaugeInt64,
                    label_keys: vec![],
                },
                resource: None,
                time_series: vec![crate::TimeSeries {
                    label_values: vec![],
                    points: vec![crate::Point::int64(Utc::now(), 1)],
                    start_time: None,
                }],
            }]
        }
    }

    #[tokio::test]
    async fn test_registry_deduplicates_by_identity() {
        let registry = ProducerRegistry::new();
        let a: Arc<dyn Producer> = Arc::new(Fixed("a"));
        let b: Arc<dyn Producer> = Arc::new(Fixed("b"));

        registry.add(a.clone());
        registry.add(a.clone());
        registry.add(b.clone());
        assert_eq!(registry.producers().len(), 2);

        let names: Vec<_> = registry
            .read_all()
            .await
            .into_iter()
            .map(|m| m.descriptor.name)
            .collect();
        assert_eq!(names, ["a", "b"]);

        registry.remove(&a);
        assert_eq!(registry.producers().len(), 1);
    }
}
