//! Builder for configuring bucket instances

use std::sync::Arc;
use std::time::Duration;

use super::Bucket;
use crate::config::EngineConfig;
use crate::pump::PumpOptions;
use crate::store::{ObjectStore, TimeoutStore};
use crate::stream::DEFAULT_MAX_BUFFER;
use crate::{Result, SpillwayError};

/// Builder for configuring bucket instances.
///
/// Validation happens in [`build`](Self::build), so a bucket that exists is
/// always usable.
pub struct BucketBuilder {
    store: Option<Arc<dyn ObjectStore>>,
    pump: PumpOptions,
    max_buffer: usize,
}

impl Default for BucketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            pump: PumpOptions::default(),
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }

    /// The store every pump of this bucket talks to.
    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Apply pump and stream settings from a loaded configuration.
    pub fn config(mut self, config: &EngineConfig) -> Self {
        self.pump = config.pump_options();
        self.max_buffer = config.stream.max_buffer;
        self
    }

    pub fn pump_options(mut self, options: PumpOptions) -> Self {
        self.pump = options;
        self
    }

    /// Units of work in flight per pump (default: 10).
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.pump.concurrency = concurrency;
        self
    }

    /// Poll delay while an output is paused or an input is idle (default: 1s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.pump.poll_interval = interval;
        self
    }

    /// Deadline for each store call (default: none).
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.pump.call_timeout = Some(timeout);
        self
    }

    /// High-water mark for outputs created by the convenience helpers
    /// (default: 50,000).
    pub fn max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    /// Build the bucket, failing fast on missing or invalid configuration.
    pub fn build(self) -> Result<Bucket> {
        let store = self.store.ok_or(SpillwayError::NoStore)?;
        self.pump.validate()?;
        if self.max_buffer == 0 {
            return Err(SpillwayError::Configuration(
                "max_buffer must be at least 1".to_string(),
            ));
        }

        let store = match self.pump.call_timeout {
            Some(timeout) => Arc::new(TimeoutStore::new(store, timeout)) as Arc<dyn ObjectStore>,
            None => store,
        };

        Ok(Bucket {
            store,
            pump: self.pump,
            max_buffer: self.max_buffer,
        })
    }
}
