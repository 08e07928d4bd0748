use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::MockSensorConfig;
use crate::sensor::{ProbeSample, SensorProbe};

/// Probe returning whatever a test last scripted.
pub struct MockProbe {
    sample: Mutex<ProbeSample>,
}

impl MockProbe {
    pub fn new(config: MockSensorConfig) -> Self {
        Self {
            sample: Mutex::new(ProbeSample {
                temperature: config.temperature,
                humidity: config.humidity,
                pressure: config.pressure,
                vcc: config.vcc,
            }),
        }
    }

    pub fn set_sample(&self, sample: ProbeSample) {
        *self.sample.lock() = sample;
    }
}

#[async_trait]
impl SensorProbe for MockProbe {
    async fn sample(&self) -> ProbeSample {
        *self.sample.lock()
    }
}
