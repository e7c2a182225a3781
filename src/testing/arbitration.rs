use std::sync::Mutex;

use crate::services::{ArbitrationRepository, Arbitrator};

pub struct StaticArbitrationRepository {
    default: Mutex<Option<Arbitrator>>,
}

impl StaticArbitrationRepository {
    pub fn new(default: Option<Arbitrator>) -> Self {
        Self {
            default: Mutex::new(default),
        }
    }

    pub fn set_default(&self, default: Option<Arbitrator>) {
        match self.default.lock() {
            Ok(mut current) => *current = default,
            Err(poisoned) => *poisoned.into_inner() = default,
        }
    }
}

impl ArbitrationRepository for StaticArbitrationRepository {
    fn default_arbitrator(&self) -> Option<Arbitrator> {
        match self.default.lock() {
            Ok(current) => current.to_owned(),
            Err(poisoned) => poisoned.into_inner().to_owned(),
        }
    }
}
