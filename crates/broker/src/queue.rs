use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The three durable queues, each with an implicit DLQ companion (`dead`
/// message status on the same table, not a separate one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Queue {
    TaskSync,
    TaskEval,
    TaskImpl,
}

impl Queue {
    /// Prefetch caps: sync=10, eval=5, impl=3.
    pub fn prefetch(self) -> u32 {
        match self {
            Queue::TaskSync => 10,
            Queue::TaskEval => 5,
            Queue::TaskImpl => 3,
        }
    }
}

pub const MAX_RETRIES: i64 = 3;
