//! Ordered batches of tasks.

use async_trait::async_trait;
use narragraph_core::TaskError;
use tracing::{debug, warn};

use crate::task::PromptTask;

/// Boxed task producing `O`.
pub type BoxedTask<O> = Box<dyn PromptTask<Output = O>>;

/// Runs tasks strictly one after another.
///
/// Task `i + 1` is not started until task `i` has settled, and results come
/// back in input order. The first failure aborts the batch: later tasks are
/// never started and effects of earlier tasks are left in place.
pub struct BatchTask<O> {
    tasks: Vec<BoxedTask<O>>,
}

impl<O: Send + 'static> BatchTask<O> {
    pub fn new(tasks: Vec<BoxedTask<O>>) -> Self {
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<O: Send + 'static> FromIterator<BoxedTask<O>> for BatchTask<O> {
    fn from_iter<I: IntoIterator<Item = BoxedTask<O>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[async_trait]
impl<O: Send + 'static> PromptTask for BatchTask<O> {
    type Output = Vec<O>;

    async fn execute(&self) -> Result<Vec<O>, TaskError> {
        let mut results = Vec::with_capacity(self.tasks.len());
        for (index, task) in self.tasks.iter().enumerate() {
            match task.execute().await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(index, total = self.tasks.len(), error = %e, "Batch aborted");
                    return Err(e);
                }
            }
        }
        debug!(tasks = results.len(), "Batch finished");
        Ok(results)
    }
}
