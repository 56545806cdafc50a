use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::{EvaluationError, EvaluationResult};
use super::repository::RunRepository;
use super::types::{EvaluationRun, ScoreBlob};

/// [`RunRepository`] backed by a map.
#[derive(Default)]
pub struct InMemoryRunRepository {
    runs: Mutex<HashMap<String, EvaluationRun>>,
    writes: Mutex<usize>,
    fail_writes: Mutex<bool>,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, run: EvaluationRun) {
        self.runs.lock().insert(run.id.clone(), run);
    }

    pub fn run(&self, run_id: &str) -> Option<EvaluationRun> {
        self.runs.lock().get(run_id).cloned()
    }

    /// Number of successful `save_run`/`save_score` calls.
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    fn check_writable(&self) -> EvaluationResult<()> {
        if *self.fail_writes.lock() {
            return Err(EvaluationError::Storage("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn get_run(&self, run_id: &str) -> EvaluationResult<Option<EvaluationRun>> {
        Ok(self.run(run_id))
    }

    async fn save_run(&self, run: &EvaluationRun) -> EvaluationResult<()> {
        self.check_writable()?;
        self.runs.lock().insert(run.id.clone(), run.clone());
        *self.writes.lock() += 1;
        Ok(())
    }

    async fn save_score(&self, run_id: &str, score: ScoreBlob) -> EvaluationResult<EvaluationRun> {
        self.check_writable()?;
        let mut runs = self.runs.lock();
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| EvaluationError::RunNotFound {
                run_id: run_id.to_string(),
            })?;
        run.score = Some(score);
        let updated = run.clone();
        drop(runs);

        *self.writes.lock() += 1;
        Ok(updated)
    }
}
