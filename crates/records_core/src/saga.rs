//! Multi-store writes with compensation.
//!
//! Each step registers its undo action at the moment it succeeds, so the
//! rollback order lives next to the forward order. There is no shared
//! transaction: a failed step triggers the compensations of the steps before
//! it, newest first, and each compensation is best-effort.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use crate::best_effort;
use crate::error::StoreError;

pub type Compensation<'a> = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

pub struct Saga<'a> {
    name: &'static str,
    undo: Vec<(&'static str, Compensation<'a>)>,
}

impl<'a> Saga<'a> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            undo: Vec::new(),
        }
    }

    /// Runs `action`. On success `compensate` is called with the step's
    /// output to build its undo action; on failure every earlier step is
    /// compensated and the original error is returned.
    pub async fn step<T, F, C>(
        &mut self,
        label: &'static str,
        action: F,
        compensate: C,
    ) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
        C: FnOnce(&T) -> Compensation<'a>,
    {
        match action.await {
            Ok(value) => {
                self.undo.push((label, compensate(&value)));
                Ok(value)
            }
            Err(err) => {
                warn!(saga = self.name, step = label, error = %err, "saga step failed, compensating");
                self.rollback().await;
                Err(err)
            }
        }
    }

    /// Runs a final step that needs no undo of its own.
    pub async fn finish<T, F>(mut self, label: &'static str, action: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match action.await {
            Ok(value) => {
                debug!(saga = self.name, steps = self.undo.len() + 1, "saga committed");
                self.undo.clear();
                Ok(value)
            }
            Err(err) => {
                warn!(saga = self.name, step = label, error = %err, "saga step failed, compensating");
                self.rollback().await;
                Err(err)
            }
        }
    }

    async fn rollback(&mut self) {
        while let Some((label, undo)) = self.undo.pop() {
            if best_effort::absorb(label, undo).await.is_some() {
                debug!(saga = self.name, step = label, "compensated");
            }
        }
    }
}
