//! Content-addressed cache of compiled plans.
//!
//! Keys are the SHA-256 of the entry rules text. Fragment libraries are
//! not part of the key: a host that edits libraries in place calls
//! [`PlanCache::clear`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use acv_core::error::Diagnostic;
use acv_core::plan::CompiledPlan;
use acv_core::source::FragmentSource;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `text`.
pub fn digest(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Shared by every conversion a host runs. Two threads missing on the
/// same rules both compile; the second insert wins and both plans are
/// equivalent.
#[derive(Debug, Default)]
pub struct PlanCache {
    plans: RwLock<HashMap<String, Arc<CompiledPlan>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        PlanCache::default()
    }

    /// The cached plan for `text`, compiling it on a miss. Rules that do
    /// not compile are not cached.
    pub fn get_or_compile(
        &self,
        text: &str,
        source: &dyn FragmentSource,
    ) -> Result<Arc<CompiledPlan>, Vec<Diagnostic>> {
        let key = digest(text);
        if let Some(plan) = self.get(&key) {
            return Ok(plan);
        }
        tracing::debug!(digest = %key, "plan cache miss");
        let plan = Arc::new(acv_core::compile(text, source)?);
        self.plans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&plan));
        Ok(plan)
    }

    /// Look up a plan by digest.
    pub fn get(&self, digest: &str) -> Option<Arc<CompiledPlan>> {
        self.plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(digest)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.plans.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.plans.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
