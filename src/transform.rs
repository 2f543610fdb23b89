//! Composable transforms applied to fetched content before persistence
//!
//! The fetch pipeline is explicit: the scheduler invokes each configured
//! [`FetchTransform`] in order on the raw response body and persists the
//! final output. There are no implicit hooks; adding a processing stage
//! means adding a transform to the chain at construction time.

use crate::error::Result;
use std::sync::Arc;

/// A single content transformation stage
///
/// Implementations must be cheap to share across workers. A transform
/// failure is terminal for the document being processed: the bytes came
/// through intact, so retrying the fetch would only reproduce the failure.
pub trait FetchTransform: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Transform the content, consuming the input
    fn apply(&self, bytes: Vec<u8>) -> Result<Vec<u8>>;
}

/// Transform that returns its input unchanged
///
/// Useful as an explicit placeholder in configurations that declare a chain.
pub struct IdentityTransform;

impl FetchTransform for IdentityTransform {
    fn name(&self) -> &str {
        "identity"
    }

    fn apply(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        Ok(bytes)
    }
}

/// Run `bytes` through every transform in order
pub fn apply_chain(transforms: &[Arc<dyn FetchTransform>], bytes: Vec<u8>) -> Result<Vec<u8>> {
    let mut current = bytes;
    for transform in transforms {
        tracing::trace!(transform = transform.name(), "Applying transform");
        current = transform.apply(current)?;
    }
    Ok(current)
}
