mod reed_solomon;

pub use reed_solomon::*;

use crate::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Integrity {
    /// Data did not require correction.
    Ok,
    /// Data was successfully corrected.
    Corrected,
    Uncorrectable,
}

/// Forward error correction applied to a frame with its sync marker removed.
pub trait IntegrityAlgorithm: Send + Sync {
    /// Check and correct `codeblock`, returning the status and the data with any check
    /// symbols removed.
    ///
    /// # Errors
    /// [Error::IntegrityAlgorithm] if `codeblock` cannot be handled by the algorithm.
    fn perform(&self, codeblock: &[u8]) -> Result<(Integrity, Vec<u8>)>;
}
