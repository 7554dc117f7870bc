use crate::locator::LocatorError;
use crate::types::Region;
use thiserror::Error;

/// Stage-level failures. Every variant except `Locator` is a contract
/// violation between stages and indicates a defect, not bad user input.
#[derive(Error, Debug)]
pub enum SwapError {
    #[error("region {region:?} is not contained in the {width}x{height} image")]
    InvalidRegion {
        region: Region,
        width: u32,
        height: u32,
    },
    #[error("dimension mismatch: {what} is {actual:?}, target region is {expected:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("locator: {0}")]
    Locator(#[from] LocatorError),
}
