//! Fatal run outcomes.
//!
//! Only these two conditions abort a feasibility run; every other failure is
//! folded into the context as a warning plus `RISK_DATA_INCOMPLETE`.
use crate::context::RejectReason;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParcelError {
    #[error("parcel {parcel_id} not found in source chain")]
    NotFound { parcel_id: String },
    #[error("parcel {parcel_id} appears inside incorporated jurisdiction {jurisdiction}")]
    Incorporated {
        parcel_id: String,
        jurisdiction: String,
    },
}

impl ParcelError {
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            ParcelError::NotFound { .. } => RejectReason::NotFound,
            ParcelError::Incorporated { .. } => RejectReason::IncorporatedCity,
        }
    }
}
