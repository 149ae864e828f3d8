use kestrel_pool_api::{AdmissionReason, AdmissionResult};

use crate::error::ErrorCode;
use crate::protos::{AdmissionStatus, BroadcastTxResponse};

impl From<AdmissionReason> for AdmissionStatus {
    fn from(reason: AdmissionReason) -> Self {
        match reason {
            AdmissionReason::Accepted => Self::Accepted,
            AdmissionReason::Duplicate => Self::Duplicate,
            AdmissionReason::Full => Self::Full,
        }
    }
}

impl From<AdmissionResult> for BroadcastTxResponse {
    fn from(result: AdmissionResult) -> Self {
        let log = match result.reason {
            AdmissionReason::Accepted => String::new(),
            AdmissionReason::Duplicate => "transaction already in the pool or recently seen".into(),
            AdmissionReason::Full => "transaction pool is full".into(),
        };

        Self {
            code: ErrorCode::from(result.reason).code(),
            hash: result.hash.to_vec(),
            status: AdmissionStatus::from(result.reason) as i32,
            queue_position: result.queue_position,
            log,
        }
    }
}
