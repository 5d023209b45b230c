//! Prometheus metrics for the registry relayer

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref BLOCKS_SCANNED: IntCounter = register_int_counter!(
        "registry_relayer_blocks_scanned_total",
        "Total number of PaymentManager blocks scanned"
    ).unwrap();

    pub static ref SCANNED_BLOCK: IntGauge = register_int_gauge!(
        "registry_relayer_scanned_block",
        "Last PaymentManager block scanned, checkpointed or not"
    ).unwrap();

    pub static ref POLLS_COMPLETED: IntCounter = register_int_counter!(
        "registry_relayer_polls_completed_total",
        "Polls finished without error"
    ).unwrap();

    pub static ref CHECKPOINT_BLOCK: IntGauge = register_int_gauge!(
        "registry_relayer_checkpoint_block",
        "Last block written to RemoteBridge.setLastBlock"
    ).unwrap();

    pub static ref TRANSFERS_MIRRORED: IntCounterVec = register_int_counter_vec!(
        "registry_relayer_transfers_mirrored_total",
        "Transfers mirrored into RemoteBridge",
        &["action"]
    ).unwrap();

    pub static ref TRANSFERS_SKIPPED: IntCounterVec = register_int_counter_vec!(
        "registry_relayer_transfers_skipped_total",
        "Mirror calls skipped because RemoteBridge already reflected them",
        &["reason"]
    ).unwrap();

    pub static ref POLL_ERRORS: IntCounter = register_int_counter!(
        "registry_relayer_poll_errors_total",
        "Polls aborted by an error"
    ).unwrap();
}

/// Encode every registered metric in the Prometheus text format.
/// Returns the content type alongside the body.
pub fn encode() -> prometheus::Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_registered_metrics() {
        BLOCKS_SCANNED.inc_by(0);
        TRANSFERS_MIRRORED.with_label_values(&["register"]).inc_by(0);

        let (content_type, body) = encode().unwrap();
        assert!(content_type.starts_with("text/plain"));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("registry_relayer_blocks_scanned_total"));
        assert!(text.contains("action=\"register\""));
    }
}
