//! Inbound event authenticity port.

/// Verifies that a raw event body was sent by the processor.
pub trait SignatureVerifier: Send + Sync + 'static {
    /// `signature` is the raw signature header value.
    fn verify(&self, payload: &[u8], signature: &str) -> bool;
}
