//! Signer capability
//!
//! The gateway only needs something that turns a payload into a signature.
//! Key management and the signature scheme live outside this crate.

/// Produces a signature over a byte payload
pub trait Signer: Send + Sync {
    fn sign(&self, payload: &[u8]) -> Vec<u8>;
}

impl<F> Signer for F
where
    F: Fn(&[u8]) -> Vec<u8> + Send + Sync,
{
    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self(payload)
    }
}
