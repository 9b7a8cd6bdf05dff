//! Frame coder seam.
//!
//! The handshake produces the connection-scoped cipher and MAC state; the
//! session only needs it as something that seals and opens whole plain
//! blocks. Ingress and egress state advance independently, so both methods
//! take `&mut self` and the session calls them from its actor task only.

use bytes::Bytes;

use crate::error::{Result, SessionError};

/// Encrypts outbound plain blocks and authenticates/decrypts inbound ones.
pub trait FrameCoder: Send + 'static {
    /// Seal one plain block.
    fn encrypt(&mut self, plain: &[u8]) -> Result<Bytes>;

    /// Open one sealed block.
    ///
    /// Must return [`SessionError::Auth`] when integrity verification fails.
    fn decrypt(&mut self, sealed: &[u8]) -> Result<Bytes>;
}

/// Identity coder: blocks travel as-is.
///
/// Used when the transport is already encrypted and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCoder;

impl PlainCoder {
    /// Create a new identity coder.
    pub fn new() -> Self {
        Self
    }
}

impl FrameCoder for PlainCoder {
    #[inline]
    fn encrypt(&mut self, plain: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(plain))
    }

    #[inline]
    fn decrypt(&mut self, sealed: &[u8]) -> Result<Bytes> {
        if sealed.is_empty() {
            return Err(SessionError::Auth("empty sealed block".to_string()));
        }
        Ok(Bytes::copy_from_slice(sealed))
    }
}

impl<C: FrameCoder + ?Sized> FrameCoder for Box<C> {
    fn encrypt(&mut self, plain: &[u8]) -> Result<Bytes> {
        (**self).encrypt(plain)
    }

    fn decrypt(&mut self, sealed: &[u8]) -> Result<Bytes> {
        (**self).decrypt(sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_round_trip() {
        let mut coder = PlainCoder::new();
        let data: Vec<u8> = (0..=255).collect();

        let sealed = coder.encrypt(&data).unwrap();
        assert_eq!(&sealed[..], &data[..]);
        assert_eq!(&coder.decrypt(&sealed).unwrap()[..], &data[..]);
    }

    #[test]
    fn test_plain_rejects_empty_block() {
        let mut coder = PlainCoder::new();
        let result = coder.decrypt(&[]);
        assert!(matches!(result, Err(SessionError::Auth(_))));
    }

    #[test]
    fn test_boxed_coder_delegates() {
        let mut coder: Box<dyn FrameCoder> = Box::new(PlainCoder::new());
        let sealed = coder.encrypt(b"boxed").unwrap();
        assert_eq!(&coder.decrypt(&sealed).unwrap()[..], b"boxed");
    }
}
