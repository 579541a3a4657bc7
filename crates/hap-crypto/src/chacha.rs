//! ChaCha20-Poly1305 AEAD for pairing payloads and the session record layer.

use hap_core::error::CryptoError;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use zeroize::ZeroizeOnDrop;

/// Largest plaintext carried by one record.
pub const MAX_FRAME_LEN: usize = 0x400;

/// Poly1305 tag length.
pub const TAG_LEN: usize = 16;

/// Record layer cipher for a verified HAP session.
///
/// Each record is `[u16_le len][ciphertext][16-byte tag]` with the length
/// bytes as AAD. Every direction has its own key and a nonce counter that
/// starts at zero.
#[derive(ZeroizeOnDrop)]
pub struct SessionCipher {
    encrypt_key: [u8; 32],
    decrypt_key: [u8; 32],
    #[zeroize(skip)]
    encrypt_cipher: ChaCha20Poly1305,
    #[zeroize(skip)]
    decrypt_cipher: ChaCha20Poly1305,
    #[zeroize(skip)]
    encrypt_counter: u64,
    #[zeroize(skip)]
    decrypt_counter: u64,
}

impl SessionCipher {
    /// Create cipher with separate keys per direction.
    pub fn new(encrypt_key: [u8; 32], decrypt_key: [u8; 32]) -> Self {
        Self {
            encrypt_cipher: ChaCha20Poly1305::new(&encrypt_key.into()),
            decrypt_cipher: ChaCha20Poly1305::new(&decrypt_key.into()),
            encrypt_key,
            decrypt_key,
            encrypt_counter: 0,
            decrypt_counter: 0,
        }
    }

    /// Encrypt plaintext into one or more records.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plaintext.is_empty() {
            return Err(CryptoError::Encryption("Nothing to seal".to_string()));
        }

        let mut out = Vec::with_capacity(
            plaintext.len() + (plaintext.len() / MAX_FRAME_LEN + 1) * (2 + TAG_LEN),
        );

        for block in plaintext.chunks(MAX_FRAME_LEN) {
            let aad = (block.len() as u16).to_le_bytes();
            let nonce = nonce_from_counter(self.encrypt_counter);

            let sealed = self
                .encrypt_cipher
                .encrypt(Nonce::from_slice(&nonce), Payload { msg: block, aad: &aad })
                .map_err(|e| CryptoError::Encryption(e.to_string()))?;

            out.extend_from_slice(&aad);
            out.extend_from_slice(&sealed);
            self.encrypt_counter += 1;
        }

        Ok(out)
    }

    /// Decrypt every complete record at the front of `buffer`.
    ///
    /// Returns the plaintext and the number of bytes consumed. A trailing
    /// partial record is left for the next read.
    pub fn decrypt(&mut self, buffer: &[u8]) -> Result<(Vec<u8>, usize), CryptoError> {
        let mut out = Vec::new();
        let mut offset = 0;

        while buffer.len() - offset >= 2 {
            let block_len = u16::from_le_bytes([buffer[offset], buffer[offset + 1]]);
            if block_len as usize > MAX_FRAME_LEN {
                return Err(CryptoError::Decryption(format!(
                    "Record length {} exceeds maximum",
                    block_len
                )));
            }

            let block_end = offset + 2 + block_len as usize + TAG_LEN;
            if block_end > buffer.len() {
                break;
            }

            let aad = block_len.to_le_bytes();
            let nonce = nonce_from_counter(self.decrypt_counter);
            let plaintext = self
                .decrypt_cipher
                .decrypt(
                    Nonce::from_slice(&nonce),
                    Payload {
                        msg: &buffer[offset + 2..block_end],
                        aad: &aad,
                    },
                )
                .map_err(|_| CryptoError::AuthTagMismatch)?;

            out.extend_from_slice(&plaintext);
            self.decrypt_counter += 1;
            offset = block_end;
        }

        Ok((out, offset))
    }

    pub fn encrypt_counter(&self) -> u64 {
        self.encrypt_counter
    }

    pub fn decrypt_counter(&self) -> u64 {
        self.decrypt_counter
    }
}

/// Record nonce: four zero bytes then the little endian counter.
fn nonce_from_counter(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..12].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Seal a pairing payload under a fixed nonce such as `PS-Msg05`.
///
/// The tag is appended to the ciphertext.
pub fn encrypt_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 12],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::Encryption(format!("Invalid key: {}", e)))?;

    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// Open a sealed pairing payload.
///
pub fn decrypt_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::Decryption(
            format!("{} bytes cannot hold a tag", ciphertext.len()),
        ));
    }

    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::Decryption(format!("Invalid key: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthTagMismatch)
}

/// Pairing nonce: the label right aligned in twelve bytes.
///
/// "PV-Msg02" becomes `\x00\x00\x00\x00PV-Msg02`.
pub fn nonce_from_string(s: &[u8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    let len = s.len().min(12);
    nonce[12 - len..].copy_from_slice(&s[..len]);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (SessionCipher, SessionCipher) {
        let a = [0x42u8; 32];
        let b = [0x24u8; 32];
        // Accessory encrypts with `a`, controller decrypts with `a`.
        (SessionCipher::new(a, b), SessionCipher::new(b, a))
    }

    mod session_cipher {
        use super::*;

        #[test]
        fn roundtrip_single_record() {
            let (mut accessory, mut controller) = pair();

            let sealed = accessory.encrypt(b"HTTP/1.1 200 OK\r\n\r\n").unwrap();
            assert_eq!(sealed.len(), 2 + 19 + TAG_LEN);
            assert_eq!(u16::from_le_bytes([sealed[0], sealed[1]]), 19);

            let (plain, consumed) = controller.decrypt(&sealed).unwrap();
            assert_eq!(plain, b"HTTP/1.1 200 OK\r\n\r\n");
            assert_eq!(consumed, sealed.len());
        }

        #[test]
        fn large_payload_is_split() {
            let (mut accessory, mut controller) = pair();
            let payload = vec![0x5Au8; MAX_FRAME_LEN * 2 + 10];

            let sealed = accessory.encrypt(&payload).unwrap();
            assert_eq!(accessory.encrypt_counter(), 3);

            let (plain, _) = controller.decrypt(&sealed).unwrap();
            assert_eq!(plain, payload);
            assert_eq!(controller.decrypt_counter(), 3);
        }

        #[test]
        fn partial_record_is_left_in_buffer() {
            let (mut accessory, mut controller) = pair();
            let first = accessory.encrypt(b"first").unwrap();
            let second = accessory.encrypt(b"second").unwrap();

            let mut buffer = first.clone();
            buffer.extend_from_slice(&second[..5]);

            let (plain, consumed) = controller.decrypt(&buffer).unwrap();
            assert_eq!(plain, b"first");
            assert_eq!(consumed, first.len());

            let (plain, _) = controller.decrypt(&second).unwrap();
            assert_eq!(plain, b"second");
        }

        #[test]
        fn tampered_tag_is_rejected() {
            let (mut accessory, mut controller) = pair();
            let mut sealed = accessory.encrypt(b"secret").unwrap();
            let last = sealed.len() - 1;
            sealed[last] ^= 0xFF;

            assert!(matches!(
                controller.decrypt(&sealed),
                Err(CryptoError::AuthTagMismatch)
            ));
        }

        #[test]
        fn empty_plaintext_is_rejected() {
            let (mut accessory, _) = pair();
            assert!(accessory.encrypt(&[]).is_err());
        }
    }

    mod explicit_nonce {
        use super::*;

        #[test]
        fn nonce_from_string_right_aligns() {
            let nonce = nonce_from_string(b"PS-Msg05");
            assert_eq!(&nonce[..4], &[0, 0, 0, 0]);
            assert_eq!(&nonce[4..], b"PS-Msg05");
        }

        #[test]
        fn roundtrip_with_nonce() {
            let key = [0x11u8; 32];
            let nonce = nonce_from_string(b"PV-Msg02");

            let sealed = encrypt_with_nonce(&key, &nonce, b"sub tlv").unwrap();
            assert_eq!(sealed.len(), 7 + TAG_LEN);
            assert_eq!(decrypt_with_nonce(&key, &nonce, &sealed).unwrap(), b"sub tlv");
        }

        #[test]
        fn wrong_nonce_fails() {
            let key = [0x11u8; 32];
            let sealed = encrypt_with_nonce(&key, &nonce_from_string(b"PS-Msg05"), b"x").unwrap();
            assert!(decrypt_with_nonce(&key, &nonce_from_string(b"PS-Msg06"), &sealed).is_err());
        }

        #[test]
        fn short_ciphertext_fails() {
            assert!(decrypt_with_nonce(&[0u8; 32], &[0u8; 12], &[0u8; 8]).is_err());
        }
    }
}
