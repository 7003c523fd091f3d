use crate::constants::crypto::{AES_BLOCK_SIZE, AES_KEY_SIZE};
use crate::errors::AgentError;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

/// AES-256-CBC codec for command-set files.
///
/// File layout is `iv || ciphertext` with no authentication tag. Decryption
/// with the wrong key does not fail here: it produces bytes that are rejected
/// later when the plan is parsed.
#[derive(Clone)]
pub struct CommandSetCipher {
    key: [u8; AES_KEY_SIZE],
}

impl CommandSetCipher {
    /// Derives the key from the first 32 bytes of the orchestrator token.
    pub fn from_token(token: &str) -> Result<Self, AgentError> {
        let raw = token.as_bytes();
        if raw.len() < AES_KEY_SIZE {
            return Err(AgentError::config(format!(
                "Token is too short to derive the command-set key ({} bytes < {} bytes)",
                raw.len(),
                AES_KEY_SIZE
            ))
            .with_hint("Encrypted command sets require a token of at least 32 bytes."));
        }
        let mut key = [0u8; AES_KEY_SIZE];
        key.copy_from_slice(&raw[..AES_KEY_SIZE]);
        Ok(Self { key })
    }

    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, AgentError> {
        let usable = payload.len() - payload.len() % AES_BLOCK_SIZE;
        if usable < AES_BLOCK_SIZE {
            return Err(AgentError::config(format!(
                "Encrypted command set is too short ({} bytes)",
                payload.len()
            )));
        }
        let (iv, body) = payload[..usable].split_at(AES_BLOCK_SIZE);
        let decryptor = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|_| AgentError::internal("Invalid AES key or IV length"))?;
        let mut plaintext = decryptor
            .decrypt_padded_vec_mut::<NoPadding>(body)
            .map_err(|_| AgentError::internal("Failed to decrypt command set"))?;
        strip_pkcs7(&mut plaintext);
        Ok(plaintext)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let iv = uuid::Uuid::new_v4().into_bytes();
        self.encrypt_with_iv(plaintext, &iv)
    }

    pub fn encrypt_with_iv(&self, plaintext: &[u8], iv: &[u8; AES_BLOCK_SIZE]) -> Vec<u8> {
        let encryptor = Aes256CbcEnc::new(&self.key.into(), &(*iv).into());
        let body = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        let mut out = Vec::with_capacity(iv.len() + body.len());
        out.extend_from_slice(iv);
        out.extend_from_slice(&body);
        out
    }
}

/// Drops PKCS#7 padding only when it is well formed; anything else is kept
/// as-is so garbage surfaces at JSON parse time instead of here.
fn strip_pkcs7(plaintext: &mut Vec<u8>) {
    let Some(&last) = plaintext.last() else {
        return;
    };
    let pad = last as usize;
    if pad == 0 || pad > AES_BLOCK_SIZE || pad > plaintext.len() {
        return;
    }
    let start = plaintext.len() - pad;
    if plaintext[start..].iter().all(|b| *b == last) {
        plaintext.truncate(start);
    }
}
