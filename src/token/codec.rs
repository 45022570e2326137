//! Шифрованный контейнер полезной нагрузки.
//!
//! payload → JSON → ChaCha20-Poly1305 → base64url(nonce || ciphertext).
//! Расшифровка fail closed: любой дефект входа даёт `TokenError::Invalid`,
//! частичных ответов не бывает.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

use super::payload::TokenPayload;
use super::TokenError;

const NONCE_LEN: usize = 12;

/// Растягивает операторский секрет произвольной длины в 32-байтовый ключ
/// повторением и усечением. Детерминированно, но криптографически слабо при
/// коротком секрете — поведение сохранено намеренно, см. тесты.
fn stretch_key(secret: &str) -> [u8; 32] {
    let raw = secret.as_bytes();
    let mut key = [0u8; 32];
    if raw.is_empty() {
        return key;
    }
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = raw[i % raw.len()];
    }
    key
}

pub struct TokenCodec {
    cipher: ChaCha20Poly1305,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        let key_bytes = stretch_key(secret);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));
        Self { cipher }
    }

    pub fn encode(&self, payload: &TokenPayload) -> Result<String, TokenError> {
        let plaintext = serde_json::to_vec(payload).map_err(|_| TokenError::Encode)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|_| TokenError::Encode)?;

        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&nonce_bytes);
        raw.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    pub fn decode(&self, token: &str) -> Result<TokenPayload, TokenError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|_| TokenError::Invalid)?;
        if raw.len() <= NONCE_LEN {
            return Err(TokenError::Invalid);
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| TokenError::Invalid)?;

        serde_json::from_slice(&plaintext).map_err(|_| TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payloads() -> Vec<TokenPayload> {
        vec![
            TokenPayload::Verify {
                user_id: 1001,
                file_id: Some("BQACAgUAA".to_string()),
                post_no: Some(3),
            },
            TokenPayload::Verified {
                user_id: 1001,
                file_id: None,
                post_no: None,
            },
            TokenPayload::Bypass {
                user_id: -5,
                file_id: None,
                post_no: Some(0),
            },
            TokenPayload::FileGet {
                file_id: "AAQC".to_string(),
                post_no: 42,
            },
            TokenPayload::ClickHere {
                file_id: "AAQC".to_string(),
                post_no: 42,
            },
        ]
    }

    #[test]
    fn roundtrip_is_lossless_for_all_payload_shapes() {
        let codec = TokenCodec::new("operator-secret");
        for payload in sample_payloads() {
            let token = codec.encode(&payload).unwrap();
            assert_eq!(codec.decode(&token).unwrap(), payload);
        }
    }

    #[test]
    fn token_is_url_safe() {
        let codec = TokenCodec::new("operator-secret");
        let token = codec
            .encode(&TokenPayload::FileGet {
                file_id: "x".repeat(80),
                post_no: 1,
            })
            .unwrap();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn any_flipped_byte_fails_closed() {
        let codec = TokenCodec::new("operator-secret");
        let token = codec
            .encode(&TokenPayload::Verify {
                user_id: 7,
                file_id: None,
                post_no: None,
            })
            .unwrap();
        let raw = URL_SAFE_NO_PAD.decode(token.as_bytes()).unwrap();
        for i in 0..raw.len() {
            let mut mutated = raw.clone();
            mutated[i] ^= 0x01;
            let mutated_token = URL_SAFE_NO_PAD.encode(&mutated);
            assert_eq!(codec.decode(&mutated_token), Err(TokenError::Invalid));
        }
    }

    #[test]
    fn wrong_key_fails_closed() {
        let codec = TokenCodec::new("operator-secret");
        let other = TokenCodec::new("another-secret");
        let token = codec
            .encode(&TokenPayload::Verify {
                user_id: 7,
                file_id: None,
                post_no: None,
            })
            .unwrap();
        assert_eq!(other.decode(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_input_fails_closed() {
        let codec = TokenCodec::new("operator-secret");
        for garbage in ["", "a", "!!!не base64!!!", "AAAA", &"A".repeat(13)] {
            assert_eq!(codec.decode(garbage), Err(TokenError::Invalid));
        }
    }

    #[test]
    fn short_secret_key_stretching_is_deterministic() {
        // Известное ослабление: короткий секрет растягивается повторением,
        // а не KDF. Два процесса с одинаковым коротким секретом обязаны
        // получать один и тот же ключ — на этом держится межпроцессная
        // проверка токенов.
        assert_eq!(stretch_key("ab"), stretch_key("ab"));
        let key = stretch_key("ab");
        assert_eq!(&key[..4], b"abab");

        let codec_a = TokenCodec::new("ab");
        let codec_b = TokenCodec::new("ab");
        let token = codec_a
            .encode(&TokenPayload::Verify {
                user_id: 1,
                file_id: None,
                post_no: None,
            })
            .unwrap();
        assert!(codec_b.decode(&token).is_ok());
    }

    #[test]
    fn long_secret_is_truncated_to_key_length() {
        let long = "x".repeat(100);
        assert_eq!(stretch_key(&long), stretch_key(&long[..32]));
    }
}
