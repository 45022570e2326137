//! Подпись входящего поколения токенов.
//!
//! Redirect-сервер заворачивает свой ответ в HMAC-конверт поверх уже
//! зашифрованного токена. Бот принимает verified/bypass только в конверте,
//! поэтому исходящий verify-токен нельзя предъявить как ответ сервера, хотя
//! оба слоя используют один и тот же кодек.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// Доменная добавка отделяет ключ подписи от ключа шифрования: оба
/// выводятся из одного операторского секрета.
const SIGNING_DOMAIN: &[u8] = b"/filegate-return-signer/v1";

pub struct TokenSigner {
    key: [u8; 32],
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.update(SIGNING_DOMAIN);
        let key: [u8; 32] = hasher.finalize().into();
        Self { key }
    }

    fn mac(&self, token: &str) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("HMAC принимает ключ любой длины"));
        mac.update(token.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// `токен` → `токен.подпись`.
    pub fn pack(&self, token: &str) -> String {
        let signature = URL_SAFE_NO_PAD.encode(self.mac(token));
        format!("{}.{}", token, signature)
    }

    /// Проверяет конверт и возвращает внутренний токен. Сравнение подписи
    /// константное по времени (`Mac::verify_slice`).
    pub fn unpack(&self, signed: &str) -> Result<String, TokenError> {
        let (token, signature_b64) = signed.rsplit_once('.').ok_or(TokenError::Invalid)?;
        if token.is_empty() {
            return Err(TokenError::Invalid);
        }
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64.as_bytes())
            .map_err(|_| TokenError::Invalid)?;

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("HMAC принимает ключ любой длины"));
        mac.update(token.as_bytes());
        mac.verify_slice(&signature).map_err(|_| TokenError::Invalid)?;

        Ok(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        let signer = TokenSigner::new("operator-secret");
        let token = "abcDEF123_-";
        let signed = signer.pack(token);
        assert_eq!(signer.unpack(&signed).unwrap(), token);
    }

    #[test]
    fn unsigned_token_is_not_accepted() {
        // Ключевое свойство поколений: «голый» токен кодека не проходит
        // там, где ждут конверт redirect-сервера.
        let signer = TokenSigner::new("operator-secret");
        assert_eq!(signer.unpack("abcDEF123_-"), Err(TokenError::Invalid));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let signer = TokenSigner::new("operator-secret");
        let mut signed = signer.pack("token-body");
        signed.pop();
        signed.push('A');
        assert_eq!(signer.unpack(&signed), Err(TokenError::Invalid));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let signer = TokenSigner::new("operator-secret");
        let signed = signer.pack("token-body");
        let forged = signed.replacen("token-body", "token-bodz", 1);
        assert_eq!(signer.unpack(&forged), Err(TokenError::Invalid));
    }

    #[test]
    fn foreign_key_signature_is_rejected() {
        let ours = TokenSigner::new("operator-secret");
        let theirs = TokenSigner::new("other-secret");
        let signed = theirs.pack("token-body");
        assert_eq!(ours.unpack(&signed), Err(TokenError::Invalid));
    }

    #[test]
    fn empty_body_is_rejected() {
        let signer = TokenSigner::new("operator-secret");
        let signed = signer.pack("");
        assert_eq!(signer.unpack(&signed), Err(TokenError::Invalid));
    }
}
