//! Формы полезной нагрузки токенов.
//!
//! Каждый поток протокола несёт свой вариант: проверка обязательных полей
//! происходит на уровне типа, а не по наличию ключей в словаре. Токен,
//! расшифровавшийся в «не тот» вариант, для потребителя неотличим от
//! порченого.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenPayload {
    /// Исходящий токен: бот отправляет пользователя на redirect-сервер.
    Verify {
        user_id: i64,
        #[serde(default)]
        file_id: Option<String>,
        #[serde(default)]
        post_no: Option<i64>,
    },
    /// Входящий токен: redirect-сервер подтвердил прохождение.
    Verified {
        user_id: i64,
        #[serde(default)]
        file_id: Option<String>,
        #[serde(default)]
        post_no: Option<i64>,
    },
    /// Входящий токен: визита не было, пользователь обошёл шортлинк.
    Bypass {
        user_id: i64,
        #[serde(default)]
        file_id: Option<String>,
        #[serde(default)]
        post_no: Option<i64>,
    },
    /// Публичная ссылка на скачивание файла.
    FileGet { file_id: String, post_no: i64 },
    /// Повторная выдача файла после автоудаления.
    ClickHere { file_id: String, post_no: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_payload_roundtrips_through_json() {
        let payload = TokenPayload::Verify {
            user_id: 123,
            file_id: Some("BQACAgUAA".to_string()),
            post_no: Some(7),
        };
        let json = serde_json::to_string(&payload).unwrap();
        let back: TokenPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        // FileGet без file_id — обязательное поле, десериализация падает.
        let err = serde_json::from_str::<TokenPayload>(r#"{"kind":"file_get","post_no":7}"#);
        assert!(err.is_err());
    }

    #[test]
    fn optional_fields_default_to_none() {
        let payload: TokenPayload =
            serde_json::from_str(r#"{"kind":"verify","user_id":5}"#).unwrap();
        assert_eq!(
            payload,
            TokenPayload::Verify {
                user_id: 5,
                file_id: None,
                post_no: None,
            }
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = serde_json::from_str::<TokenPayload>(r#"{"kind":"root","user_id":5}"#);
        assert!(err.is_err());
    }
}
