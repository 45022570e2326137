//! Протокол верификации: выпуск verify-токена, фиксация визита на
//! redirect-сервере, разрешение исхода (verified / bypass) и потребление
//! подписанного ответа ботом.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::db::{Db, settings_keys};
use crate::token::{DeepLink, TokenCodec, TokenError, TokenPayload, TokenSigner};

/// Исход прохождения: обход — валидный исход протокола, а не ошибка.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Verified,
    Bypass,
}

/// Результат разрешения на redirect-сервере. `deep_link_arg` — готовый
/// аргумент `/start` с подписанным токеном входящего поколения.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub user_id: i64,
    pub file_id: Option<String>,
    pub post_no: Option<i64>,
    pub outcome: Outcome,
    pub deep_link_arg: String,
}

pub struct VerificationProtocol {
    codec: TokenCodec,
    signer: TokenSigner,
    db: Arc<Db>,
    clock: Arc<dyn Clock>,
    default_free_hours: i64,
}

impl VerificationProtocol {
    pub fn new(
        secret: &str,
        db: Arc<Db>,
        clock: Arc<dyn Clock>,
        default_free_hours: i64,
    ) -> Self {
        Self {
            codec: TokenCodec::new(secret),
            signer: TokenSigner::new(secret),
            db,
            clock,
            default_free_hours,
        }
    }

    /// Выпускает исходящий verify-токен. Каждый запрос — свежий токен:
    /// нонс случайный, два выпуска для одного пользователя не совпадают.
    pub fn issue(
        &self,
        user_id: i64,
        file_id: Option<String>,
        post_no: Option<i64>,
    ) -> Result<String, TokenError> {
        self.codec.encode(&TokenPayload::Verify {
            user_id,
            file_id,
            post_no,
        })
    }

    /// Фиксирует визит на странице отсчёта. Принимается только verify-токен,
    /// любой другой вариант неотличим от порченого.
    pub async fn record_visit(&self, token: &str) -> Result<(), anyhow::Error> {
        let TokenPayload::Verify { user_id, .. } = self.codec.decode(token)? else {
            return Err(TokenError::Invalid.into());
        };
        self.db.log_visit(user_id, token, self.clock.now()).await?;
        info!(user_id, "redirect visit recorded");
        Ok(())
    }

    /// Разрешает исход по завершении отсчёта. Нет записи визита с точно
    /// этим токеном — обход: пользователь получил конечный URL, не пройдя
    /// шортлинк. Ответ в обоих случаях подписан.
    pub async fn resolve(&self, token: &str) -> Result<Resolution, anyhow::Error> {
        let TokenPayload::Verify {
            user_id,
            file_id,
            post_no,
        } = self.codec.decode(token)?
        else {
            return Err(TokenError::Invalid.into());
        };

        let visited = self.db.visit_exists(user_id, token).await?;
        let (outcome, payload, prefix) = if visited {
            (
                Outcome::Verified,
                TokenPayload::Verified {
                    user_id,
                    file_id: file_id.clone(),
                    post_no,
                },
                crate::token::PREFIX_VERIFIED,
            )
        } else {
            warn!(user_id, "bypass detected: no visit record for token");
            (
                Outcome::Bypass,
                TokenPayload::Bypass {
                    user_id,
                    file_id: file_id.clone(),
                    post_no,
                },
                crate::token::PREFIX_BYPASS,
            )
        };

        let inner = self.codec.encode(&payload)?;
        let deep_link_arg = format!("{}{}", prefix, self.signer.pack(&inner));

        Ok(Resolution {
            user_id,
            file_id,
            post_no,
            outcome,
            deep_link_arg,
        })
    }

    /// Потребляет подписанный ответ redirect-сервера на стороне бота:
    /// сначала конверт, затем контейнер. «Голый» verify-токен здесь не
    /// проходит.
    pub fn consume(&self, signed: &str) -> Result<TokenPayload, TokenError> {
        let inner = self.signer.unpack(signed)?;
        self.codec.decode(&inner)
    }

    /// Разбирает deep-link аргумент и потребляет подписанные варианты.
    pub fn consume_deep_link(&self, link: &DeepLink) -> Result<TokenPayload, TokenError> {
        match link {
            DeepLink::Verified(signed) | DeepLink::Bypass(signed) => self.consume(signed),
            _ => Err(TokenError::Invalid),
        }
    }

    /// Кодирует неподписанный токен исходящего поколения (get_, click_,
    /// verify_). Оба бота и redirect-сервер делят один секрет.
    pub fn encode_token(&self, payload: &TokenPayload) -> Result<String, TokenError> {
        self.codec.encode(payload)
    }

    /// Декодирует неподписанный токен. Для verified_/bypass_ используйте
    /// [`consume`](Self::consume).
    pub fn decode_token(&self, token: &str) -> Result<TokenPayload, TokenError> {
        self.codec.decode(token)
    }

    /// Начисляет верификационный доступ. Сброс от текущего момента, без
    /// стекинга; повторное начисление в тот же момент идемпотентно.
    pub async fn grant_free_access(&self, user_id: i64) -> Result<i64, anyhow::Error> {
        let hours = self
            .db
            .setting_i64(settings_keys::FREE_ACCESS_HOURS, self.default_free_hours)
            .await?;
        let until = self
            .db
            .apply_verification(user_id, hours, self.clock.now())
            .await?;
        info!(user_id, until, "verification granted");
        Ok(until)
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }
}
