//! Токены протокола верификации: шифрованный контейнер полезной нагрузки,
//! подпись входящего поколения и deep-link префиксы.

mod codec;
mod deeplink;
mod payload;
mod signer;

pub use codec::TokenCodec;
pub use deeplink::{
    DeepLink, PREFIX_BYPASS, PREFIX_CLICK, PREFIX_GET, PREFIX_PAY, PREFIX_VERIFIED, PREFIX_VERIFY,
    build_start_link, parse_start_arg,
};
pub use payload::TokenPayload;
pub use signer::TokenSigner;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Любая порча, чужой ключ, мусор вместо base64, неизвестная форма
    /// полезной нагрузки — всё схлопывается в один ответ. Fail closed.
    #[error("Невалидный или повреждённый токен")]
    Invalid,
    #[error("Не удалось сформировать токен")]
    Encode,
}
