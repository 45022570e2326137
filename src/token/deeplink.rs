//! Deep-link аргументы `/start`. Префикс определяет путь потребления,
//! содержимое после префикса — всегда токен (для pay_ — order_id).

pub const PREFIX_VERIFY: &str = "verify_";
pub const PREFIX_VERIFIED: &str = "verified_";
pub const PREFIX_BYPASS: &str = "bypass_";
pub const PREFIX_GET: &str = "get_";
pub const PREFIX_CLICK: &str = "click_";
pub const PREFIX_PAY: &str = "pay_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLink {
    /// Запуск верификации, внутри — зашифрованный verify-токен.
    Verify(String),
    /// Подписанный ответ redirect-сервера: прохождение подтверждено.
    Verified(String),
    /// Подписанный ответ redirect-сервера: обнаружен обход.
    Bypass(String),
    /// Запрос файла из публичного поста.
    FileGet(String),
    /// Повторная выдача файла.
    ClickHere(String),
    /// Возврат из UPI-приложения, внутри — order_id.
    Pay(String),
}

impl DeepLink {
    pub fn parse(arg: &str) -> Option<Self> {
        let link = if let Some(rest) = arg.strip_prefix(PREFIX_VERIFIED) {
            // verified_ проверяется раньше verify_: первый — префикс второго.
            Self::Verified(rest.to_string())
        } else if let Some(rest) = arg.strip_prefix(PREFIX_VERIFY) {
            Self::Verify(rest.to_string())
        } else if let Some(rest) = arg.strip_prefix(PREFIX_BYPASS) {
            Self::Bypass(rest.to_string())
        } else if let Some(rest) = arg.strip_prefix(PREFIX_GET) {
            Self::FileGet(rest.to_string())
        } else if let Some(rest) = arg.strip_prefix(PREFIX_CLICK) {
            Self::ClickHere(rest.to_string())
        } else if let Some(rest) = arg.strip_prefix(PREFIX_PAY) {
            Self::Pay(rest.to_string())
        } else {
            return None;
        };

        match &link {
            Self::Verify(rest)
            | Self::Verified(rest)
            | Self::Bypass(rest)
            | Self::FileGet(rest)
            | Self::ClickHere(rest)
            | Self::Pay(rest)
                if rest.is_empty() =>
            {
                None
            }
            _ => Some(link),
        }
    }
}

/// Достаёт аргумент из текста `/start <arg>`.
pub fn parse_start_arg(text: &str) -> Option<String> {
    let mut parts = text.split_whitespace();
    let command = parts.next()?;
    if !command.starts_with("/start") {
        return None;
    }
    let arg = parts.next()?.trim();
    if arg.is_empty() {
        return None;
    }

    let decoded = match urlencoding::decode(arg) {
        Ok(value) => value.into_owned(),
        Err(_) => arg.to_string(),
    };
    let normalized = decoded.trim().trim_matches('`').trim();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.to_string())
    }
}

pub fn build_start_link(bot_username: &str, arg: &str) -> String {
    let normalized = bot_username.trim_start_matches('@');
    format!("https://t.me/{}?start={}", normalized, arg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verified_wins_over_verify_prefix() {
        assert_eq!(
            DeepLink::parse("verified_abc"),
            Some(DeepLink::Verified("abc".to_string()))
        );
        assert_eq!(
            DeepLink::parse("verify_abc"),
            Some(DeepLink::Verify("abc".to_string()))
        );
    }

    #[test]
    fn all_prefixes_parse() {
        assert_eq!(
            DeepLink::parse("bypass_t"),
            Some(DeepLink::Bypass("t".to_string()))
        );
        assert_eq!(
            DeepLink::parse("get_t"),
            Some(DeepLink::FileGet("t".to_string()))
        );
        assert_eq!(
            DeepLink::parse("click_t"),
            Some(DeepLink::ClickHere("t".to_string()))
        );
        assert_eq!(
            DeepLink::parse("pay_ORD-1"),
            Some(DeepLink::Pay("ORD-1".to_string()))
        );
    }

    #[test]
    fn unknown_or_empty_rejected() {
        assert_eq!(DeepLink::parse("root_abc"), None);
        assert_eq!(DeepLink::parse("verify_"), None);
        assert_eq!(DeepLink::parse(""), None);
    }

    #[test]
    fn start_arg_extraction() {
        assert_eq!(
            parse_start_arg("/start get_abc"),
            Some("get_abc".to_string())
        );
        assert_eq!(parse_start_arg("/start"), None);
        assert_eq!(parse_start_arg("/help get_abc"), None);
    }

    #[test]
    fn start_link_strips_at_sign() {
        assert_eq!(
            build_start_link("@FileGateBot", "get_x"),
            "https://t.me/FileGateBot?start=get_x"
        );
    }
}
