//! Конфигурация всех процессов: боты, redirect-сервер, sweeper.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Токен пользовательского бота (выдача файлов).
    pub user_bot_token: String,
    /// Токен админ-бота.
    pub admin_bot_token: String,
    /// Username пользовательского бота без @ — для deep-link ссылок.
    pub bot_username: String,
    /// Telegram ID администраторов.
    #[serde(default)]
    pub admin_ids: Vec<i64>,
    /// Путь к базе SQLite.
    pub db_path: PathBuf,
    /// Общий секрет токенов. Должен совпадать у ботов и redirect-сервера,
    /// иначе токены не пройдут проверку между процессами.
    pub token_secret: String,
    /// Базовый URL redirect-сервера без пути, например "http://1.2.3.4:5000".
    /// Эндпоинты /redirect и /return добавляются к нему.
    pub redirect_base: String,
    /// Адрес, на котором слушает redirect-сервер.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Сколько часов действует бесплатная верификация (если админ не
    /// переопределил в настройках).
    #[serde(default = "default_free_access_hours")]
    pub free_access_hours: i64,
    /// Окно оплаты по QR в минутах.
    #[serde(default = "default_qr_expiry_minutes")]
    pub qr_expiry_minutes: i64,
    /// Окно ручного подтверждения оплаты админом, в часах. Всегда длиннее
    /// окна QR: админ подтверждает медленнее, чем пользователь платит.
    #[serde(default = "default_confirm_window_hours")]
    pub confirm_window_hours: i64,
    /// Через сколько минут удалять доставленные файлы из чата.
    #[serde(default = "default_delete_after_minutes")]
    pub delete_after_minutes: i64,
    /// Длительность обратного отсчёта на странице redirect-сервера.
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: i64,
    /// Сколько часов хранить журнал визитов redirect-сервера.
    #[serde(default = "default_visit_retention_hours")]
    pub visit_retention_hours: i64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_free_access_hours() -> i64 {
    1
}

fn default_qr_expiry_minutes() -> i64 {
    10
}

fn default_confirm_window_hours() -> i64 {
    10
}

fn default_delete_after_minutes() -> i64 {
    5
}

fn default_countdown_seconds() -> i64 {
    10
}

fn default_visit_retention_hours() -> i64 {
    6
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Не удалось прочитать конфиг {}: {}", path.display(), e)
        })?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Некорректный конфиг {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.token_secret.trim().is_empty() {
            return Err(anyhow::anyhow!("token_secret не задан"));
        }
        if self.bot_username.trim().is_empty() {
            return Err(anyhow::anyhow!("bot_username не задан"));
        }
        if self.redirect_base.trim().is_empty() {
            return Err(anyhow::anyhow!("redirect_base не задан"));
        }
        Ok(())
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
            user_bot_token = "111:aaa"
            admin_bot_token = "222:bbb"
            bot_username = "FileGateBot"
            admin_ids = [42]
            db_path = "/tmp/filegate.db"
            token_secret = "s3cret"
            redirect_base = "http://127.0.0.1:5000"
        "#
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.free_access_hours, 1);
        assert_eq!(config.qr_expiry_minutes, 10);
        assert_eq!(config.confirm_window_hours, 10);
        assert!(config.is_admin(42));
        assert!(!config.is_admin(7));
    }

    #[test]
    fn rejects_empty_secret() {
        let raw = minimal_toml().replace("\"s3cret\"", "\" \"");
        let config: Config = toml::from_str(&raw).unwrap();
        assert!(config.validate().is_err());
    }
}
