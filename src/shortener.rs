//! Пул шортнер-сервисов.
//!
//! Хранится в настройках JSON-массивом, при выдаче verify-ссылки выбирается
//! случайный. Ссылка строится локально по общепринятой схеме таких API,
//! HTTP-запрос к шортнеру не делается: переход по ней и есть монетизация.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::db::{Db, settings_keys};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortener {
    pub domain: String,
    pub api_key: String,
}

impl Shortener {
    pub fn build_short_link(&self, target_url: &str) -> String {
        format!(
            "https://{}/api?api={}&url={}",
            self.domain,
            self.api_key,
            urlencoding::encode(target_url)
        )
    }
}

pub async fn load_pool(db: &Db) -> Result<Vec<Shortener>, anyhow::Error> {
    let Some(raw) = db.get_setting(settings_keys::SHORTENERS).await? else {
        return Ok(Vec::new());
    };
    let pool: Vec<Shortener> = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("Повреждён список шортнеров в настройках: {}", e))?;
    Ok(pool)
}

pub async fn save_pool(db: &Db, pool: &[Shortener], now: i64) -> Result<(), anyhow::Error> {
    let raw = serde_json::to_string(pool)?;
    db.set_setting(settings_keys::SHORTENERS, &raw, now).await
}

/// Оборачивает verify-URL в случайный шортнер. Пустой пул — деградация в
/// прямую ссылку, верификация работает и без монетизации.
pub async fn wrap_verify_url(db: &Db, target_url: &str) -> Result<String, anyhow::Error> {
    let pool = load_pool(db).await?;
    if pool.is_empty() {
        return Ok(target_url.to_string());
    }
    let pick = rand::rng().random_range(0..pool.len());
    Ok(pool[pick].build_short_link(target_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_link_urlencodes_target() {
        let s = Shortener {
            domain: "shrink.example".to_string(),
            api_key: "k1".to_string(),
        };
        let link = s.build_short_link("https://gate.example/redirect?token=abc");
        assert_eq!(
            link,
            "https://shrink.example/api?api=k1&url=https%3A%2F%2Fgate.example%2Fredirect%3Ftoken%3Dabc"
        );
    }

    #[tokio::test]
    async fn empty_pool_falls_back_to_direct_url() {
        let db = Db::open_in_memory().await.unwrap();
        let url = wrap_verify_url(&db, "https://gate.example/redirect?token=t")
            .await
            .unwrap();
        assert_eq!(url, "https://gate.example/redirect?token=t");
    }

    #[tokio::test]
    async fn pool_roundtrips_through_settings() {
        let db = Db::open_in_memory().await.unwrap();
        let pool = vec![
            Shortener {
                domain: "a.example".to_string(),
                api_key: "ka".to_string(),
            },
            Shortener {
                domain: "b.example".to_string(),
                api_key: "kb".to_string(),
            },
        ];
        save_pool(&db, &pool, 100).await.unwrap();
        assert_eq!(load_pool(&db).await.unwrap(), pool);

        let url = wrap_verify_url(&db, "https://gate.example/r?token=t")
            .await
            .unwrap();
        assert!(url.starts_with("https://a.example/") || url.starts_with("https://b.example/"));
    }

    #[tokio::test]
    async fn corrupt_pool_is_reported() {
        let db = Db::open_in_memory().await.unwrap();
        db.set_setting(settings_keys::SHORTENERS, "не json", 100)
            .await
            .unwrap();
        assert!(load_pool(&db).await.is_err());
    }
}
