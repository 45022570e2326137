//! SQLite-слой: пользователи (верификация + премиум), файлы, планы, заказы,
//! настройки, журнал визитов redirect-сервера и очередь автоудаления.

use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Ключи настроек, редактируемых из админ-бота. Значения хранятся строками,
/// список шортнеров — JSON-массивом.
pub mod settings_keys {
    pub const FREE_ACCESS_HOURS: &str = "free_access_hours";
    pub const QR_EXPIRY_MINUTES: &str = "qr_expiry_minutes";
    pub const UPI_ID: &str = "upi_id";
    pub const UPI_NAME: &str = "upi_name";
    pub const UNIQUE_PAISE: &str = "unique_paise";
    pub const COUNTDOWN_SECONDS: &str = "countdown_seconds";
    pub const FORCE_SUB_CHANNEL: &str = "force_sub_channel";
    pub const SHORTENERS: &str = "shorteners";
    pub const DELETE_AFTER_MINUTES: &str = "delete_after_minutes";
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub joined_at: i64,
    pub is_verified: bool,
    pub verified_until: Option<i64>,
    pub is_premium: bool,
    pub premium_expiry: Option<i64>,
    pub premium_plan: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FileRecord {
    pub file_db_id: String,
    pub file_id: String,
    pub post_no: i64,
    pub description: String,
    pub extra_message: String,
    pub channel_message_id: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct PlanRecord {
    pub plan_id: String,
    pub name: String,
    pub days: i64,
    pub price: f64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Expired,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OrderRecord {
    pub order_id: String,
    pub user_id: i64,
    pub plan_id: String,
    pub amount: f64,
    pub status: OrderStatus,
    pub created_at: i64,
    /// Окно оплаты по QR.
    pub expires_at: i64,
    /// Окно ручного подтверждения админом; всегда шире окна QR.
    pub confirm_until: i64,
    pub paid_at: Option<i64>,
}

/// Итог подтверждения оплаты. Повторное подтверждение уже оплаченного
/// заказа — не ошибка, а no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    AlreadyPaid,
    NotFound,
    Closed(OrderStatus),
}

#[derive(Debug, Clone, FromRow)]
pub struct DeliveryRecord {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub msg1_id: i64,
    pub msg2_id: i64,
    pub file_id: String,
    pub post_no: i64,
    pub delete_after: i64,
}

#[derive(Debug, Clone)]
pub struct Stats {
    pub users: i64,
    pub verified_now: i64,
    pub premium_now: i64,
    pub files: i64,
    pub orders_pending: i64,
    pub orders_paid: i64,
    pub bypass_attempts: i64,
}

pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Не удалось создать директорию для БД: {}", e))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts)
            .await
            .map_err(|e| anyhow::anyhow!("Не удалось подключиться к SQLite: {}", e))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// База в памяти для тестов. Одно соединение, иначе каждый коннект пула
    /// получит собственную пустую базу.
    pub async fn open_in_memory() -> Result<Self, anyhow::Error> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT,
                joined_at INTEGER NOT NULL,
                is_verified INTEGER NOT NULL DEFAULT 0,
                verified_until INTEGER,
                is_premium INTEGER NOT NULL DEFAULT 0,
                premium_expiry INTEGER,
                premium_plan TEXT
            );
            CREATE TABLE IF NOT EXISTS files (
                file_db_id TEXT PRIMARY KEY,
                file_id TEXT NOT NULL,
                post_no INTEGER UNIQUE NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                extra_message TEXT NOT NULL DEFAULT '',
                channel_message_id INTEGER,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS plans (
                plan_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                days INTEGER NOT NULL,
                price REAL NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS orders (
                order_id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                plan_id TEXT NOT NULL,
                amount REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                confirm_until INTEGER NOT NULL,
                paid_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
            CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id);
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS visit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                token TEXT NOT NULL,
                visited_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_visit_log_user_token ON visit_log(user_id, token);
            CREATE INDEX IF NOT EXISTS idx_visit_log_visited_at ON visit_log(visited_at);
            CREATE TABLE IF NOT EXISTS bypass_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                token TEXT NOT NULL,
                file_id TEXT,
                post_no INTEGER,
                detected_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS deliveries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                msg1_id INTEGER NOT NULL,
                msg2_id INTEGER NOT NULL,
                file_id TEXT NOT NULL,
                post_no INTEGER NOT NULL,
                delete_after INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_deliveries_delete_after ON deliveries(delete_after);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Миграция БД: {}", e))?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Пользователи
    // ------------------------------------------------------------------

    /// Регистрирует пользователя при первом контакте и обновляет
    /// username/имя при последующих.
    pub async fn ensure_user(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
        now: i64,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "INSERT INTO users (user_id, username, first_name, joined_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET username = excluded.username,
                                               first_name = excluded.first_name",
        )
        .bind(user_id)
        .bind(username)
        .bind(first_name)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, anyhow::Error> {
        let row = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, username, first_name, joined_at, is_verified, verified_until,
                    is_premium, premium_expiry, premium_plan
             FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Выдаёт верификацию. Всегда сброс от текущего момента: повторная
    /// верификация не прибавляет время к неистёкшей, в отличие от премиума.
    pub async fn apply_verification(
        &self,
        user_id: i64,
        hours: i64,
        now: i64,
    ) -> Result<i64, anyhow::Error> {
        let until = now + hours * 3600;
        sqlx::query(
            "INSERT INTO users (user_id, joined_at, is_verified, verified_until)
             VALUES (?, ?, 1, ?)
             ON CONFLICT(user_id) DO UPDATE SET is_verified = 1,
                                               verified_until = excluded.verified_until",
        )
        .bind(user_id)
        .bind(now)
        .bind(until)
        .execute(&self.pool)
        .await?;
        Ok(until)
    }

    pub async fn revoke_verification(&self, user_id: i64) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE users SET is_verified = 0, verified_until = NULL
             WHERE user_id = ? AND is_verified = 1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Активирует премиум. Неистёкший премиум продлевается (стекинг),
    /// истёкший или отсутствующий — начинается заново от текущего момента.
    pub async fn activate_premium(
        &self,
        user_id: i64,
        plan_days: i64,
        plan_id: &str,
        now: i64,
    ) -> Result<i64, anyhow::Error> {
        let add_seconds = plan_days
            .checked_mul(86_400)
            .ok_or_else(|| anyhow::anyhow!("Срок плана слишком большой"))?;

        sqlx::query(
            "INSERT INTO users (user_id, joined_at, is_premium, premium_expiry, premium_plan)
             VALUES (?1, ?2, 1, ?2 + ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                 is_premium = 1,
                 premium_plan = excluded.premium_plan,
                 premium_expiry = CASE
                     WHEN users.premium_expiry IS NOT NULL AND users.premium_expiry > ?2
                         THEN users.premium_expiry + ?3
                     ELSE ?2 + ?3
                 END",
        )
        .bind(user_id)
        .bind(now)
        .bind(add_seconds)
        .bind(plan_id)
        .execute(&self.pool)
        .await?;

        let expiry =
            sqlx::query_scalar::<_, i64>("SELECT premium_expiry FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(expiry)
    }

    pub async fn revoke_premium(&self, user_id: i64) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE users SET is_premium = 0, premium_expiry = NULL, premium_plan = NULL
             WHERE user_id = ? AND is_premium = 1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_user_ids(&self) -> Result<Vec<i64>, anyhow::Error> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT user_id FROM users ORDER BY joined_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Ленивое истечение: флаги снимаются только этим sweep-ом, путь чтения
    /// в ботах по флагу сам не судит (см. `entitlement`).
    pub async fn clear_expired_verification(&self, now: i64) -> Result<u64, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE users SET is_verified = 0, verified_until = NULL
             WHERE is_verified = 1 AND verified_until IS NOT NULL AND verified_until <= ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn clear_expired_premium(&self, now: i64) -> Result<u64, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE users SET is_premium = 0, premium_expiry = NULL, premium_plan = NULL
             WHERE is_premium = 1 AND premium_expiry IS NOT NULL AND premium_expiry <= ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------
    // Журнал визитов redirect-сервера и попыток обхода
    // ------------------------------------------------------------------

    /// Запись визита. Дубликаты не мешают: проверка обхода смотрит на
    /// существование записи, а не на количество.
    pub async fn log_visit(&self, user_id: i64, token: &str, now: i64) -> Result<(), anyhow::Error> {
        sqlx::query("INSERT INTO visit_log (user_id, token, visited_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(token)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Детектор обхода: был ли визит именно с этим токеном и именно этим
    /// пользователем. Ключ по точной строке токена, один визит не
    /// легализует другие токены того же пользователя.
    pub async fn visit_exists(&self, user_id: i64, token: &str) -> Result<bool, anyhow::Error> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM visit_log WHERE user_id = ? AND token = ? LIMIT 1",
        )
        .bind(user_id)
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    pub async fn prune_visit_log(&self, cutoff: i64) -> Result<u64, anyhow::Error> {
        let result = sqlx::query("DELETE FROM visit_log WHERE visited_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn log_bypass(
        &self,
        user_id: i64,
        token: &str,
        file_id: Option<&str>,
        post_no: Option<i64>,
        now: i64,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "INSERT INTO bypass_log (user_id, token, file_id, post_no, detected_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(token)
        .bind(file_id)
        .bind(post_no)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Файлы
    // ------------------------------------------------------------------

    pub async fn next_post_no(&self) -> Result<i64, anyhow::Error> {
        let max = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(post_no) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(max.unwrap_or(0) + 1)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_file(
        &self,
        file_db_id: &str,
        file_id: &str,
        post_no: i64,
        description: &str,
        extra_message: &str,
        channel_message_id: Option<i64>,
        now: i64,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "INSERT INTO files (file_db_id, file_id, post_no, description, extra_message,
                                channel_message_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(file_db_id)
        .bind(file_id)
        .bind(post_no)
        .bind(description)
        .bind(extra_message)
        .bind(channel_message_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_file_by_post(&self, post_no: i64) -> Result<Option<FileRecord>, anyhow::Error> {
        let row = sqlx::query_as::<_, FileRecord>(
            "SELECT file_db_id, file_id, post_no, description, extra_message,
                    channel_message_id, created_at
             FROM files WHERE post_no = ?",
        )
        .bind(post_no)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_files(&self, limit: i64) -> Result<Vec<FileRecord>, anyhow::Error> {
        let rows = sqlx::query_as::<_, FileRecord>(
            "SELECT file_db_id, file_id, post_no, description, extra_message,
                    channel_message_id, created_at
             FROM files ORDER BY post_no DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete_file(&self, post_no: i64) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM files WHERE post_no = ?")
            .bind(post_no)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Планы
    // ------------------------------------------------------------------

    pub async fn upsert_plan(
        &self,
        plan_id: &str,
        name: &str,
        days: i64,
        price: f64,
        now: i64,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "INSERT INTO plans (plan_id, name, days, price, created_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(plan_id) DO UPDATE SET name = excluded.name, days = excluded.days,
                                               price = excluded.price",
        )
        .bind(plan_id)
        .bind(name)
        .bind(days)
        .bind(price)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_plan(&self, plan_id: &str) -> Result<Option<PlanRecord>, anyhow::Error> {
        let row = sqlx::query_as::<_, PlanRecord>(
            "SELECT plan_id, name, days, price, created_at FROM plans WHERE plan_id = ?",
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_plans(&self) -> Result<Vec<PlanRecord>, anyhow::Error> {
        let rows = sqlx::query_as::<_, PlanRecord>(
            "SELECT plan_id, name, days, price, created_at FROM plans ORDER BY days ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete_plan(&self, plan_id: &str) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM plans WHERE plan_id = ?")
            .bind(plan_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Заказы
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create_order(
        &self,
        order_id: &str,
        user_id: i64,
        plan_id: &str,
        amount: f64,
        qr_expiry_minutes: i64,
        confirm_window_hours: i64,
        now: i64,
    ) -> Result<OrderRecord, anyhow::Error> {
        let expires_at = now + qr_expiry_minutes * 60;
        let confirm_until = now + confirm_window_hours * 3600;
        sqlx::query(
            "INSERT INTO orders (order_id, user_id, plan_id, amount, status, created_at,
                                 expires_at, confirm_until)
             VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)",
        )
        .bind(order_id)
        .bind(user_id)
        .bind(plan_id)
        .bind(amount)
        .bind(now)
        .bind(expires_at)
        .bind(confirm_until)
        .execute(&self.pool)
        .await?;

        self.get_order(order_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Только что созданный заказ не найден"))
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Option<OrderRecord>, anyhow::Error> {
        let row = sqlx::query_as::<_, OrderRecord>(
            "SELECT order_id, user_id, plan_id, amount, status, created_at, expires_at,
                    confirm_until, paid_at
             FROM orders WHERE order_id = ?",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Переход pending → paid. Статусы монотонны: из paid обратного пути
    /// нет, повторное подтверждение — no-op.
    pub async fn confirm_order(
        &self,
        order_id: &str,
        now: i64,
    ) -> Result<ConfirmOutcome, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'paid', paid_at = ?
             WHERE order_id = ? AND status = 'pending'",
        )
        .bind(now)
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(ConfirmOutcome::Confirmed);
        }

        match self.get_order(order_id).await? {
            None => Ok(ConfirmOutcome::NotFound),
            Some(order) if order.status == OrderStatus::Paid => Ok(ConfirmOutcome::AlreadyPaid),
            Some(order) => Ok(ConfirmOutcome::Closed(order.status)),
        }
    }

    /// Возврат — единственный разрешённый выход из paid, и только как
    /// явное действие админа.
    pub async fn refund_order(&self, order_id: &str) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'refunded' WHERE order_id = ? AND status = 'paid'",
        )
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_recent_orders(&self, limit: i64) -> Result<Vec<OrderRecord>, anyhow::Error> {
        let rows = sqlx::query_as::<_, OrderRecord>(
            "SELECT order_id, user_id, plan_id, amount, status, created_at, expires_at,
                    confirm_until, paid_at
             FROM orders ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Sweep: pending-заказы с истёкшим QR-окном.
    pub async fn expire_qr_overdue(&self, now: i64) -> Result<u64, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'expired' WHERE status = 'pending' AND expires_at < ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Sweep: pending-заказы, чьё окно подтверждения админом вышло.
    pub async fn expire_confirm_overdue(&self, now: i64) -> Result<u64, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'expired' WHERE status = 'pending' AND confirm_until < ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Sweep: жёсткое удаление давно истёкших заказов.
    pub async fn purge_expired_orders(&self, cutoff: i64) -> Result<u64, anyhow::Error> {
        let result = sqlx::query("DELETE FROM orders WHERE status = 'expired' AND expires_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------
    // Настройки
    // ------------------------------------------------------------------

    pub async fn set_setting(&self, key: &str, value: &str, now: i64) -> Result<(), anyhow::Error> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                           updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn delete_setting(&self, key: &str) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Числовая настройка с фолбэком на значение из конфига.
    pub async fn setting_i64(&self, key: &str, default: i64) -> Result<i64, anyhow::Error> {
        Ok(self
            .get_setting(key)
            .await?
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(default))
    }

    pub async fn list_settings(&self) -> Result<Vec<(String, String)>, anyhow::Error> {
        let rows =
            sqlx::query_as::<_, (String, String)>("SELECT key, value FROM settings ORDER BY key")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Очередь автоудаления доставленных файлов
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn record_delivery(
        &self,
        user_id: i64,
        chat_id: i64,
        msg1_id: i64,
        msg2_id: i64,
        file_id: &str,
        post_no: i64,
        delete_after: i64,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "INSERT INTO deliveries (user_id, chat_id, msg1_id, msg2_id, file_id, post_no,
                                     delete_after)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(msg1_id)
        .bind(msg2_id)
        .bind(file_id)
        .bind(post_no)
        .bind(delete_after)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn due_deliveries(&self, now: i64) -> Result<Vec<DeliveryRecord>, anyhow::Error> {
        let rows = sqlx::query_as::<_, DeliveryRecord>(
            "SELECT id, user_id, chat_id, msg1_id, msg2_id, file_id, post_no, delete_after
             FROM deliveries WHERE delete_after <= ? ORDER BY delete_after ASC LIMIT 200",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete_delivery(&self, id: i64) -> Result<(), anyhow::Error> {
        sqlx::query("DELETE FROM deliveries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Статистика
    // ------------------------------------------------------------------

    pub async fn stats(&self, now: i64) -> Result<Stats, anyhow::Error> {
        let users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let verified_now = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE is_verified = 1 AND verified_until > ?",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        let premium_now = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE is_premium = 1 AND premium_expiry > ?",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        let files = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        let orders_pending =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        let orders_paid =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE status = 'paid'")
                .fetch_one(&self.pool)
                .await?;
        let bypass_attempts = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bypass_log")
            .fetch_one(&self.pool)
            .await?;

        Ok(Stats {
            users,
            verified_now,
            premium_now,
            files,
            orders_pending,
            orders_paid,
            bypass_attempts,
        })
    }
}
