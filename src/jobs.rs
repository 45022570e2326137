//! Фоновые sweep-ы: истечение заказов и доступов, чистка журнала визитов,
//! автоудаление доставленных файлов.
//!
//! Каждый sweep идемпотентен и логирует, сколько строк затронул. Ошибки
//! Telegram при автоудалении не валят проход: сообщение могло быть удалено
//! пользователем раньше нас.

use teloxide::prelude::*;
use teloxide::types::MessageId;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Db;

/// Итог прохода автоудаления. Ошибки видимы вызывающему, а не проглочены.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDeleteReport {
    pub deliveries: u64,
    pub messages_deleted: u64,
    pub messages_failed: u64,
}

/// Переводит просроченные pending-заказы в expired: сначала по QR-окну,
/// затем по окну подтверждения.
pub async fn expire_orders(db: &Db, now: i64) -> Result<u64, anyhow::Error> {
    let by_qr = db.expire_qr_overdue(now).await?;
    let by_confirm = db.expire_confirm_overdue(now).await?;
    let total = by_qr + by_confirm;
    if total > 0 {
        info!(by_qr, by_confirm, "orders expired");
    }
    Ok(total)
}

/// Удаляет expired-заказы старше недели.
pub async fn purge_old_orders(db: &Db, now: i64) -> Result<u64, anyhow::Error> {
    let purged = db.purge_expired_orders(now - 7 * 86_400).await?;
    if purged > 0 {
        info!(purged, "old expired orders purged");
    }
    Ok(purged)
}

/// Снимает флаги с истёкших верификаций и премиумов. Путь чтения и так
/// судит по срокам, sweep лишь держит флаги в согласии с ними.
pub async fn cleanup_entitlements(db: &Db, now: i64) -> Result<(), anyhow::Error> {
    let verifications = db.clear_expired_verification(now).await?;
    let premiums = db.clear_expired_premium(now).await?;
    if verifications + premiums > 0 {
        info!(verifications, premiums, "expired entitlements cleared");
    }
    Ok(())
}

/// Чистит журнал визитов. Окно хранения заведомо шире жизненного цикла
/// токена: пользователь, прошедший шортлинк, успевает нажать кнопку.
pub async fn prune_visits(db: &Db, retention_hours: i64, now: i64) -> Result<u64, anyhow::Error> {
    let pruned = db.prune_visit_log(now - retention_hours * 3600).await?;
    if pruned > 0 {
        info!(pruned, "visit log pruned");
    }
    Ok(pruned)
}

/// Удаляет из чатов доставленные файлы, чей срок вышел. Запись очереди
/// снимается даже при ошибке Telegram, иначе мёртвое сообщение будет
/// ретраиться вечно.
pub async fn auto_delete_deliveries(
    bot: &Bot,
    db: &Db,
    now: i64,
) -> Result<AutoDeleteReport, anyhow::Error> {
    let due = db.due_deliveries(now).await?;
    let mut report = AutoDeleteReport::default();

    for delivery in due {
        report.deliveries += 1;
        let chat_id = ChatId(delivery.chat_id);
        for msg_id in [delivery.msg1_id, delivery.msg2_id] {
            match bot.delete_message(chat_id, MessageId(msg_id as i32)).await {
                Ok(_) => report.messages_deleted += 1,
                Err(e) => {
                    report.messages_failed += 1;
                    warn!(
                        chat_id = delivery.chat_id,
                        msg_id, "auto-delete failed: {}", e
                    );
                }
            }
        }
        db.delete_delivery(delivery.id).await?;
    }

    if report.deliveries > 0 {
        info!(
            deliveries = report.deliveries,
            deleted = report.messages_deleted,
            failed = report.messages_failed,
            "delivery auto-delete sweep done"
        );
    }
    Ok(report)
}

/// Полный проход всех sweep-ов, один цикл.
pub async fn run_all(bot: &Bot, db: &Db, config: &Config, now: i64) -> Result<(), anyhow::Error> {
    expire_orders(db, now).await?;
    purge_old_orders(db, now).await?;
    cleanup_entitlements(db, now).await?;
    prune_visits(db, config.visit_retention_hours, now).await?;
    auto_delete_deliveries(bot, db, now).await?;
    Ok(())
}
