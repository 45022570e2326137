//! Админ-бот: загрузка файлов, планы, заказы, ручные начисления, настройки,
//! шортнеры, рассылка и статистика.

use rand::RngCore;
use teloxide::dispatching::DpHandlerDescription;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use super::HandlerResult;
use super::format::{format_timestamp, render_file_line, render_order_line, render_plan_line, render_stats};
use super::state::{BotState, is_admin_message, sender_user_id};
use crate::db::{ConfirmOutcome, settings_keys};
use crate::shortener::{self, Shortener};
use crate::token::{self, TokenPayload, build_start_link};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum AdminCommand {
    #[command(description = "Панель администратора")]
    Start,
    #[command(description = "Справка")]
    Help,
    #[command(description = "Добавить план: /addplan <id> <дней> <цена> <название>")]
    Addplan,
    #[command(description = "Список планов")]
    Plans,
    #[command(description = "Удалить план: /delplan <id>")]
    Delplan,
    #[command(description = "Последние заказы")]
    Orders,
    #[command(description = "Подтвердить оплату: /confirm <order_id>")]
    Confirm,
    #[command(description = "Возврат: /refund <order_id>")]
    Refund,
    #[command(description = "Список файлов")]
    Files,
    #[command(description = "Удалить файл: /delfile <post_no>")]
    Delfile,
    #[command(description = "Выдать верификацию: /grantverify <user_id> [часов]")]
    Grantverify,
    #[command(description = "Снять верификацию: /revokeverify <user_id>")]
    Revokeverify,
    #[command(description = "Выдать премиум: /grantpremium <user_id> <дней>")]
    Grantpremium,
    #[command(description = "Снять премиум: /revokepremium <user_id>")]
    Revokepremium,
    #[command(description = "Настройка: /set <ключ> <значение>")]
    Set,
    #[command(description = "Показать настройки")]
    Settings,
    #[command(description = "Шортнеры: /shortener add|del|list")]
    Shortener,
    #[command(description = "Статистика")]
    Stats,
    #[command(description = "Рассылка: /broadcast <текст>")]
    Broadcast,
}

/// Итог рассылки: сбои видимы админу, а не проглочены.
#[derive(Debug, Default, Clone, Copy)]
pub struct BroadcastReport {
    pub sent: u64,
    pub failed: u64,
}

pub fn schema() -> dptree::Handler<
    'static,
    Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>,
    DpHandlerDescription,
> {
    let commands = teloxide::filter_command::<AdminCommand, _>()
        .branch(dptree::case![AdminCommand::Start].endpoint(cmd_start))
        .branch(dptree::case![AdminCommand::Help].endpoint(cmd_help))
        .branch(dptree::case![AdminCommand::Addplan].endpoint(cmd_addplan))
        .branch(dptree::case![AdminCommand::Plans].endpoint(cmd_plans))
        .branch(dptree::case![AdminCommand::Delplan].endpoint(cmd_delplan))
        .branch(dptree::case![AdminCommand::Orders].endpoint(cmd_orders))
        .branch(dptree::case![AdminCommand::Confirm].endpoint(cmd_confirm))
        .branch(dptree::case![AdminCommand::Refund].endpoint(cmd_refund))
        .branch(dptree::case![AdminCommand::Files].endpoint(cmd_files))
        .branch(dptree::case![AdminCommand::Delfile].endpoint(cmd_delfile))
        .branch(dptree::case![AdminCommand::Grantverify].endpoint(cmd_grantverify))
        .branch(dptree::case![AdminCommand::Revokeverify].endpoint(cmd_revokeverify))
        .branch(dptree::case![AdminCommand::Grantpremium].endpoint(cmd_grantpremium))
        .branch(dptree::case![AdminCommand::Revokepremium].endpoint(cmd_revokepremium))
        .branch(dptree::case![AdminCommand::Set].endpoint(cmd_set))
        .branch(dptree::case![AdminCommand::Settings].endpoint(cmd_settings))
        .branch(dptree::case![AdminCommand::Shortener].endpoint(cmd_shortener))
        .branch(dptree::case![AdminCommand::Stats].endpoint(cmd_stats))
        .branch(dptree::case![AdminCommand::Broadcast].endpoint(cmd_broadcast));

    dptree::entry().branch(
        Update::filter_message()
            .branch(commands)
            .endpoint(handle_document_upload),
    )
}

fn nth_arg(msg: &Message, index: usize) -> Option<String> {
    msg.text()
        .unwrap_or("")
        .split_whitespace()
        .nth(index)
        .map(str::to_string)
}

fn tail_args(msg: &Message, from: usize) -> String {
    msg.text()
        .unwrap_or("")
        .split_whitespace()
        .skip(from)
        .collect::<Vec<_>>()
        .join(" ")
}

async fn cmd_start(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        bot.send_message(msg.chat.id, "Это служебный бот.").await?;
        return Ok(());
    }
    bot.send_message(
        msg.chat.id,
        "Панель администратора. Отправьте документ, чтобы опубликовать файл, \
         или /help для списка команд.",
    )
    .await?;
    Ok(())
}

async fn cmd_help(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    bot.send_message(msg.chat.id, AdminCommand::descriptions().to_string())
        .await?;
    Ok(())
}

async fn cmd_addplan(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let usage = "Использование: /addplan <id> <дней> <цена> <название>";
    let (Some(plan_id), Some(days_raw), Some(price_raw)) =
        (nth_arg(&msg, 1), nth_arg(&msg, 2), nth_arg(&msg, 3))
    else {
        bot.send_message(msg.chat.id, usage).await?;
        return Ok(());
    };
    let name = tail_args(&msg, 4);
    let (Ok(days), Ok(price)) = (days_raw.parse::<i64>(), price_raw.parse::<f64>()) else {
        bot.send_message(msg.chat.id, usage).await?;
        return Ok(());
    };
    if days < 1 || price <= 0.0 || name.is_empty() {
        bot.send_message(msg.chat.id, usage).await?;
        return Ok(());
    }

    state
        .db
        .upsert_plan(&plan_id, &name, days, price, state.clock.now())
        .await?;
    bot.send_message(
        msg.chat.id,
        format!("✅ План {} сохранён: {} дн. за ₹{:.2}", plan_id, days, price),
    )
    .await?;
    Ok(())
}

async fn cmd_plans(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let plans = state.db.list_plans().await?;
    if plans.is_empty() {
        bot.send_message(msg.chat.id, "Планов нет.").await?;
        return Ok(());
    }
    let lines: Vec<String> = plans.iter().map(render_plan_line).collect();
    bot.send_message(msg.chat.id, format!("Планы:\n{}", lines.join("\n")))
        .await?;
    Ok(())
}

async fn cmd_delplan(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let Some(plan_id) = nth_arg(&msg, 1) else {
        bot.send_message(msg.chat.id, "Использование: /delplan <id>").await?;
        return Ok(());
    };
    let deleted = state.db.delete_plan(&plan_id).await?;
    bot.send_message(
        msg.chat.id,
        if deleted {
            format!("План {} удалён.", plan_id)
        } else {
            format!("План {} не найден.", plan_id)
        },
    )
    .await?;
    Ok(())
}

async fn cmd_orders(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let limit = nth_arg(&msg, 1)
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(10)
        .clamp(1, 50);
    let orders = state.db.list_recent_orders(limit).await?;
    if orders.is_empty() {
        bot.send_message(msg.chat.id, "Заказов нет.").await?;
        return Ok(());
    }
    let lines: Vec<String> = orders.iter().map(render_order_line).collect();
    bot.send_message(msg.chat.id, format!("Заказы:\n{}", lines.join("\n")))
        .await?;
    Ok(())
}

async fn cmd_confirm(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let Some(order_id) = nth_arg(&msg, 1) else {
        bot.send_message(msg.chat.id, "Использование: /confirm <order_id>")
            .await?;
        return Ok(());
    };

    let Some(order) = state.db.get_order(&order_id).await? else {
        bot.send_message(msg.chat.id, "Заказ не найден.").await?;
        return Ok(());
    };
    // План ищется до подтверждения: заказ не должен стать paid без
    // начисления премиума.
    let Some(plan) = state.db.get_plan(&order.plan_id).await? else {
        bot.send_message(
            msg.chat.id,
            format!("План {} удалён, подтверждение невозможно.", order.plan_id),
        )
        .await?;
        return Ok(());
    };

    match state.db.confirm_order(&order_id, state.clock.now()).await? {
        ConfirmOutcome::Confirmed => {
            let expiry = state
                .db
                .activate_premium(order.user_id, plan.days, &plan.plan_id, state.clock.now())
                .await?;
            tracing::info!(
                order_id = %order_id,
                user_id = order.user_id,
                expiry,
                "order confirmed, premium activated"
            );
            bot.send_message(
                msg.chat.id,
                format!(
                    "✅ Заказ {} подтверждён. Премиум пользователя {} до {}.",
                    order_id,
                    order.user_id,
                    format_timestamp(expiry)
                ),
            )
            .await?;

            if let Err(e) = state
                .user_bot
                .send_message(
                    ChatId(order.user_id),
                    format!(
                        "🎉 Оплата подтверждена! Премиум активен до {}.",
                        format_timestamp(expiry)
                    ),
                )
                .await
            {
                tracing::warn!(user_id = order.user_id, "user notify failed: {}", e);
            }
        }
        ConfirmOutcome::AlreadyPaid => {
            bot.send_message(msg.chat.id, "Заказ уже был подтверждён ранее.")
                .await?;
        }
        ConfirmOutcome::NotFound => {
            bot.send_message(msg.chat.id, "Заказ не найден.").await?;
        }
        ConfirmOutcome::Closed(status) => {
            bot.send_message(
                msg.chat.id,
                format!("Заказ в статусе {}, подтверждение невозможно.", status.as_str()),
            )
            .await?;
        }
    }
    Ok(())
}

async fn cmd_refund(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let Some(order_id) = nth_arg(&msg, 1) else {
        bot.send_message(msg.chat.id, "Использование: /refund <order_id>")
            .await?;
        return Ok(());
    };
    let refunded = state.db.refund_order(&order_id).await?;
    bot.send_message(
        msg.chat.id,
        if refunded {
            format!(
                "Заказ {} помечен как refunded. Премиум не снят автоматически: \
                 при необходимости выполните /revokepremium.",
                order_id
            )
        } else {
            "Возврат возможен только для оплаченного заказа.".to_string()
        },
    )
    .await?;
    Ok(())
}

async fn cmd_files(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let limit = nth_arg(&msg, 1)
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(10)
        .clamp(1, 50);
    let files = state.db.list_files(limit).await?;
    if files.is_empty() {
        bot.send_message(msg.chat.id, "Файлов нет.").await?;
        return Ok(());
    }
    let lines: Vec<String> = files.iter().map(render_file_line).collect();
    bot.send_message(msg.chat.id, format!("Файлы:\n{}", lines.join("\n")))
        .await?;
    Ok(())
}

async fn cmd_delfile(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let Some(post_no) = nth_arg(&msg, 1).and_then(|raw| raw.parse::<i64>().ok()) else {
        bot.send_message(msg.chat.id, "Использование: /delfile <post_no>")
            .await?;
        return Ok(());
    };
    let deleted = state.db.delete_file(post_no).await?;
    bot.send_message(
        msg.chat.id,
        if deleted {
            format!("Файл #{} удалён. Старые ссылки перестанут работать.", post_no)
        } else {
            format!("Файл #{} не найден.", post_no)
        },
    )
    .await?;
    Ok(())
}

async fn cmd_grantverify(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let Some(user_id) = nth_arg(&msg, 1).and_then(|raw| raw.parse::<i64>().ok()) else {
        bot.send_message(msg.chat.id, "Использование: /grantverify <user_id> [часов]")
            .await?;
        return Ok(());
    };
    let hours = match nth_arg(&msg, 2) {
        Some(raw) => match raw.parse::<i64>() {
            Ok(hours) if hours >= 1 => hours,
            _ => {
                bot.send_message(msg.chat.id, "Срок должен быть целым числом часов >= 1.")
                    .await?;
                return Ok(());
            }
        },
        None => {
            state
                .db
                .setting_i64(
                    settings_keys::FREE_ACCESS_HOURS,
                    state.config.free_access_hours,
                )
                .await?
        }
    };

    let until = state
        .db
        .apply_verification(user_id, hours, state.clock.now())
        .await?;
    bot.send_message(
        msg.chat.id,
        format!(
            "Верификация пользователя {} выдана до {}.",
            user_id,
            format_timestamp(until)
        ),
    )
    .await?;
    Ok(())
}

async fn cmd_revokeverify(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let Some(user_id) = nth_arg(&msg, 1).and_then(|raw| raw.parse::<i64>().ok()) else {
        bot.send_message(msg.chat.id, "Использование: /revokeverify <user_id>")
            .await?;
        return Ok(());
    };
    let revoked = state.db.revoke_verification(user_id).await?;
    bot.send_message(
        msg.chat.id,
        if revoked {
            format!("Верификация пользователя {} снята.", user_id)
        } else {
            format!("У пользователя {} нет активной верификации.", user_id)
        },
    )
    .await?;
    Ok(())
}

async fn cmd_grantpremium(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let (Some(user_id), Some(days)) = (
        nth_arg(&msg, 1).and_then(|raw| raw.parse::<i64>().ok()),
        nth_arg(&msg, 2).and_then(|raw| raw.parse::<i64>().ok()),
    ) else {
        bot.send_message(msg.chat.id, "Использование: /grantpremium <user_id> <дней>")
            .await?;
        return Ok(());
    };
    if days < 1 {
        bot.send_message(msg.chat.id, "Срок должен быть не меньше 1 дня.")
            .await?;
        return Ok(());
    }

    let expiry = state
        .db
        .activate_premium(user_id, days, "manual", state.clock.now())
        .await?;
    bot.send_message(
        msg.chat.id,
        format!(
            "Премиум пользователя {} активен до {}.",
            user_id,
            format_timestamp(expiry)
        ),
    )
    .await?;
    Ok(())
}

async fn cmd_revokepremium(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let Some(user_id) = nth_arg(&msg, 1).and_then(|raw| raw.parse::<i64>().ok()) else {
        bot.send_message(msg.chat.id, "Использование: /revokepremium <user_id>")
            .await?;
        return Ok(());
    };
    let revoked = state.db.revoke_premium(user_id).await?;
    bot.send_message(
        msg.chat.id,
        if revoked {
            format!("Премиум пользователя {} снят.", user_id)
        } else {
            format!("У пользователя {} нет активного премиума.", user_id)
        },
    )
    .await?;
    Ok(())
}

async fn cmd_set(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let (Some(key), value) = (nth_arg(&msg, 1), tail_args(&msg, 2)) else {
        bot.send_message(msg.chat.id, "Использование: /set <ключ> <значение>")
            .await?;
        return Ok(());
    };
    if value.is_empty() {
        let deleted = state.db.delete_setting(&key).await?;
        bot.send_message(
            msg.chat.id,
            if deleted {
                format!("Настройка {} сброшена к значению по умолчанию.", key)
            } else {
                format!("Настройка {} не была задана.", key)
            },
        )
        .await?;
        return Ok(());
    }

    state.db.set_setting(&key, &value, state.clock.now()).await?;
    bot.send_message(msg.chat.id, format!("Настройка {} = {}", key, value))
        .await?;
    Ok(())
}

async fn cmd_settings(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let settings = state.db.list_settings().await?;
    let mut text = String::from("Настройки (переопределяют конфиг):\n");
    if settings.is_empty() {
        text.push_str("— пусто —\n");
    } else {
        for (key, value) in settings {
            text.push_str(&format!("• {} = {}\n", key, value));
        }
    }
    text.push_str(&format!(
        "\nИзвестные ключи: {}, {}, {}, {}, {}, {}, {}, {}",
        settings_keys::FREE_ACCESS_HOURS,
        settings_keys::QR_EXPIRY_MINUTES,
        settings_keys::UPI_ID,
        settings_keys::UPI_NAME,
        settings_keys::UNIQUE_PAISE,
        settings_keys::COUNTDOWN_SECONDS,
        settings_keys::FORCE_SUB_CHANNEL,
        settings_keys::DELETE_AFTER_MINUTES,
    ));
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn cmd_shortener(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let usage = "Использование:\n/shortener add <домен> <api_key>\n/shortener del <домен>\n/shortener list";
    let Some(action) = nth_arg(&msg, 1) else {
        bot.send_message(msg.chat.id, usage).await?;
        return Ok(());
    };

    let mut pool = shortener::load_pool(&state.db).await?;
    match action.as_str() {
        "add" => {
            let (Some(domain), Some(api_key)) = (nth_arg(&msg, 2), nth_arg(&msg, 3)) else {
                bot.send_message(msg.chat.id, usage).await?;
                return Ok(());
            };
            pool.retain(|s| s.domain != domain);
            pool.push(Shortener { domain: domain.clone(), api_key });
            shortener::save_pool(&state.db, &pool, state.clock.now()).await?;
            bot.send_message(msg.chat.id, format!("Шортнер {} добавлен.", domain))
                .await?;
        }
        "del" => {
            let Some(domain) = nth_arg(&msg, 2) else {
                bot.send_message(msg.chat.id, usage).await?;
                return Ok(());
            };
            let before = pool.len();
            pool.retain(|s| s.domain != domain);
            if pool.len() == before {
                bot.send_message(msg.chat.id, format!("Шортнер {} не найден.", domain))
                    .await?;
                return Ok(());
            }
            shortener::save_pool(&state.db, &pool, state.clock.now()).await?;
            bot.send_message(msg.chat.id, format!("Шортнер {} удалён.", domain))
                .await?;
        }
        "list" => {
            if pool.is_empty() {
                bot.send_message(
                    msg.chat.id,
                    "Пул пуст: verify-ссылки выдаются напрямую, без шортнера.",
                )
                .await?;
                return Ok(());
            }
            let lines: Vec<String> = pool.iter().map(|s| format!("• {}", s.domain)).collect();
            bot.send_message(msg.chat.id, format!("Шортнеры:\n{}", lines.join("\n")))
                .await?;
        }
        _ => {
            bot.send_message(msg.chat.id, usage).await?;
        }
    }
    Ok(())
}

async fn cmd_stats(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let stats = state.db.stats(state.clock.now()).await?;
    bot.send_message(msg.chat.id, render_stats(&stats)).await?;
    Ok(())
}

async fn cmd_broadcast(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let text = tail_args(&msg, 1);
    if text.is_empty() {
        bot.send_message(msg.chat.id, "Использование: /broadcast <текст>")
            .await?;
        return Ok(());
    }

    let report = broadcast(&state, &text).await?;
    bot.send_message(
        msg.chat.id,
        format!(
            "Рассылка завершена: доставлено {}, не доставлено {}.",
            report.sent, report.failed
        ),
    )
    .await?;
    Ok(())
}

/// Рассылка через пользовательского бота. Заблокировавшие бота попадают в
/// `failed`, рассылка не прерывается.
pub async fn broadcast(state: &BotState, text: &str) -> Result<BroadcastReport, anyhow::Error> {
    let mut report = BroadcastReport::default();
    for user_id in state.db.list_user_ids().await? {
        match state
            .user_bot
            .send_message(ChatId(user_id), text.to_string())
            .await
        {
            Ok(_) => report.sent += 1,
            Err(e) => {
                report.failed += 1;
                tracing::debug!(user_id, "broadcast send failed: {}", e);
            }
        }
    }
    tracing::info!(sent = report.sent, failed = report.failed, "broadcast done");
    Ok(report)
}

/// Документ от админа публикуется как файл: номер поста, ссылка get_ и
/// готовый шаблон для канала.
async fn handle_document_upload(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let Some(document) = msg.document() else {
        return Ok(());
    };
    let Some(admin_id) = sender_user_id(&msg) else {
        return Ok(());
    };

    let file_id = document.file.id.0.clone();
    let description = msg.caption().unwrap_or("").trim().to_string();

    let mut raw = [0u8; 8];
    rand::rng().fill_bytes(&mut raw);
    let file_db_id = hex::encode(raw);

    let post_no = state.db.next_post_no().await?;
    state
        .db
        .insert_file(
            &file_db_id,
            &file_id,
            post_no,
            &description,
            "",
            None,
            state.clock.now(),
        )
        .await?;

    let get_token = state.protocol.encode_token(&TokenPayload::FileGet {
        file_id: file_id.clone(),
        post_no,
    })?;
    let get_link = build_start_link(
        &state.config.bot_username,
        &format!("{}{}", token::PREFIX_GET, get_token),
    );

    let title = if description.is_empty() {
        format!("Файл #{}", post_no)
    } else {
        description.clone()
    };
    bot.send_message(
        msg.chat.id,
        format!(
            "✅ Файл #{} сохранён.\n\nШаблон для поста в канале:\n\n{}\n\n📥 Скачать: {}",
            post_no, title, get_link
        ),
    )
    .await?;

    tracing::info!(admin_id, post_no, "file stored");
    Ok(())
}
