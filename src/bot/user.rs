//! Пользовательский бот: deep-link выдача файлов, верификация через
//! redirect-сервер, покупка премиума по UPI QR.

use teloxide::dispatching::DpHandlerDescription;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use teloxide::utils::command::BotCommands;

use super::HandlerResult;
use super::format::{format_date, format_timestamp};
use super::keyboards::{self, BTN_USER_HELP, BTN_USER_PREMIUM, BTN_USER_STATUS};
use super::shared::{
    check_force_sub, deliver_file, notify_admins, send_join_prompt, send_verification_screen,
};
use super::state::{
    BotState, callback_message_target, callback_prefix_filter, sender_display_name,
    sender_user_id, sender_username,
};
use crate::db::{OrderStatus, settings_keys};
use crate::entitlement;
use crate::payments;
use crate::token::{self, DeepLink, TokenError, TokenPayload, build_start_link, parse_start_arg};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum UserCommand {
    #[command(description = "Начать работу с ботом")]
    Start,
    #[command(description = "Справка")]
    Help,
}

pub fn schema() -> dptree::Handler<
    'static,
    Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>,
    DpHandlerDescription,
> {
    let commands = teloxide::filter_command::<UserCommand, _>()
        .branch(dptree::case![UserCommand::Start].endpoint(cmd_start))
        .branch(dptree::case![UserCommand::Help].endpoint(cmd_help));

    let messages = Update::filter_message()
        .branch(commands)
        .endpoint(handle_menu_buttons);

    dptree::entry().branch(messages).branch(callbacks())
}

fn callbacks() -> teloxide::dispatching::UpdateHandler<
    Box<dyn std::error::Error + Send + Sync + 'static>,
> {
    Update::filter_callback_query()
        .branch(dptree::filter_map(callback_prefix_filter("getpremium")).endpoint(callback_plans))
        .branch(dptree::filter_map(callback_prefix_filter("buyplan:")).endpoint(callback_buy_plan))
        .branch(
            dptree::filter_map(callback_prefix_filter("verifyorder:"))
                .endpoint(callback_verify_order),
        )
        .branch(dptree::filter_map(callback_prefix_filter("close")).endpoint(callback_close))
}

async fn cmd_start(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Some(user_id) = sender_user_id(&msg) else {
        return Ok(());
    };
    state
        .db
        .ensure_user(
            user_id,
            sender_username(&msg).as_deref(),
            sender_display_name(&msg).as_deref(),
            state.clock.now(),
        )
        .await?;

    let text = msg.text().unwrap_or("");
    if let Some(arg) = parse_start_arg(text) {
        tracing::info!(user_id, "deep link /start");
        let Some(link) = DeepLink::parse(&arg) else {
            bot.send_message(msg.chat.id, "Ссылка не распознана или устарела.")
                .await?;
            return Ok(());
        };

        match link {
            DeepLink::FileGet(token) | DeepLink::ClickHere(token) => {
                handle_file_request(&bot, &state, msg.chat.id, user_id, &token).await?;
            }
            DeepLink::Verify(token) => {
                handle_verify(&bot, &state, msg.chat.id, user_id, &token).await?;
            }
            DeepLink::Verified(signed) => {
                handle_verified(&bot, &state, msg.chat.id, user_id, &signed).await?;
            }
            DeepLink::Bypass(signed) => {
                handle_bypass(&bot, &state, msg.chat.id, user_id, &signed).await?;
            }
            DeepLink::Pay(order_id) => {
                handle_pay_return(&bot, &state, msg.chat.id, &order_id).await?;
            }
        }
        return Ok(());
    }

    bot.send_message(
        msg.chat.id,
        "Привет! Этот бот выдаёт файлы по ссылкам из нашего канала.\n\
         Откройте пост с файлом и нажмите кнопку получения, либо купите \
         премиум для доступа без проверок.",
    )
    .reply_markup(keyboards::user_menu())
    .await?;
    Ok(())
}

async fn cmd_help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "Как это работает:\n\
         1) Откройте пост с файлом в канале и нажмите кнопку получения.\n\
         2) Пройдите короткую проверку по ссылке — бот выдаст файл и \
         бесплатный доступ на несколько часов.\n\
         3) Премиум снимает проверки на весь срок подписки: кнопка «💎 Премиум».",
    )
    .reply_markup(keyboards::user_menu())
    .await?;
    Ok(())
}

/// Выдача по get_/click_ токену: подписка, запись файла, право на выдачу.
async fn handle_file_request(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    user_id: i64,
    token: &str,
) -> HandlerResult {
    let post_no = match state.protocol.decode_token(token) {
        Ok(TokenPayload::FileGet { post_no, .. })
        | Ok(TokenPayload::ClickHere { post_no, .. }) => post_no,
        _ => {
            bot.send_message(chat_id, "Ссылка не распознана или устарела.")
                .await?;
            return Ok(());
        }
    };

    if let Some(channel) = check_force_sub(bot, state, user_id).await? {
        send_join_prompt(bot, chat_id, &channel).await?;
        return Ok(());
    }

    // Запись в базе первична: файл могли удалить после публикации поста.
    let Some(file) = state.db.get_file_by_post(post_no).await? else {
        bot.send_message(chat_id, "Файл больше не доступен.").await?;
        return Ok(());
    };

    let user = state.db.get_user(user_id).await?;
    let entitlements = entitlement::evaluate(user.as_ref(), state.clock.now());
    if entitlements.may_deliver() {
        deliver_file(bot, state, chat_id, user_id, &file).await?;
    } else {
        send_verification_screen(
            bot,
            state,
            chat_id,
            user_id,
            Some(file.file_id.clone()),
            Some(file.post_no),
        )
        .await?;
    }
    Ok(())
}

async fn handle_verify(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    user_id: i64,
    token: &str,
) -> HandlerResult {
    // Чужой или порченый verify-токен просто игнорируется: экран строится
    // на свежем токене для отправителя.
    let (file_id, post_no) = match state.protocol.decode_token(token) {
        Ok(TokenPayload::Verify {
            user_id: owner,
            file_id,
            post_no,
        }) if owner == user_id => (file_id, post_no),
        _ => (None, None),
    };

    send_verification_screen(bot, state, chat_id, user_id, file_id, post_no).await?;
    Ok(())
}

async fn handle_verified(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    user_id: i64,
    signed: &str,
) -> HandlerResult {
    let payload = match state.protocol.consume(signed) {
        Ok(payload) => payload,
        Err(TokenError::Invalid) | Err(TokenError::Encode) => {
            bot.send_message(chat_id, "Ссылка не распознана или устарела.")
                .await?;
            return Ok(());
        }
    };
    // Пересланная чужая verified-ссылка доступ пересылающему не даёт.
    let (owner, post_no) = match payload {
        TokenPayload::Verified {
            user_id: owner,
            post_no,
            ..
        } => (owner, post_no),
        _ => {
            bot.send_message(chat_id, "Ссылка не распознана или устарела.")
                .await?;
            return Ok(());
        }
    };
    if owner != user_id {
        bot.send_message(chat_id, "Эта ссылка выдана другому пользователю.")
            .await?;
        return Ok(());
    }

    let until = state.protocol.grant_free_access(user_id).await?;
    bot.send_message(
        chat_id,
        format!(
            "✅ Проверка пройдена! Бесплатный доступ открыт до {}.",
            format_timestamp(until)
        ),
    )
    .await?;

    if let Some(post_no) = post_no {
        if let Some(channel) = check_force_sub(bot, state, user_id).await? {
            send_join_prompt(bot, chat_id, &channel).await?;
            return Ok(());
        }
        if let Some(file) = state.db.get_file_by_post(post_no).await? {
            deliver_file(bot, state, chat_id, user_id, &file).await?;
        }
    }
    Ok(())
}

async fn handle_bypass(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    user_id: i64,
    signed: &str,
) -> HandlerResult {
    let (owner, file_id, post_no) = match state.protocol.consume(signed) {
        Ok(TokenPayload::Bypass {
            user_id: owner,
            file_id,
            post_no,
        }) => (owner, file_id, post_no),
        _ => {
            bot.send_message(chat_id, "Ссылка не распознана или устарела.")
                .await?;
            return Ok(());
        }
    };
    if owner != user_id {
        bot.send_message(chat_id, "Эта ссылка выдана другому пользователю.")
            .await?;
        return Ok(());
    }

    state
        .db
        .log_bypass(
            user_id,
            signed,
            file_id.as_deref(),
            post_no,
            state.clock.now(),
        )
        .await?;
    tracing::warn!(user_id, "bypass deep link consumed");

    let text = "🚫 Обнаружен обход проверки.\n\n\
                Похоже, вы пропустили страницу проверки. Доступ не выдан. \
                Пройдите ссылку полностью, не закрывая промежуточные страницы.";
    if let (Some(file_id), Some(post_no)) = (file_id, post_no) {
        let get_token = state
            .protocol
            .encode_token(&TokenPayload::FileGet { file_id, post_no })?;
        let get_link = build_start_link(
            &state.config.bot_username,
            &format!("{}{}", token::PREFIX_GET, get_token),
        );
        bot.send_message(chat_id, text)
            .reply_markup(keyboards::try_again_keyboard(&get_link))
            .await?;
    } else {
        bot.send_message(chat_id, text).await?;
    }
    Ok(())
}

/// Возврат из UPI-приложения по pay_ ссылке: показывает статус заказа.
async fn handle_pay_return(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    order_id: &str,
) -> HandlerResult {
    let Some(order) = state.db.get_order(order_id).await? else {
        bot.send_message(chat_id, "Заказ не найден.").await?;
        return Ok(());
    };
    match order.status {
        OrderStatus::Paid => {
            bot.send_message(chat_id, "✅ Оплата подтверждена, премиум активен.")
                .await?;
        }
        OrderStatus::Pending => {
            bot.send_message(
                chat_id,
                format!(
                    "⏳ Заказ {} ожидает подтверждения. Если вы уже оплатили, \
                     нажмите кнопку ниже.",
                    order.order_id
                ),
            )
            .reply_markup(keyboards::order_keyboard(&order.order_id))
            .await?;
        }
        OrderStatus::Expired | OrderStatus::Refunded => {
            bot.send_message(chat_id, "Заказ закрыт. Создайте новый через «💎 Премиум».")
                .await?;
        }
    }
    Ok(())
}

async fn handle_menu_buttons(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Some(user_id) = sender_user_id(&msg) else {
        return Ok(());
    };
    match msg.text() {
        Some(BTN_USER_PREMIUM) => show_plans(&bot, &state, msg.chat.id).await,
        Some(BTN_USER_STATUS) => show_status(&bot, &state, msg.chat.id, user_id).await,
        Some(BTN_USER_HELP) => cmd_help(bot, msg).await,
        _ => Ok(()),
    }
}

async fn show_plans(bot: &Bot, state: &BotState, chat_id: ChatId) -> HandlerResult {
    let plans = state.db.list_plans().await?;
    if plans.is_empty() {
        bot.send_message(chat_id, "Премиум-планы пока не настроены.")
            .await?;
        return Ok(());
    }
    bot.send_message(
        chat_id,
        "💎 Премиум снимает проверки на весь срок подписки.\nВыберите план:",
    )
    .reply_markup(keyboards::plans_keyboard(&plans))
    .await?;
    Ok(())
}

async fn show_status(bot: &Bot, state: &BotState, chat_id: ChatId, user_id: i64) -> HandlerResult {
    let user = state.db.get_user(user_id).await?;
    let now = state.clock.now();
    let entitlements = entitlement::evaluate(user.as_ref(), now);

    let premium_line = match user.as_ref().and_then(|u| u.premium_expiry) {
        Some(expiry) if entitlements.premium_active => {
            format!("Премиум: активен до {}", format_timestamp(expiry))
        }
        _ => "Премиум: нет".to_string(),
    };
    let verify_line = match user.as_ref().and_then(|u| u.verified_until) {
        Some(until) if entitlements.verification_active => {
            format!("Бесплатный доступ: до {}", format_timestamp(until))
        }
        _ => "Бесплатный доступ: нет".to_string(),
    };

    bot.send_message(chat_id, format!("📊 Ваш статус:\n{}\n{}", premium_line, verify_line))
        .reply_markup(keyboards::user_menu())
        .await?;
    Ok(())
}

async fn callback_plans(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    if let Some((chat_id, _)) = callback_message_target(&q) {
        show_plans(&bot, &state, chat_id).await?;
    }
    Ok(())
}

async fn callback_buy_plan(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    let user_id = q.from.id.0 as i64;
    let Some((chat_id, _)) = callback_message_target(&q) else {
        return Ok(());
    };
    let plan_id = q
        .data
        .as_deref()
        .and_then(|data| data.strip_prefix("buyplan:"))
        .unwrap_or("")
        .to_string();

    let Some(plan) = state.db.get_plan(&plan_id).await? else {
        bot.answer_callback_query(q.id.clone())
            .text("План больше не доступен")
            .show_alert(true)
            .await?;
        return Ok(());
    };

    let Some(upi_id) = state
        .db
        .get_setting(settings_keys::UPI_ID)
        .await?
        .filter(|v| !v.trim().is_empty())
    else {
        bot.answer_callback_query(q.id.clone())
            .text("Оплата временно недоступна")
            .show_alert(true)
            .await?;
        return Ok(());
    };
    let upi_name = state
        .db
        .get_setting(settings_keys::UPI_NAME)
        .await?
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "FileGate".to_string());

    let unique_paise = state
        .db
        .setting_i64(settings_keys::UNIQUE_PAISE, 1)
        .await?
        != 0;
    let amount = if unique_paise {
        payments::apply_unique_paise(plan.price, user_id)
    } else {
        plan.price
    };

    let qr_minutes = state
        .db
        .setting_i64(
            settings_keys::QR_EXPIRY_MINUTES,
            state.config.qr_expiry_minutes,
        )
        .await?;

    let order_id = payments::generate_order_id();
    let order = state
        .db
        .create_order(
            &order_id,
            user_id,
            &plan.plan_id,
            amount,
            qr_minutes,
            state.config.confirm_window_hours,
            state.clock.now(),
        )
        .await?;

    let upi_url = payments::build_upi_url(&upi_id, &upi_name, amount, &order.order_id);
    let qr_png = payments::qr_png_bytes(&upi_url)?;

    bot.answer_callback_query(q.id.clone()).await?;
    bot.send_photo(
        chat_id,
        InputFile::memory(qr_png).file_name(format!("{}.png", order.order_id)),
    )
    .caption(format!(
        "🧾 Заказ {}\n\
         План: {} ({} дн.)\n\
         Сумма: ₹{:.2} (оплатите точную сумму)\n\
         QR действует до {}\n\n\
         Отсканируйте QR любым UPI-приложением или откройте ссылку:\n{}\n\n\
         После оплаты нажмите «✅ Я оплатил».",
        order.order_id,
        plan.name,
        plan.days,
        amount,
        format_date(order.expires_at),
        upi_url
    ))
    .reply_markup(keyboards::order_keyboard(&order.order_id))
    .await?;

    tracing::info!(user_id, order_id = %order.order_id, plan_id = %plan.plan_id, "order created");
    Ok(())
}

async fn callback_verify_order(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    let user_id = q.from.id.0 as i64;
    let order_id = q
        .data
        .as_deref()
        .and_then(|data| data.strip_prefix("verifyorder:"))
        .unwrap_or("")
        .to_string();

    let Some(order) = state.db.get_order(&order_id).await? else {
        bot.answer_callback_query(q.id.clone())
            .text("Заказ не найден")
            .show_alert(true)
            .await?;
        return Ok(());
    };

    match order.status {
        OrderStatus::Paid => {
            bot.answer_callback_query(q.id.clone())
                .text("Оплата уже подтверждена")
                .show_alert(true)
                .await?;
        }
        OrderStatus::Pending => {
            bot.answer_callback_query(q.id.clone())
                .text("Заявка отправлена администратору")
                .await?;
            notify_admins(
                &bot,
                &state,
                &format!(
                    "💰 Пользователь {} сообщил об оплате заказа {} (₹{:.2}, план {}).\n\
                     Проверьте поступление и выполните /confirm {}",
                    user_id, order.order_id, order.amount, order.plan_id, order.order_id
                ),
            )
            .await;
            if let Some((chat_id, _)) = callback_message_target(&q) {
                bot.send_message(
                    chat_id,
                    "⏳ Мы проверяем оплату. Премиум активируется после \
                     подтверждения администратором.",
                )
                .await?;
            }
        }
        OrderStatus::Expired | OrderStatus::Refunded => {
            bot.answer_callback_query(q.id.clone())
                .text("Заказ закрыт, создайте новый")
                .show_alert(true)
                .await?;
        }
    }
    Ok(())
}

async fn callback_close(bot: Bot, q: CallbackQuery) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    if let Some((chat_id, message_id)) = callback_message_target(&q) {
        // Сообщение могли удалить раньше нас.
        let _ = bot.delete_message(chat_id, message_id).await;
    }
    Ok(())
}
