use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, Recipient, UserId};

use super::keyboards;
use super::state::BotState;
use crate::db::{FileRecord, settings_keys};
use crate::token::{self, TokenPayload, build_start_link};

/// Проверка обязательной подписки. `Ok(Some(channel))` — пользователь не
/// подписан. Ошибка Telegram (бот не админ канала, канал удалён) трактуется
/// как «подписан»: кривая настройка не должна запирать выдачу всем.
pub async fn check_force_sub(
    bot: &Bot,
    state: &BotState,
    user_id: i64,
) -> Result<Option<String>, anyhow::Error> {
    let Some(channel) = state
        .db
        .get_setting(settings_keys::FORCE_SUB_CHANNEL)
        .await?
        .filter(|c| !c.trim().is_empty())
    else {
        return Ok(None);
    };

    let channel = if channel.starts_with('@') {
        channel
    } else {
        format!("@{}", channel)
    };

    match bot
        .get_chat_member(
            Recipient::ChannelUsername(channel.clone()),
            UserId(user_id as u64),
        )
        .await
    {
        Ok(member) if member.is_present() => Ok(None),
        Ok(_) => Ok(Some(channel)),
        Err(e) => {
            tracing::warn!(channel = %channel, "force-sub check failed: {}", e);
            Ok(None)
        }
    }
}

pub async fn send_join_prompt(
    bot: &Bot,
    chat_id: ChatId,
    channel: &str,
) -> Result<(), anyhow::Error> {
    bot.send_message(
        chat_id,
        "Для получения файлов подпишитесь на наш канал, затем запросите файл ещё раз.",
    )
    .reply_markup(keyboards::join_channel_keyboard(channel))
    .await?;
    Ok(())
}

/// Выдаёт файл: документ с описанием, затем сообщение с click-ссылкой на
/// повторную выдачу. Оба сообщения встают в очередь автоудаления.
pub async fn deliver_file(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    user_id: i64,
    file: &FileRecord,
) -> Result<(), anyhow::Error> {
    let delete_minutes = state
        .db
        .setting_i64(
            settings_keys::DELETE_AFTER_MINUTES,
            state.config.delete_after_minutes,
        )
        .await?;

    let mut document = bot.send_document(chat_id, InputFile::file_id(FileId(file.file_id.clone())));
    if !file.description.trim().is_empty() {
        document = document.caption(file.description.clone());
    }
    let doc_msg = document.await?;

    let click_token = state.protocol.encode_token(&TokenPayload::ClickHere {
        file_id: file.file_id.clone(),
        post_no: file.post_no,
    })?;
    let click_link = build_start_link(
        &state.config.bot_username,
        &format!("{}{}", token::PREFIX_CLICK, click_token),
    );

    let mut warn_text = format!(
        "⚠️ Файл будет удалён из чата через {} мин. Сохраните его или \
         воспользуйтесь кнопкой ниже, чтобы получить его снова.",
        delete_minutes
    );
    if !file.extra_message.trim().is_empty() {
        warn_text.push_str("\n\n");
        warn_text.push_str(file.extra_message.trim());
    }
    let warn_msg = bot
        .send_message(chat_id, warn_text)
        .reply_markup(keyboards::redelivery_keyboard(&click_link))
        .await?;

    state
        .db
        .record_delivery(
            user_id,
            chat_id.0,
            doc_msg.id.0 as i64,
            warn_msg.id.0 as i64,
            &file.file_id,
            file.post_no,
            state.clock.now() + delete_minutes * 60,
        )
        .await?;

    tracing::info!(user_id, post_no = file.post_no, "file delivered");
    Ok(())
}

/// Экран верификации: свежий verify-токен, URL redirect-сервера, обёртка
/// шортнером, кнопка.
pub async fn send_verification_screen(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    user_id: i64,
    file_id: Option<String>,
    post_no: Option<i64>,
) -> Result<(), anyhow::Error> {
    let verify_token = state.protocol.issue(user_id, file_id, post_no)?;
    let target_url = format!(
        "{}/redirect?token={}",
        state.config.redirect_base.trim_end_matches('/'),
        urlencoding::encode(&verify_token)
    );
    let short_url = crate::shortener::wrap_verify_url(&state.db, &target_url).await?;

    let free_hours = state
        .db
        .setting_i64(
            settings_keys::FREE_ACCESS_HOURS,
            state.config.free_access_hours,
        )
        .await?;

    bot.send_message(
        chat_id,
        format!(
            "🔒 Доступ к файлам закрыт.\n\n\
             Пройдите проверку по кнопке ниже и получите бесплатный доступ \
             на {} ч. Либо купите премиум и забудьте о проверках.",
            free_hours
        ),
    )
    .reply_markup(keyboards::verify_keyboard(&short_url))
    .await?;
    Ok(())
}

/// Рассылает текст всем админам, ошибки отдельных отправок не фатальны.
pub async fn notify_admins(bot: &Bot, state: &BotState, text: &str) {
    for admin_id in &state.config.admin_ids {
        if let Err(e) = bot.send_message(ChatId(*admin_id), text.to_string()).await {
            tracing::warn!(admin_id = *admin_id, "admin notify failed: {}", e);
        }
    }
}
