use crate::clock::Clock;
use crate::config::Config;
use crate::db::Db;
use crate::verification::VerificationProtocol;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::Message;

/// Общее состояние обоих ботов. Админ-бот и пользовательский бот делят
/// базу, секрет и часы, различаются только токеном Telegram.
#[derive(Clone)]
pub struct BotState {
    pub config: Arc<Config>,
    pub db: Arc<Db>,
    pub protocol: Arc<VerificationProtocol>,
    pub clock: Arc<dyn Clock>,
    /// Бот, от имени которого пишут конечным пользователям. В админ-боте
    /// это отдельный клиент с токеном пользовательского бота: пользователи
    /// админ-бота не запускали.
    pub user_bot: Bot,
}

pub fn sender_user_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().map(|user| user.id.0 as i64)
}

pub fn sender_username(msg: &Message) -> Option<String> {
    msg.from.as_ref().and_then(|user| user.username.clone())
}

pub fn sender_display_name(msg: &Message) -> Option<String> {
    msg.from.as_ref().map(|user| {
        let mut full_name = user.first_name.clone();
        if let Some(last_name) = user.last_name.as_deref()
            && !last_name.trim().is_empty()
        {
            full_name.push(' ');
            full_name.push_str(last_name);
        }
        full_name
    })
}

pub fn is_admin_message(msg: &Message, state: &BotState) -> bool {
    sender_user_id(msg).is_some_and(|user_id| state.config.is_admin(user_id))
}

pub fn callback_message_target(q: &CallbackQuery) -> Option<(ChatId, teloxide::types::MessageId)> {
    q.message.as_ref().map(|msg| (msg.chat().id, msg.id()))
}

pub fn callback_prefix_filter(
    prefix: &'static str,
) -> impl Fn(CallbackQuery) -> Option<CallbackQuery> {
    move |q: CallbackQuery| {
        if q.data
            .as_deref()
            .is_some_and(|payload| payload.starts_with(prefix))
        {
            Some(q)
        } else {
            None
        }
    }
}
