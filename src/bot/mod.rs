//! Обработчики двух ботов: пользовательского (выдача файлов, верификация,
//! покупка премиума) и админского (файлы, планы, заказы, настройки).

pub mod admin;
mod format;
pub mod keyboards;
mod shared;
mod state;
pub mod user;

pub use state::BotState;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
