//! filegate — выдача файлов через Telegram с платной подпиской и бесплатной
//! верификацией через redirect-сервер.
//!
//! Четыре процесса поверх одной библиотеки: пользовательский бот, админ-бот,
//! redirect-сервер (axum) и sweeper с периодическими зачистками. Общие для
//! всех: конфиг (TOML), база SQLite и секрет для токенов.

pub mod bot;
pub mod clock;
pub mod config;
pub mod db;
pub mod entitlement;
pub mod jobs;
pub mod payments;
pub mod redirect;
pub mod shortener;
pub mod token;
pub mod verification;
