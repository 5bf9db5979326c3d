//! Exam cheatsheet bot: a Telegram webhook handler that answers questions
//! (typed or photographed) with a cloud completion model.

pub mod channels;
pub mod cloud;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod media;
