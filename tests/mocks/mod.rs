pub mod ai;
pub mod chat_source;
pub mod narrator;
