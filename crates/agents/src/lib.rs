//! Model backend: an OpenAI-compatible chat-completions client (DeepSeek by
//! default) plus persona loading.

pub mod chat;
pub mod persona;

pub use {chat::ChatClient, persona::load_persona};
