//! WeCom (WeChat Work) adapter: inbound callback envelopes and the outbound
//! message client.
//!
//! Message decryption and signature validation are a vendor protocol detail
//! handled in front of this service; the callback parser consumes the
//! decrypted XML form.

pub mod callback;
pub mod client;
pub mod error;

pub use {
    callback::CallbackEnvelope,
    client::WecomClient,
    error::{Error, Result},
};
