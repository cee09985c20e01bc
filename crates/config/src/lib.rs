//! Typed configuration for the huddle gateway.
//!
//! Config is discovered from `./huddle.{toml,yaml,yml,json}` or
//! `~/.config/huddle/`, parsed by extension, and `${ENV_VAR}` placeholders in
//! the raw file are substituted before parsing. Every section has serde
//! defaults so a missing file yields a runnable (if credential-less) config.

mod env_subst;
mod loader;
mod schema;

pub use {
    env_subst::substitute_env,
    loader::{Error as LoadError, config_dir, discover_and_load, find_config_file, load_config},
    schema::{
        DeliveryConfig, HuddleConfig, LlmConfig, MemoryConfig, SchedulerConfig, ServerConfig,
        SessionConfig, WecomConfig,
    },
};
