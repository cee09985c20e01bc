use {
    clap::Subcommand,
    sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use {huddle_config::HuddleConfig, huddle_memory::MemoryStore};

#[derive(Subcommand)]
pub enum MemoryAction {
    /// Print a digest of a user's recent memories.
    Summary {
        /// User id.
        user: String,
    },
    /// Delete all stored memories for a user.
    Clear {
        /// User id.
        user: String,
    },
}

pub async fn run(config: &HuddleConfig, action: MemoryAction) -> anyhow::Result<()> {
    let options = SqliteConnectOptions::new()
        .filename(&config.memory.db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    let store = MemoryStore::new(pool, config.memory.max_items_per_user);
    store.init().await?;

    match action {
        MemoryAction::Summary { user } => {
            println!("{}", store.summary(&user).await?);
            let conversations = store.conversation_count(&user).await?;
            println!("archived conversations: {conversations}");
        },
        MemoryAction::Clear { user } => {
            let removed = store.clear_user(&user).await?;
            println!("removed {removed} memories for {user}");
        },
    }
    Ok(())
}
