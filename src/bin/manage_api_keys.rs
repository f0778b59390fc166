//! Administer API keys: `manage-api-keys <add [key]|list|activate|deactivate|delete> ...`

use anyhow::{anyhow, Result};
use std::env;
use std::process;

use pinnacle_analytics::config::normalize_database_url;
use pinnacle_analytics::db::{self, ApiKey, PgApiKeyStore};

const USAGE: &str = "\
Usage:
  manage-api-keys add [key]        # Add a new API key
  manage-api-keys list             # List all API keys
  manage-api-keys activate <key>   # Activate an API key
  manage-api-keys deactivate <key> # Deactivate an API key
  manage-api-keys delete <key>     # Delete an API key";

fn fail(message: impl AsRef<str>) -> ! {
    eprintln!("Error: {}", message.as_ref());
    process::exit(1);
}

fn status(key: &ApiKey) -> &'static str {
    if key.is_active {
        "Active"
    } else {
        "Inactive"
    }
}

fn required_key(args: &[String], action: &str) -> String {
    match args.get(2) {
        Some(key) => key.clone(),
        None => fail(format!("Please provide the API key to {}", action)),
    }
}

async fn add(store: &PgApiKeyStore, key: Option<String>) -> Result<()> {
    let key = key.unwrap_or_else(db::generate_api_key);

    if store.find(&key).await?.is_some() {
        fail(format!("API key already exists: {}", key));
    }

    let created = store.insert(&key).await?;
    println!("API key added successfully: {}", created.key);
    println!("  Status: {}", status(&created));
    println!("  Created: {}", created.created_at);
    Ok(())
}

async fn list(store: &PgApiKeyStore) -> Result<()> {
    let keys = store.list().await?;
    if keys.is_empty() {
        println!("No API keys found.");
        return Ok(());
    }

    println!("Found {} API key(s):", keys.len());
    for key in &keys {
        println!("  - {}", key.key);
        println!("    ID: {}", key.id);
        println!("    Status: {}", status(key));
        println!("    Created: {}", key.created_at);
    }
    Ok(())
}

async fn set_active(store: &PgApiKeyStore, key: &str, is_active: bool) -> Result<()> {
    if !store.set_active(key, is_active).await? {
        fail(format!("API key not found: {}", key));
    }
    let verb = if is_active { "activated" } else { "deactivated" };
    println!("API key {} successfully: {}", verb, key);
    Ok(())
}

async fn delete(store: &PgApiKeyStore, key: &str) -> Result<()> {
    if !store.delete(key).await? {
        fail(format!("API key not found: {}", key));
    }
    println!("API key deleted successfully: {}", key);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1).cloned() else {
        println!("{}", USAGE);
        process::exit(1);
    };

    let _ = dotenvy::dotenv();
    let database_url = env::var("DATABASE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("DATABASE_URL is not set"))?;

    let pool = db::connect_db_with_retry(&normalize_database_url(database_url.trim()), 3).await?;
    db::run_migrations(&pool).await?;
    let store = PgApiKeyStore::new(pool);

    match command.as_str() {
        "add" => add(&store, args.get(2).cloned()).await,
        "list" => list(&store).await,
        "activate" => set_active(&store, &required_key(&args, "activate"), true).await,
        "deactivate" => set_active(&store, &required_key(&args, "deactivate"), false).await,
        "delete" => delete(&store, &required_key(&args, "delete")).await,
        other => fail(format!("Unknown command '{}'", other)),
    }
}
