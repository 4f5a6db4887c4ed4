use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use taskdeck_http::{CachedResource, Keyed, TaskDeckClient};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Deserialize)]
struct Task {
    id: u64,
    title: String,
    status: String,
}

impl Keyed for Task {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = TaskDeckClient::from_env()?;
    let tasks = CachedResource::<Task>::with_ttl(client, "/tasks", Duration::from_secs(30));

    let listed = tasks.list().await?;
    println!("{} tasks (network)", listed.len());

    let listed = tasks.list().await?;
    println!("{} tasks (cache: {:?})", listed.len(), tasks.cache().state());

    if let Some(first) = listed.first() {
        let updated = tasks
            .update(&first.id, &json!({ "title": first.title, "status": "done" }))
            .await?;
        println!("updated {} -> {}", updated.id, updated.status);
    }

    Ok(())
}
