use serde::Deserialize;
use serde_json::json;
use taskdeck_http::TaskDeckClient;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct Project {
    id: serde_json::Value,
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = TaskDeckClient::from_env()?;
    println!("health: {:?}", client.health().await);

    let created: Option<Project> = client
        .post("/projects", &json!({ "name": "Demo project" }))
        .await?;
    println!("created: {created:?}");

    let projects: Vec<Project> = client.get("/projects", [("status", "active")]).await?;
    for project in &projects {
        println!("{} {}", project.id, project.name);
    }

    client.shutdown();
    Ok(())
}
