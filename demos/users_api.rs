//! A hand-written adapter over a typed resource handle.
//!
//! This example shows how to:
//! - Declare a resource and its routes
//! - Wrap an `ApiHandle` in an adapter with one method per operation
//! - Observe lifecycle events through a channel
//! - Inspect success payloads, failure responses and metadata
//!
//! Run with: `cargo run --example users_api`

use restbind::{
    ApiEvent, ApiHandle, ApiResponse, Arguments, Backoff, ChannelSink, Client,
    ConnectionSettings, Error, Resource, ResourceSchema, ResourceSchemaBuilder, RouteSchema,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

struct Posts;

impl Resource for Posts {
    fn describe() -> ResourceSchemaBuilder {
        ResourceSchema::builder("posts")
            .route(RouteSchema::get("get", "{id}").path("id"))
            .route(RouteSchema::get("by_user", "").query_as("user_id", "userId"))
            .route(RouteSchema::post("create", "").body("post"))
            .route(RouteSchema::delete("delete", "{id}").path("id"))
    }
}

struct PostsApi {
    handle: ApiHandle<Posts>,
}

impl PostsApi {
    async fn get(&self, id: u32) -> restbind::Result<ApiResponse<Post>> {
        self.handle.invoke("get", &Arguments::new().arg("id", id)).await
    }

    async fn by_user(&self, user_id: u32) -> restbind::Result<ApiResponse<Vec<Post>>> {
        self.handle
            .invoke("by_user", &Arguments::new().arg("user_id", user_id))
            .await
    }

    async fn create(&self, post: &NewPost) -> restbind::Result<ApiResponse<Post>> {
        self.handle
            .invoke("create", &Arguments::new().json("post", post)?)
            .await
    }

    async fn delete(&self, id: u32) -> restbind::Result<ApiResponse<()>> {
        self.handle
            .invoke_void("delete", &Arguments::new().arg("id", id))
            .await
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("restbind=debug,users_api=info")
        .init();

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if let ApiEvent::ResponseReceived {
                request_id,
                status,
                elapsed,
                ..
            } = event
            {
                println!("  [event] {} -> {} in {:?}", request_id, status, elapsed);
            }
        }
    });

    let settings = ConnectionSettings::builder()
        .base_address("https://jsonplaceholder.typicode.com/")?
        .timeout(Duration::from_secs(10))
        .retry_attempts(3)
        .backoff(Backoff::Exponential {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            jitter: true,
        })
        .build()?;

    let client = Client::builder()
        .settings(settings)
        .event_sink(ChannelSink::new(events_tx))
        .build()?;

    let posts = PostsApi {
        handle: client.handle::<Posts>()?,
    };

    println!("=== GET ===");
    match posts.get(1).await? {
        ApiResponse::Success(success) => {
            println!("Title: {}", success.payload.title);
            println!("Latency: {:?}", success.meta.latency);
        }
        ApiResponse::Failure(failure) => println!("Failed: {} {}", failure.status, failure.message),
    }

    println!("\n=== GET with query ===");
    let response = posts.by_user(2).await?;
    println!(
        "User 2 has {} posts",
        response.payload().map(Vec::len).unwrap_or_default()
    );

    println!("\n=== POST ===");
    let created = posts
        .create(&NewPost {
            title: "My New Post".to_string(),
            body: "This is the content of my new post!".to_string(),
            user_id: 1,
        })
        .await?;
    println!("Status: {}", created.status());
    if let Some(post) = created.payload() {
        println!("Created post with ID: {}", post.id);
    }

    println!("\n=== DELETE ===");
    let deleted = posts.delete(1).await?;
    println!("Status: {}, attempts: {}", deleted.status(), deleted.meta().attempts);

    println!("\n=== Missing resource ===");
    let missing = posts.get(9999).await?;
    if let Some(failure) = missing.failure() {
        println!("Status: {}", failure.status);
        println!("Raw body: {}", failure.meta.raw_body);
    }

    drop(posts);
    drop(client);
    let _ = printer.await;

    Ok(())
}
