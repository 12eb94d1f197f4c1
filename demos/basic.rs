use std::sync::Arc;
use std::time::Duration;

use webhook_pool::{HttpTransport, Pool, PoolConfig};

#[tokio::main]
async fn main() {
    let config = PoolConfig {
        urls: vec![
            "https://example.com/hooks/primary".to_string(),
            "https://example.com/hooks/secondary".to_string(),
        ],
        rate_limit_interval: Duration::from_millis(200),
        ..PoolConfig::default()
    };

    let mut pool = Pool::start(config, Arc::new(HttpTransport::new()));

    let payload = serde_json::json!({ "content": "build #123 passed" });
    match pool.dispatcher().send(&payload).await {
        Ok(result) => println!("delivered via {}", result.endpoint_id),
        Err(err) => println!("not delivered: {}", err),
    }

    println!("{:#?}", pool.dispatcher().status().await);
    pool.shutdown().await;
}
