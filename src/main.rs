#[tokio::main]
async fn main() {
    buddylink::web_api::run().await;
}
