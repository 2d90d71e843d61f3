#[tokio::main]
async fn main() {
    if let Err(err) = relay::http::proxy::run().await {
        eprintln!("local-server: {}", err);
        std::process::exit(1);
    }
}
