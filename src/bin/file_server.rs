#[tokio::main]
async fn main() {
    if let Err(err) = relay::http::file_server::run().await {
        eprintln!("file-server: {}", err);
        std::process::exit(1);
    }
}
