#[tokio::main]
async fn main() {
    let code = dak_engine::app::startup::startup().await;
    std::process::exit(code);
}
