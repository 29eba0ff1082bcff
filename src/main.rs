//! EmailBill backend
//!
//! Run with: cargo run -- serve
//! Or after build: ./target/release/emailbill serve

#[tokio::main]
async fn main() {
    // Load .env before configuration is read
    let _ = dotenvy::dotenv();

    emailbill::init_logging();

    if let Err(e) = emailbill::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
