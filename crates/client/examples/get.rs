use micro_client::{ClientError, RequestOptions, SyncHttpClient};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

// cargo run --example get -- https://httpbin.org/get
fn main() -> Result<(), ClientError> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let url = std::env::args().nth(1).unwrap_or_else(|| String::from("https://httpbin.org/get"));
    let client = SyncHttpClient::new()?;

    let options = RequestOptions::new(url).query_param("hello", "micro client").user_agent("micro-client-example/0.3");
    let response = client.get(options)?;

    info!(status = %response.status(), content_encoding = ?response.content_encoding(), "received response");
    for (name, value) in response.headers() {
        println!("{name}: {value:?}");
    }
    match response.body().as_text() {
        Some(text) => println!("\n{text}"),
        None => println!("\n<{} bytes of binary body>", response.body().as_bytes().map_or(0, <[u8]>::len)),
    }
    Ok(())
}
