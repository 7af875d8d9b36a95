use std::io::Read;

use micro_client::{AsyncHttpClient, RequestOptions, ResponseBody, ResponseBodyType};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

// cargo run --example stream -- https://httpbin.org/stream-bytes/1048576
fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let url = std::env::args().nth(1).unwrap_or_else(|| String::from("https://httpbin.org/stream-bytes/1048576"));
    let client = AsyncHttpClient::new().expect("reactor should start");

    let options = RequestOptions::new(url).response_type(ResponseBodyType::Stream).pipe_capacity(4);
    let promise = match client.request(options) {
        Ok(promise) => promise,
        Err(e) => {
            error!(cause = %e, "invalid request");
            return;
        }
    };

    // the promise is fulfilled as soon as the response head arrives
    let response = match promise.wait() {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            error!(cause = %e, "request failed");
            return;
        }
        Err(e) => {
            error!(cause = %e, "waiting failed");
            return;
        }
    };
    info!(status = %response.status(), "response head received, reading body");

    let ResponseBody::Stream(mut body) = response.into_body() else {
        error!("expected a streamed body");
        return;
    };

    let mut buf = vec![0u8; 16 * 1024];
    let mut total = 0usize;
    loop {
        match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) => {
                error!(cause = %e, read = total, "body stream failed");
                return;
            }
        }
    }
    info!(bytes = total, "body complete");
}
