use std::env;
use std::error;
use std::process::ExitCode;
use std::time::Duration;

use reqwest::Url;

const DEFAULT_PING_URL: &str = "http://127.0.0.1:8080/ping";

fn main() -> Result<ExitCode, Box<dyn error::Error>> {
    let url = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_PING_URL.to_string());
    let url = Url::parse(&url)?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let response = client.get(url.clone()).send()?;
    if !response.status().is_success() {
        eprintln!("Health check against {} failed with {}", url, response.status());
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
