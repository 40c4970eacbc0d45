/// Smoke-test for `ChromiumDriver`.
///
/// Launches a headless Chromium through a `ResourceSession`, runs the TfL
/// status extractor twice on the same process, and prints what it found.
///
/// Run with:
///   cargo run -p ttydash-client --example browser_smoke
use ttydash_client::{ChromiumDriver, TubeStatusJob};
use ttydash_core::session::{ResourceSession, SessionConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let session = ResourceSession::new(ChromiumDriver::new(None), SessionConfig::default());
    println!("Session {} created", session.id());

    for attempt in 1..=2 {
        let lines = session.with_page(&TubeStatusJob).await?;
        println!("Attempt {attempt}: {} disrupted line(s)", lines.len());
        for line in &lines {
            println!("  {:<24} {}", line.line_name, line.status_severity);
        }
    }

    anyhow::ensure!(session.is_live().await, "browser should be reused between calls");
    session.release().await;
    println!("OK, browser released");
    Ok(())
}
