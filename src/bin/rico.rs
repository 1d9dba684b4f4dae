//! RICO command-line assistant

use rico::capture::WakeWord;
use rico::cli::CommandLoop;
use rico::config::Config;
use rico::runtime::{AudioSource, Assistant};
use rico::voice::{ConsoleInput, ConsoleSource};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rico::logging::init(false);

    let config = Config::from_env();
    config.validate();

    // Typed lines double as speech when there is no recorder
    let input = ConsoleInput::stdin();
    let source = config
        .recorder_source()
        .unwrap_or_else(|| Arc::new(ConsoleSource::new(input.clone())) as Arc<dyn AudioSource>);
    let wiring = config.services(source)?;

    let assistant = Arc::new(Assistant::new(wiring.services, config.context));
    CommandLoop::new(assistant, input, WakeWord::new(&config.wakeword))
        .run()
        .await?;

    Ok(())
}
