//! `gifloop probe`: print what the encoder reports about a video.

use super::Runtime;
use crate::config::Config;
use crate::output::{Console, Event};
use std::path::PathBuf;

pub fn execute(config: &Config, console: &dyn Console, input: PathBuf) -> anyhow::Result<()> {
    let runtime = Runtime::start(config)?;
    let info = runtime.probe(input)?;
    console.show(Event::Info(info));
    Ok(())
}
