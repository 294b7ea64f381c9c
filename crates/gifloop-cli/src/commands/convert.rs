//! `gifloop convert`: turn one range of a video into a GIF.

use super::Runtime;
use crate::config::Config;
use crate::output::{Console, Event};
use anyhow::bail;
use gifloop_media::{ConvertParameters, VideoInfo};
use std::path::PathBuf;
use std::sync::Arc;

/// Command-line overrides for one conversion
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub start: f64,
    pub duration: Option<f64>,
    pub fps: Option<f64>,
    pub scale: Option<f64>,
    pub reverse: bool,
    /// `Some(None)` stamps the configured logo text
    pub logo: Option<Option<String>>,
}

impl ConvertOptions {
    /// Parameters for `info`, filling gaps from `config`.
    ///
    /// Without an explicit duration the range runs to the end of the video,
    /// capped at the configured maximum span.
    pub fn parameters(&self, config: &Config, info: &VideoInfo) -> ConvertParameters {
        let duration = self
            .duration
            .unwrap_or_else(|| (info.duration - self.start).min(config.max_span_secs));
        let mut params = ConvertParameters::new(info.path.clone(), self.start, duration);
        params.frame_rate = self.fps.unwrap_or(config.frame_rate);
        params.scale = self.scale.unwrap_or(config.scale);
        params.reverse = self.reverse;
        params.logo = self
            .logo
            .clone()
            .map(|text| text.unwrap_or_else(|| config.logo_text.clone()));
        params
    }
}

pub fn execute(
    config: &Config,
    console: Arc<dyn Console>,
    input: PathBuf,
    options: &ConvertOptions,
) -> anyhow::Result<()> {
    let runtime = Runtime::start(config)?;
    let info = runtime.probe(input)?;
    console.show(Event::Info(info.clone()));

    if options.start >= info.duration {
        bail!(
            "start {:.2}s is past the end of the video ({})",
            options.start,
            info.duration_text
        );
    }
    let params = options.parameters(config, &info);
    params.validate(config.max_span_secs)?;

    let result = runtime.convert(params, Arc::clone(&console))?;
    console.show(Event::Notice(result.message));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn info(duration: f64) -> VideoInfo {
        VideoInfo {
            path: PathBuf::from("/videos/cat.mp4"),
            duration,
            duration_text: String::new(),
            width: 640,
            height: 360,
            frame_rate: Some(25.0),
        }
    }

    #[test]
    fn test_defaults_run_to_end_capped() {
        let config = Config::default();
        let options = ConvertOptions {
            start: 2.0,
            ..ConvertOptions::default()
        };

        let params = options.parameters(&config, &info(12.0));
        assert_eq!(params.input, Path::new("/videos/cat.mp4"));
        assert_eq!(params.duration, 10.0);
        assert_eq!(params.frame_rate, config.frame_rate);
        assert_eq!(params.logo, None);

        let params = options.parameters(&config, &info(120.0));
        assert_eq!(params.duration, config.max_span_secs);
    }

    #[test]
    fn test_overrides() {
        let config = Config::default();
        let options = ConvertOptions {
            start: 1.0,
            duration: Some(3.0),
            fps: Some(20.0),
            scale: Some(0.25),
            reverse: true,
            logo: Some(None),
        };

        let params = options.parameters(&config, &info(60.0));
        assert_eq!(params.duration, 3.0);
        assert_eq!(params.frame_rate, 20.0);
        assert_eq!(params.scale, 0.25);
        assert!(params.reverse);
        assert_eq!(params.logo.as_deref(), Some("gifloop"));

        let options = ConvertOptions {
            logo: Some(Some("hello".to_string())),
            ..options
        };
        assert_eq!(
            options.parameters(&config, &info(60.0)).logo.as_deref(),
            Some("hello")
        );
    }
}
