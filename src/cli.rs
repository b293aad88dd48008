//! Minimal CLI parsing for host overrides.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliOptions {
    /// Settings file, overrides `TORRENTMARK_CONFIG`
    pub config_path: Option<PathBuf>,
    /// Queue one marking pass at startup
    pub run_once: bool,
    /// Recognise this captcha image with the OCR helper and exit
    pub captcha_url: Option<String>,
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut options = CliOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--run-once" | "--once" => options.run_once = true,
                "--config" => {
                    if let Some(value) = args.next() {
                        options.config_path = Some(PathBuf::from(value));
                    }
                }
                "--captcha" => options.captcha_url = args.next(),
                _ if arg.starts_with("--config=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.config_path = Some(PathBuf::from(value));
                    }
                }
                _ => {}
            }
        }
        options
    }
}
