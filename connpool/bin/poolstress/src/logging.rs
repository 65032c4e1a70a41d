use std::io;

use clap::{ArgAction, Args};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    prelude::*,
};

#[derive(Args, Clone, Debug)]
pub(crate) struct LoggingConfig {
    #[arg(
        long,
        short = 'v',
        action = ArgAction::Count,
        global = true,
        help = "Make logging output more verbose",
    )]
    verbose: u8,
    #[arg(
        long,
        short = 's',
        action = ArgAction::Count,
        global = true,
        help = "Make logging output less verbose",
    )]
    silent: u8,

    #[arg(long, global = true, help = "Enable colored logging output")]
    color: bool,
}

impl LoggingConfig {
    pub(crate) fn init(&self) {
        let layer = fmt::layer()
            .compact()
            .with_ansi(self.color)
            .with_line_number(self.level_filter() >= LevelFilter::DEBUG)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(io::stderr)
            .with_filter(self.env_filter());
        tracing_subscriber::registry().with(layer).init();
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.level_filter().into())
            .from_env_lossy()
    }

    fn level_filter(&self) -> LevelFilter {
        match i16::from(self.verbose) - i16::from(self.silent) {
            ..=-3 => LevelFilter::OFF,
            -2 => LevelFilter::ERROR,
            -1 => LevelFilter::WARN,
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            2.. => LevelFilter::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        logging: LoggingConfig,
    }

    #[test]
    fn level_filter() {
        for (args, expect) in [
            (&[][..], LevelFilter::INFO),
            (&["-v"][..], LevelFilter::DEBUG),
            (&["-vvvv"][..], LevelFilter::TRACE),
            (&["-s"][..], LevelFilter::WARN),
            (&["-ss"][..], LevelFilter::ERROR),
            (&["-sss"][..], LevelFilter::OFF),
            (&["-vv", "-s"][..], LevelFilter::DEBUG),
        ] {
            let cli = Cli::try_parse_from(["test"].iter().chain(args)).unwrap();
            assert_eq!(cli.logging.level_filter(), expect);
        }
    }
}
