mod connection;
mod logging;

use std::fs;
use std::io;
use std::panic;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use snafu::prelude::*;

use connpool::{Config, Pool};

use crate::connection::{BoxConnection, ConnectError, Connector, Stat};
use crate::logging::LoggingConfig;

#[derive(Debug, Parser)]
#[command(version, about = "Stress a connection pool with simulated connections")]
struct PoolStress {
    #[command(flatten)]
    logging: LoggingConfig,

    #[arg(long, value_name = "PATH", help = "Load pool configuration from a YAML file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Override the configured pool capacity")]
    max_count: Option<usize>,

    #[arg(long, default_value_t = 16, help = "Number of worker threads")]
    workers: usize,
    #[arg(long, default_value_t = 100, help = "Acquisitions per worker")]
    iterations: usize,
    #[arg(
        long,
        value_parser = parse_secs,
        default_value = "0.001",
        help = "Seconds each worker holds a connection",
    )]
    hold: Duration,
    #[arg(long, value_parser = parse_secs, help = "Connection time-to-live in seconds")]
    ttl: Option<Duration>,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Probability that opening a connection fails",
    )]
    failure_rate: f64,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("read config error: {}: {source}", path.display()))]
    ReadConfig { path: PathBuf, source: io::Error },
    #[snafu(display("parse config error: {source}"))]
    ParseConfig { source: serde_yaml::Error },
    #[snafu(display("pool error: {source}"))]
    Pool { source: connpool::Error },
    #[snafu(display("expect peak live connections <= {max_count}: {peak}"))]
    CapacityExceeded { peak: usize, max_count: usize },
}

fn parse_secs(secs: &str) -> Result<Duration, String> {
    let secs = secs.parse::<f64>().map_err(|error| error.to_string())?;
    Duration::try_from_secs_f64(secs).map_err(|error| error.to_string())
}

impl PoolStress {
    fn load_config(&self) -> Result<Config, Error> {
        let mut config = match &self.config {
            Some(path) => {
                let config = fs::read_to_string(path).context(ReadConfigSnafu { path })?;
                serde_yaml::from_str(&config).context(ParseConfigSnafu)?
            }
            None => Config::default(),
        };
        if let Some(max_count) = self.max_count {
            config.max_count = max_count;
        }
        Ok(config)
    }

    fn execute(&self) -> Result<(), Error> {
        let config = self.load_config()?;
        tracing::info!(?config);

        let stat = Arc::new(Stat::default());
        let mut connector = Connector::new(stat.clone(), self.ttl, self.failure_rate);
        let pool = Pool::with_config(&config, move || connector.connect()).context(PoolSnafu)?;
        tracing::info!(status = ?pool.status(), "start");

        let start = Instant::now();
        thread::scope(|scope| {
            let handles = (0..self.workers)
                .map(|_| scope.spawn(|| self.work(&pool)))
                .collect::<Vec<_>>();
            handles.into_iter().try_for_each(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| panic::resume_unwind(panic))
            })
        })
        .context(PoolSnafu)?;
        let elapsed = start.elapsed();

        let peak = stat.peak_live.load(Ordering::SeqCst);
        tracing::info!(
            ?elapsed,
            status = ?pool.status(),
            num_attempts = stat.num_attempts.load(Ordering::SeqCst),
            num_opens = stat.num_opens.load(Ordering::SeqCst),
            num_closes = stat.num_closes.load(Ordering::SeqCst),
            peak,
            "finish"
        );

        pool.shutdown();
        tracing::info!(num_closes = stat.num_closes.load(Ordering::SeqCst), "shutdown");

        ensure!(
            peak <= config.max_count,
            CapacityExceededSnafu {
                peak,
                max_count: config.max_count,
            },
        );
        Ok(())
    }

    fn work(&self, pool: &Pool<BoxConnection, ConnectError>) -> Result<(), connpool::Error> {
        for _ in 0..self.iterations {
            let guard = pool.acquire()?;
            tracing::trace!(id = guard.id());
            thread::sleep(self.hold);
        }
        Ok(())
    }
}

fn main() -> Result<(), Error> {
    let pool_stress = PoolStress::parse();
    pool_stress.logging.init();
    pool_stress.execute()
}
