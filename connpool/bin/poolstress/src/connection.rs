use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use snafu::prelude::*;

use connpool::{Expire, Resource};

pub(crate) type BoxConnection = Box<dyn Resource<Id = u64> + Send>;

#[derive(Debug, Snafu)]
#[snafu(display("simulated connect error: attempt={attempt}"))]
pub(crate) struct ConnectError {
    attempt: u64,
}

/// Counters shared by every simulated connection.
#[derive(Debug, Default)]
pub(crate) struct Stat {
    pub(crate) num_attempts: AtomicU64,
    pub(crate) num_opens: AtomicU64,
    pub(crate) num_closes: AtomicU64,
    num_live: AtomicUsize,
    pub(crate) peak_live: AtomicUsize,
}

#[derive(Debug)]
pub(crate) struct Connection {
    id: u64,
    stat: Arc<Stat>,
}

#[derive(Debug)]
pub(crate) struct Connector {
    stat: Arc<Stat>,
    ttl: Option<Duration>,
    failure_rate: f64,
}

impl Connector {
    pub(crate) fn new(stat: Arc<Stat>, ttl: Option<Duration>, failure_rate: f64) -> Self {
        Self {
            stat,
            ttl,
            failure_rate,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<BoxConnection, ConnectError> {
        let attempt = self.stat.num_attempts.fetch_add(1, Ordering::SeqCst);
        ensure!(
            rand::random::<f64>() >= self.failure_rate,
            ConnectSnafu { attempt },
        );

        let connection = Connection {
            id: self.stat.num_opens.fetch_add(1, Ordering::SeqCst),
            stat: self.stat.clone(),
        };
        let num_live = self.stat.num_live.fetch_add(1, Ordering::SeqCst) + 1;
        self.stat.peak_live.fetch_max(num_live, Ordering::SeqCst);

        let connection: BoxConnection = match self.ttl {
            Some(ttl) => Box::new(Expire::new(connection, ttl)),
            None => Box::new(connection),
        };
        Ok(connection)
    }
}

impl Resource for Connection {
    type Id = u64;

    fn close(&mut self) {
        self.stat.num_live.fetch_sub(1, Ordering::SeqCst);
        self.stat.num_closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        true
    }

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect() {
        let stat = Arc::new(Stat::default());

        let mut connector = Connector::new(stat.clone(), None, 0.0);
        let mut connection = connector.connect().unwrap();
        assert_eq!(connection.id(), 0);
        assert_eq!(connection.is_active(), true);
        assert_eq!(stat.peak_live.load(Ordering::SeqCst), 1);
        connection.close();
        assert_eq!(stat.num_closes.load(Ordering::SeqCst), 1);

        let mut connector = Connector::new(stat.clone(), Some(Duration::ZERO), 0.0);
        assert_eq!(connector.connect().unwrap().is_active(), false);

        let mut connector = Connector::new(stat.clone(), Some(Duration::MAX), 0.0);
        assert_eq!(connector.connect().unwrap().is_active(), true);

        let mut connector = Connector::new(stat.clone(), None, 1.0);
        assert!(connector.connect().is_err());
        assert_eq!(stat.num_attempts.load(Ordering::SeqCst), 4);
        assert_eq!(stat.num_opens.load(Ordering::SeqCst), 3);
    }
}
