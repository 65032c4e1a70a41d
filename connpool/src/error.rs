use snafu::prelude::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("expect max_count > 0: {max_count}"))]
    InvalidMaxCount { max_count: usize },
    #[snafu(display("pool was shut down"))]
    Shutdown,
    #[snafu(display("acquire timeout"))]
    Timeout,
}
