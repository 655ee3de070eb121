mod dashboard;
mod panel;
mod row;
mod scheduler;

use std::rc::Rc;

use client::MetricsClient;
use data::Config;

use dashboard::{Dashboard, LogReflow, StdoutTable};

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("client error: {0}")]
    Client(#[from] client::ClientError),
    #[error("logger setup failed: {0}")]
    Log(#[from] data::log::Error),
    #[error("runtime error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> Result<(), Error> {
    setup_logger()?;

    let mut config = Config::load_or_default();
    if let Some(server) = std::env::args().nth(1) {
        config.server = server;
    }

    let client = MetricsClient::new(&config.server)?;
    let mut dashboard = Dashboard::new(client, config, Rc::new(LogReflow), Box::new(StdoutTable));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();

    runtime.block_on(local.run_until(async move { dashboard.run().await }))?;

    Ok(())
}

fn setup_logger() -> Result<(), data::log::Error> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message,
            ));
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stderr())
        .chain(data::log::file()?)
        .apply()?;

    Ok(())
}
