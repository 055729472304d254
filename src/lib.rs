pub mod apk_list;
pub mod blob_store;
pub mod commands;
pub mod config;
pub mod document;
pub mod download;
pub mod error;
pub mod live;
pub mod models;
pub mod password;
pub mod service;
pub mod session;
pub mod store;
mod utils;


use clap::Parser;
use std::process::ExitCode;

pub use apk_list::ApkListView;
pub use error::{DecodeError, DownloadError, StoreError};
pub use service::DataAccessService;

/// CLI entry point. `RUST_LOG` overrides the default `info` level.
pub fn run() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = commands::Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(commands::dispatch(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
