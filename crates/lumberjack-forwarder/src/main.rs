// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process::ExitCode, sync::Arc};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use lumberjack::{logger, FileEvent, Forwarder, ForwarderConfig, ZmqContext};

/// Source name for lines read from standard input.
const STDIN_SOURCE: &str = "-";

pub fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(run());
    // A stdin read may still be parked on a blocking thread.
    runtime.shutdown_background();
    code
}

async fn run() -> ExitCode {
    let log_level = env::var("LUMBERJACK_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .event_format(logger::Formatter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set tracing subscriber: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    let config = match ForwarderConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // One messaging context for the whole process.
    let context = Arc::new(ZmqContext::new());
    let forwarder = match Forwarder::from_config(context, &config) {
        Ok(forwarder) => forwarder,
        Err(e) => {
            error!("Unable to create forwarder: {e}");
            return ExitCode::FAILURE;
        }
    };
    let running = match forwarder.start().await {
        Ok(running) => running,
        Err(e) => {
            error!("Unable to start forwarder: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Forwarding standard input to {} servers",
        config.servers.len()
    );

    let handle = running.handle();
    let stdin = BufReader::new(tokio::io::stdin());
    let mut reader = tokio::spawn(read_lines(stdin, running.events()));

    tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown requested");
            handle.stop().await;
            reader.abort();
        }
        () = wait_for_reader(&mut reader) => {
            debug!("Standard input closed, draining");
        }
    }

    // A collector may be unreachable; a second signal abandons the drain.
    match running.finish_or_stop(shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Forwarder failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

async fn wait_for_reader(reader: &mut tokio::task::JoinHandle<()>) {
    if let Err(e) = reader.await {
        if !e.is_cancelled() {
            error!("Input reader failed: {e}");
        }
    }
}

/// Turns input into events, one per line, until end of input.
///
/// Lines that are not valid UTF-8 are forwarded with replacement characters;
/// offsets always count the raw bytes read.
async fn read_lines<R>(mut input: R, events: mpsc::Sender<FileEvent>)
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut offset: u64 = 0;
    let mut line: u64 = 0;

    loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(read) => {
                offset += read as u64;
                line += 1;
                let text = String::from_utf8_lossy(&buf);
                let text = text.trim_end_matches(['\n', '\r']);
                if events
                    .send(FileEvent::new(STDIN_SOURCE, offset, line, text))
                    .await
                    .is_err()
                {
                    debug!("Forwarder no longer accepting events");
                    break;
                }
            }
            Err(e) => {
                error!("Failed to read input: {e}");
                break;
            }
        }
    }
    debug!("Read {line} lines");
}
