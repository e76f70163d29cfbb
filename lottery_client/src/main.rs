use anyhow::Result;
use lottery_client::{DrawService, LotteryClient, LotteryConfig, TicketRequest};
use lottery_core::DrawEngine;
use rand::{rngs::StdRng, SeedableRng};
use std::time::Duration;
use tokio::{
    io::{stdin, AsyncBufReadExt, BufReader},
    signal,
};
use tokio_util::sync::CancellationToken;

/// Feed ticket lines from stdin into the draw service until EOF or shutdown.
async fn read_tickets(sender: async_channel::Sender<TicketRequest>, shutdown: CancellationToken) {
    let mut lines = BufReader::new(stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.cancelled() => break,
        };
        match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match line.parse::<TicketRequest>() {
                Ok(request) => {
                    if sender.send(request).await.is_err() {
                        log::info!("ticket reader stopping | service channel closed");
                        break;
                    }
                }
                Err(e) => log::warn!("skipping ticket line {:?}: {}", line, e),
            },
            Ok(None) => {
                log::info!("ticket input closed");
                break;
            }
            Err(e) => {
                log::error!("failed to read tickets: {}", e);
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = LotteryConfig::from_env()?;
    let engine = DrawEngine::new(config.prize_weights.clone())?;
    let draw_interval = config.draw_interval;
    let pool = config.pool_storage();
    log::info!(
        "lottery service for program {} at {}",
        config.program_id,
        config.rpc_url
    );

    let client = LotteryClient::from_config(config);
    if let Some(signature) = client.initialize_pool_if_missing(pool).await? {
        log::info!("pool initialized in {}", signature);
    }

    let shutdown_token = CancellationToken::new();
    let (ticket_sender, ticket_receiver) = async_channel::unbounded::<TicketRequest>();
    let reader_handle = tokio::spawn(read_tickets(ticket_sender, shutdown_token.clone()));

    let shutdown_token_signal = shutdown_token.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                log::info!("SIGINT received; starting shutdown...");
                shutdown_token_signal.cancel();
            }
            Err(err) => {
                log::error!("Unable to listen for shutdown signal: {}", err);
            }
        }
    });

    let service = DrawService::new(engine, draw_interval, StdRng::from_os_rng());
    if let Err(e) = service.run(&client, ticket_receiver, shutdown_token.clone()).await {
        log::error!("draw service error: {}", e);
    }

    shutdown_token.cancel();
    if let Err(e) = reader_handle.await {
        log::error!("ticket reader panicked: {:?}", e);
    }

    // a pending stdin read keeps the runtime from shutting down
    std::thread::spawn(|| {
        std::thread::sleep(Duration::from_secs(5));
        log::warn!("Shutdown timeout reached, forcing exit");
        std::process::exit(0);
    });
    log::info!("All tasks stopped. Exiting.");
    Ok(())
}
