#[macro_use]
extern crate tracing;

#[macro_use]
extern crate eyre;

use std::{env, process::ExitCode};

use eyre::{Result, WrapErr};
use gdboard::{
    Outcome,
    core::{Config, logging},
    scan, user,
};
use gdboard_client::Client;
use gdboard_model::Progress;
use gdboard_util::CancelToken;
use tokio::{runtime::Builder as RuntimeBuilder, signal};

fn main() -> ExitCode {
    let runtime = RuntimeBuilder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Could not build runtime");

    let _ = dotenvy::dotenv();
    let _log_worker_guard = logging::init();

    match runtime.block_on(async_main()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            warn!("Scan cancelled, no snapshot published");

            ExitCode::FAILURE
        }
        Err(source) => {
            error!(?source, "Critical error in main");

            ExitCode::FAILURE
        }
    }
}

async fn async_main() -> Result<bool> {
    Config::init().wrap_err("Failed to initialize config")?;

    let config = Config::get();
    let client = Client::new(config.tokens.osu_client_id, &config.tokens.osu_client_secret);
    let cancel = CancelToken::new();

    {
        let cancel = cancel.clone();

        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(_) => {
                    info!("Received Ctrl+C, finishing up");
                    cancel.cancel();
                }
                Err(err) => error!(?err, "Failed to await Ctrl+C"),
            }
        });
    }

    let progress = |event: Progress| match serde_json::to_string(&event) {
        Ok(json) => info!(target: "gdboard::progress", "{json}"),
        Err(_) => info!(?event, "Progress"),
    };

    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None | Some("scan") => {
            let outcome = scan::global_scan(&client, &progress, &cancel).await?;

            Ok(!outcome.is_cancelled())
        }
        Some("user") => {
            let [_, input, board] = args.as_slice() else {
                bail!("Usage: gdboard user <name-or-id> <gds|hosts|nominators|mappers>");
            };

            let user = client
                .user_lookup(input)
                .await
                .wrap_err_with(|| format!("Failed to look up user `{input}`"))?;

            info!(user_id = user.id, name = %user.username, "Running {board} scan");

            let outcome = match board.as_str() {
                "gds" => user::gd_leaderboard(&client, user, &progress, &cancel).await?,
                "hosts" => user::gd_hosts_leaderboard(&client, user, &progress, &cancel).await?,
                "nominators" => user::nominator_leaderboard(&client, user, &progress, &cancel).await?,
                "mappers" => {
                    user::nominated_mappers_leaderboard(&client, user, &progress, &cancel).await?
                }
                other => bail!("Unknown board `{other}`, expected gds|hosts|nominators|mappers"),
            };

            match outcome {
                Outcome::Completed(result) => {
                    print_user_result(&result);

                    Ok(true)
                }
                Outcome::Cancelled => Ok(false),
            }
        }
        Some(other) => bail!("Unknown command `{other}`, expected scan|user"),
    }
}

fn print_user_result(result: &user::UserScanResult) {
    info!(
        user_id = result.user.id,
        name = %result.user.username,
        sets = result.total_sets,
        entries = result.entries.len(),
        "Scan finished"
    );

    for (i, entry) in result.entries.iter().enumerate() {
        info!(
            "{rank:>3}. {name} x{count} (last {date})",
            rank = i + 1,
            name = entry.username,
            count = entry.count,
            date = entry.last_date,
        );
    }
}
