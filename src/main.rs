use clap::Parser;
use tokio_util::sync::CancellationToken;

#[cfg_attr(not(feature = "vaapi"), allow(dead_code))]
mod channel;
mod cli;
#[cfg_attr(not(feature = "vaapi"), allow(dead_code))]
mod config;
#[cfg_attr(not(feature = "vaapi"), allow(dead_code))]
mod pipe;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    // stdout may carry the stream, keep logs on stderr
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .filter_module("ffmpeg_next", log::LevelFilter::Warn)
        .filter_module("h264_bus", level)
        .target(env_logger::Target::Stderr)
        .init();
}

/// Exit status after a second interrupt, 128 + SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

/// First interrupt cancels the job. A second one while the job is still
/// blocked returns the status to exit with.
fn on_interrupt(cancel: &CancellationToken) -> Option<i32> {
    if cancel.is_cancelled() {
        log::error!("interrupted again, exiting");
        return Some(EXIT_INTERRUPTED);
    }
    log::warn!("interrupted, stopping after the current unit");
    cancel.cancel();
    None
}

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    init_logging(cli.verbose);

    let config = match config::PipeConfig::try_from(cli) {
        Ok(config) => config,
        Err(e) => {
            log::error!("invalid arguments: {}", e);
            std::process::exit(2);
        }
    };
    log::debug!("log level: {}", config.verbose());

    let cancel = CancellationToken::new();
    let job_cancel = cancel.clone();
    let mut handle = tokio::task::spawn_blocking(move || pipe::run(&config, &job_cancel));

    let result = loop {
        tokio::select! {
            result = &mut handle => break result,
            _ = tokio::signal::ctrl_c() => {
                if let Some(code) = on_interrupt(&cancel) {
                    std::process::exit(code);
                }
            },
        }
    };

    match result {
        Ok(Ok(stats)) => {
            log::info!(
                "done, pictures: {}, units: {}, bytes in: {}, bytes out: {}",
                stats.pictures,
                stats.units,
                stats.bytes_in,
                stats.bytes_out
            );
        }
        Ok(Err(e)) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
        Err(e) => {
            log::error!("pipe task failed: {}", e);
            std::process::exit(1);
        }
    }
}
