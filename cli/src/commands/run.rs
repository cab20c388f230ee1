//! Run command implementation.

use clipsync_core::Config;

use crate::ui::print_banner;

/// Run the relay server until interrupted.
pub async fn run_relay(config: Config) -> anyhow::Result<()> {
    print_banner();

    println!("\x1b[1mPort:\x1b[0m          {}", config.port);
    println!(
        "\x1b[1mMax file:\x1b[0m      {} MB",
        config.max_file_size / (1024 * 1024)
    );
    println!(
        "\x1b[1mMax transfers:\x1b[0m {} per pair",
        config.max_simultaneous_files
    );
    println!("\n\x1b[2mPress Ctrl+C to stop.\x1b[0m\n");

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = tx.blocking_send(());
    })?;
    let shutdown = async move {
        let _ = rx.recv().await;
    };

    clipsync_core::serve(config, shutdown).await?;

    println!("\n\x1b[1;33mShutting down...\x1b[0m");
    Ok(())
}
