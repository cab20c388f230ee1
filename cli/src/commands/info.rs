//! Info command implementation.

use clipsync_core::Config;

/// Display the configuration the relay would run with.
pub fn show_info(config: &Config) {
    println!("\n\x1b[1mClipSync Relay Config\x1b[0m");
    println!("═══════════════════════════════════════");
    println!("\x1b[1mPort:\x1b[0m                  {}", config.port);
    println!("\x1b[1mChunk size:\x1b[0m            {} bytes", config.chunk_size);
    println!(
        "\x1b[1mMax file size:\x1b[0m         {} MB",
        config.max_file_size / (1024 * 1024)
    );
    println!(
        "\x1b[1mMax transfers:\x1b[0m         {}",
        config.max_simultaneous_files
    );
    println!(
        "\x1b[1mChunk retry limit:\x1b[0m     {}",
        config.chunk_retry_limit
    );
    println!(
        "\x1b[1mFile cleanup timeout:\x1b[0m  {}s",
        config.file_cleanup_timeout.as_secs()
    );
    println!(
        "\x1b[1mPair cleanup timeout:\x1b[0m  {}s",
        config.pair_cleanup_timeout.as_secs()
    );
    println!(
        "\x1b[1mHeartbeat interval:\x1b[0m    {}s",
        config.heartbeat_interval.as_secs()
    );
    println!("\x1b[1mDebug:\x1b[0m                 {}", config.debug);
    println!();
}
