use std::path::PathBuf;

use crate::daemon::{self, ServeOptions};

/// `adgen serve`: run the API server in the foreground until Ctrl+C or SIGTERM.
pub async fn cmd_serve(
    config: Option<&str>,
    data_dir: Option<&str>,
    host: Option<String>,
    port: Option<u16>,
    verbose: bool,
) -> anyhow::Result<()> {
    let opts = ServeOptions {
        config_path: config.map(PathBuf::from),
        data_dir: data_dir.map(PathBuf::from),
        host,
        port,
        verbose,
    };
    daemon::start_server(opts).await
}
