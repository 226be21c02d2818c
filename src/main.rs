use clap::Parser;

use dubflow::cli::{Cli, execute};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    dubflow_utils::logging::init_tracing(cli.verbose);

    match execute(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
