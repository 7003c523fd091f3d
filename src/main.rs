use behemoth_agent::app::{error_meta, App};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "behemoth_cli", about = "Runs an approved command set and reports back")]
struct Args {
    /// Base64-encoded JSON task envelope.
    #[arg(long)]
    command: String,

    /// Re-run with the task's environment overlay applied.
    #[arg(long = "with-env", alias = "with_env")]
    with_env: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let app = match App::initialize(&args.command) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("behemoth: {} {}", err, error_meta(&err));
            std::process::exit(1);
        }
    };

    let code = if args.with_env {
        match app.relaunch_with_env(&args.command).await {
            Ok(code) => code,
            Err(err) => {
                app.logger.error("Relaunch failed", Some(&error_meta(&err)));
                1
            }
        }
    } else {
        match app.run().await {
            Ok(_) => 0,
            Err(err) => {
                app.logger.error("Task aborted", Some(&error_meta(&err)));
                1
            }
        }
    };
    std::process::exit(code);
}
