use clap::Parser;
use dev_runner::config::Command;
use dev_runner::logs::init_logging;
use dev_runner::Settings;

#[tokio::main]
async fn main() {
    let mut settings = Settings::parse();
    init_logging();

    let result = match settings.command.take() {
        Some(Command::Detect(args)) => dev_runner::launcher::run(args).await,
        None => dev_runner::run(settings).await.map(|()| 0),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
