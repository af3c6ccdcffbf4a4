use std::process::ExitCode;

use clap::Parser;

use roomba_bridge::{Args, Bridge, run_with_log_level};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let run_result = async {
        let log_level = args.log_level();
        let output_format = args.output_format();
        let config_path = args.config_path().map(ToOwned::to_owned);
        let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
        let bridge = match maybe_fake_args {
            Some(fake_args) => Bridge::fake(fake_args),
            None => Bridge::load(config_path.as_deref())?,
        };

        run_with_log_level(command, &mut stdout, bridge, log_level, output_format).await
    }
    .await;

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
