use clap::Parser;
use insta::assert_snapshot;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl roomba_bridge::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

async fn run_with_parsed_args(args: roomba_bridge::Args) -> anyhow::Result<String> {
    let mut output = Vec::new();
    let output_format = args.output_format();
    let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
    let bridge = match maybe_fake_args {
        Some(fake_args) => roomba_bridge::Bridge::fake(fake_args),
        None => anyhow::bail!("command-line tests only run against the fake robot"),
    };
    roomba_bridge::run_with_clients(
        command,
        &mut output,
        &FakeTerminalClient,
        bridge,
        None,
        output_format,
    )
    .await?;
    Ok(String::from_utf8(output)?)
}

async fn run_with_argv<const N: usize>(argv: [&str; N]) -> anyhow::Result<String> {
    let parsed_args = roomba_bridge::Args::try_parse_from(argv)?;
    run_with_parsed_args(parsed_args).await
}

#[tokio::test(start_paused = true)]
async fn status_command_prints_json_snapshot_from_fake_robot() -> anyhow::Result<()> {
    let stdout = run_with_argv(["roomba", "--fake", "status"]).await?;

    assert_snapshot!("status_command_json", stdout.trim_end());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn status_command_pretty_output_is_a_table() -> anyhow::Result<()> {
    let fake = roomba_bridge::FakeArgs::builder()
        .phase("hmUsrDock")?
        .battery(42)?
        .build();
    let args = roomba_bridge::Args::new(roomba_bridge::Command::Status).with_fake(fake);
    let mut output = Vec::new();
    let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
    let bridge = roomba_bridge::Bridge::fake(maybe_fake_args.expect("fake args were set"));

    roomba_bridge::run_with_clients(
        command,
        &mut output,
        &FakeTerminalClient,
        bridge,
        None,
        Some(roomba_bridge::OutputFormat::Pretty),
    )
    .await?;
    let stdout = String::from_utf8(output)?;

    assert!(stdout.starts_with("Fake Roomba (Roomba)\n"));
    for expected in ["42%", "hmUsrDock", "docking"] {
        assert!(stdout.contains(expected), "missing `{expected}` in\n{stdout}");
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn on_command_starts_a_charging_robot() -> anyhow::Result<()> {
    let stdout = run_with_argv(["roomba", "--fake", "--output", "json", "on"]).await?;
    let result: Value = serde_json::from_str(&stdout)?;

    assert_eq!(json!("on"), result["action"]);
    assert_eq!(json!("started"), result["outcome"]);
    assert_eq!(json!(true), result["status"]["running"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn off_command_pauses_a_cleaning_robot_before_docking() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "roomba",
        "--fake",
        "--fake-phase",
        "run",
        "--output",
        "json",
        "off",
    ])
    .await?;
    let result: Value = serde_json::from_str(&stdout)?;

    assert_eq!(
        json!([
            "requested",
            "pausing",
            "waiting to stop (check 1)",
            "docking",
            "done"
        ]),
        result["transitions"]
    );
    assert_eq!(json!(1), result["state_queries"]);
    assert_eq!(json!(true), result["status"]["docking"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn locate_command_names_the_device() -> anyhow::Result<()> {
    let stdout = run_with_argv(["roomba", "--fake", "--output", "json", "locate"]).await?;
    let result: Value = serde_json::from_str(&stdout)?;

    assert_eq!(json!({ "action": "locate", "device": "Fake Roomba" }), result);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn watch_command_stops_at_its_limit() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "roomba",
        "--fake",
        "--fake-battery",
        "64",
        "--output",
        "json",
        "watch",
        "--limit",
        "2",
    ])
    .await?;

    let lines: Vec<Value> = stdout
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(2, lines.len());
    assert_eq!(json!(1), lines[0]["index"]);
    assert_eq!(json!(2), lines[1]["index"]);
    assert_eq!(json!(64), lines[1]["status"]["batteryLevel"]);
    Ok(())
}

#[tokio::test]
async fn schedule_command_requires_a_schedule_table() {
    let result = run_with_argv(["roomba", "--fake", "schedule"]).await;

    let error = result.expect_err("fake bridge has no schedule endpoint");
    assert!(matches!(
        error.downcast_ref::<roomba_bridge::ScheduleError>(),
        Some(roomba_bridge::ScheduleError::NotConfigured)
    ));
}

#[test]
fn unknown_subcommand_is_rejected() {
    let result = roomba_bridge::Args::try_parse_from(["roomba", "--fake", "vacuum"]);

    let error = result.expect_err("unknown subcommands should fail to parse");
    assert_eq!(clap::error::ErrorKind::InvalidSubcommand, error.kind());
}
