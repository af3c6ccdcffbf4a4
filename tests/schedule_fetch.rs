// Schedule fetch against a wiremock server.

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use roomba_bridge::{
    Bridge, Command, FakeArgs, OutputFormat, ScheduleClient, ScheduleConfig, ScheduleError,
    TerminalClient, run_with_clients,
};

struct PipeTerminal;

impl TerminalClient for PipeTerminal {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

fn weekly_schedule() -> Value {
    json!({
        "cycle": ["none", "start", "start", "none", "start", "none", "none"],
        "h": [0, 9, 9, 0, 14, 0, 0],
        "m": [0, 30, 30, 0, 0, 0, 0],
    })
}

async fn schedule_server(token: &str, body: &Value) -> (MockServer, ScheduleConfig) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/roomba/schedule"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = Url::parse(&format!("{}/roomba/schedule", server.uri()))
        .expect("mock server URI should be a valid URL");
    (server, ScheduleConfig::new(endpoint, token))
}

#[tokio::test]
async fn fetch_sends_bearer_token_and_parses_json() {
    let body = weekly_schedule();
    let (_server, config) = schedule_server("t0ken", &body).await;

    let schedule = ScheduleClient::new(&config)
        .expect("client should build")
        .fetch()
        .await
        .expect("schedule should be fetched");

    assert_eq!(body, schedule);
}

#[tokio::test]
async fn unauthorised_response_is_an_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let endpoint = Url::parse(&server.uri()).expect("mock server URI should be a valid URL");
    let config = ScheduleConfig::new(endpoint, "expired");

    let result = ScheduleClient::new(&config)
        .expect("client should build")
        .fetch()
        .await;

    assert_matches!(
        result,
        Err(ScheduleError::Http(error))
            if error.status().map(|status| status.as_u16()) == Some(401)
    );
}

#[tokio::test]
async fn schedule_command_prints_the_fetched_document() -> anyhow::Result<()> {
    let body = weekly_schedule();
    let (_server, config) = schedule_server("t0ken", &body).await;
    let bridge = Bridge::fake(FakeArgs::builder().build()).with_schedule(config);
    let mut output = Vec::new();

    run_with_clients(
        Command::Schedule,
        &mut output,
        &PipeTerminal,
        bridge,
        None,
        Some(OutputFormat::Json),
    )
    .await?;

    let printed: Value = serde_json::from_slice(&output)?;
    assert_eq!(body, printed);
    Ok(())
}
