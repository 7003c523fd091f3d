use behemoth_agent::errors::ErrorKind;
use behemoth_agent::managers::interactive::{InteractiveHandler, InteractiveOptions};
use behemoth_agent::services::command_executor::CommandHandler;
use behemoth_agent::services::logger::Logger;
use behemoth_agent::services::plan::Command;
use std::time::Duration;

const PROMPT: &str = "mysql> ";

// A tiny prompt loop: prints the marker, echoes each line back as
// `result:<line>`, and quits on `quit`.
const FAKE_SHELL: &str = r#"printf 'Welcome\n'
printf 'mysql> '
while IFS= read -r line; do
  if [ "$line" = "quit" ]; then exit 0; fi
  printf 'result:%s\n' "$line"
  printf 'mysql> '
done"#;

fn options(script: &str) -> InteractiveOptions {
    InteractiveOptions {
        program: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        prompt: PROMPT.to_string(),
        cols: 200,
        rows: 24,
    }
}

fn command(id: &str, input: &str) -> Command {
    Command {
        id: id.to_string(),
        input: input.to_string(),
        ..Command::default()
    }
}

async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(15), fut)
        .await
        .expect("finished in time")
}

#[tokio::test]
async fn submit_returns_output_without_prompt() {
    let mut handler = InteractiveHandler::new(Logger::new("test"), options(FAKE_SHELL));
    within(handler.connect()).await.expect("connect");

    let first = within(handler.submit(&command("c1", "SELECT 1"))).await;
    assert!(first.success);
    assert!(first.output.contains("result:SELECT 1"), "{:?}", first.output);
    assert!(!first.output.contains(PROMPT));

    let second = within(handler.submit(&command("c2", "SELECT 2"))).await;
    assert!(second.success);
    assert!(second.output.contains("result:SELECT 2"));
    assert!(!second.output.contains("result:SELECT 1"));
    assert!(!second.output.contains(PROMPT));

    within(handler.close()).await;
}

#[tokio::test]
async fn prompt_split_across_reads_is_detected() {
    let script = "printf 'mys'; sleep 0.3; printf 'ql> '; read -r line; printf 'done\\n'; printf 'my'; sleep 0.3; printf 'sql> '; sleep 5";
    let mut handler = InteractiveHandler::new(Logger::new("test"), options(script));
    within(handler.connect()).await.expect("connect on split prompt");

    let outcome = within(handler.submit(&command("c1", "go"))).await;
    assert!(outcome.success);
    assert!(outcome.output.contains("done"));
    assert!(!outcome.output.contains("mysql>"));
    within(handler.close()).await;
}

#[tokio::test]
async fn exit_before_prompt_is_a_connection_error() {
    let mut handler =
        InteractiveHandler::new(Logger::new("test"), options("printf 'access denied\\n'; exit 1"));
    let err = within(handler.connect()).await.err().expect("connect fails");
    assert_eq!(err.kind, ErrorKind::Connection);
    within(handler.close()).await;
}

#[tokio::test]
async fn exit_mid_command_is_a_failed_outcome() {
    let mut handler = InteractiveHandler::new(Logger::new("test"), options(FAKE_SHELL));
    within(handler.connect()).await.expect("connect");
    let outcome = within(handler.submit(&command("c1", "quit"))).await;
    assert!(!outcome.success);
    assert!(outcome.output.contains("exited before the command completed"));
    within(handler.close()).await;
}

#[tokio::test]
async fn submit_before_connect_fails() {
    let mut handler = InteractiveHandler::new(Logger::new("test"), options(FAKE_SHELL));
    let outcome = handler.submit(&command("c1", "SELECT 1")).await;
    assert!(!outcome.success);
}
