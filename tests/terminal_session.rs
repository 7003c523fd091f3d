use behemoth_agent::services::terminal::TerminalSession;
use std::time::Duration;

fn sh(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

async fn read_until(session: &mut TerminalSession, needle: &str) -> String {
    let mut seen = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !seen.contains(needle) {
        let chunk = tokio::time::timeout_at(deadline, session.read())
            .await
            .expect("output in time");
        match chunk {
            Some(bytes) => seen.push_str(&String::from_utf8_lossy(&bytes)),
            None => break,
        }
    }
    seen
}

#[tokio::test]
async fn write_reaches_child_and_output_comes_back() {
    let mut session =
        TerminalSession::open("/bin/sh", &sh("read line; echo got:$line"), 80, 24).expect("open");
    let written = session.write(b"hello\n").await.expect("write");
    assert_eq!(written, 6);
    let output = read_until(&mut session, "got:hello").await;
    assert!(output.contains("got:hello"), "output was {:?}", output);
}

#[tokio::test]
async fn close_twice_does_not_block() {
    let session = TerminalSession::open("/bin/sh", &sh("sleep 30"), 80, 24).expect("open");
    session.resize(120, 40).expect("resize live session");
    session.close();
    session.close();
    assert!(session.is_released());
    tokio::time::timeout(Duration::from_secs(10), session.wait_exit())
        .await
        .expect("child exits after close");
    assert!(session.has_exited());
    session.close();
}

#[tokio::test]
async fn close_after_natural_exit_is_noop() {
    let session = TerminalSession::open("/bin/sh", &sh("exit 0"), 80, 24).expect("open");
    tokio::time::timeout(Duration::from_secs(10), session.wait_exit())
        .await
        .expect("child exits");
    assert!(session.has_exited());
    assert!(session.is_released());
    assert_eq!(session.exit_code(), Some(0));
    session.close();
    session.close();
    assert!(session.write(b"late\n").await.is_err());
    assert!(session.resize(100, 30).is_err());
}

#[tokio::test]
async fn stream_ends_after_exit() {
    let mut session = TerminalSession::open("/bin/sh", &sh("echo bye"), 80, 24).expect("open");
    let output = read_until(&mut session, "bye").await;
    assert!(output.contains("bye"));
    let tail = tokio::time::timeout(Duration::from_secs(10), async {
        while session.read().await.is_some() {}
    })
    .await;
    assert!(tail.is_ok(), "read must report end of stream");
}

#[tokio::test]
async fn close_kills_a_child_that_ignores_hangup() {
    let mut session = TerminalSession::open(
        "/bin/sh",
        &sh("trap '' HUP; echo ready; while :; do sleep 1; done"),
        80,
        24,
    )
    .expect("open");
    let output = read_until(&mut session, "ready").await;
    assert!(output.contains("ready"));

    session.close();
    tokio::time::timeout(Duration::from_secs(5), session.wait_exit())
        .await
        .expect("child is killed by close");
    assert!(session.has_exited());
    assert!(session.is_released());
}
