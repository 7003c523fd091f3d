mod common;
use common::{path_str, tmp_dir, write_script};

use behemoth_agent::errors::ErrorKind;
use behemoth_agent::managers::local::{LocalCliHandler, LocalCliOptions};
use behemoth_agent::services::command_executor::CommandHandler;
use behemoth_agent::services::error_codes::ErrorCodeSet;
use behemoth_agent::services::logger::Logger;
use behemoth_agent::services::plan::{Auth, Command};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::write::SimpleFileOptions;

fn command(id: &str) -> Command {
    Command {
        id: id.to_string(),
        input: format!("statement {}", id),
        ..Command::default()
    }
}

fn handler(program: &Path, cmd_file: PathBuf, codes: &[&str]) -> LocalCliHandler {
    LocalCliHandler::new(
        Logger::new("test"),
        LocalCliOptions {
            program: path_str(program),
            args: Vec::new(),
            auth: Auth {
                address: "127.0.0.1".to_string(),
                port: 3306,
                username: "root".to_string(),
                password: "s3cret-pw".to_string(),
                db_name: "inventory".to_string(),
                privileged: false,
            },
            cmd_file,
        },
        Arc::new(ErrorCodeSet::new(codes.iter().copied())),
    )
}

#[tokio::test]
async fn error_prefix_fails_even_on_clean_exit() {
    let dir = tmp_dir("behemoth-local");
    let runner = write_script(&dir, "runner", "cat \"$1\"\nexit 0");
    let cmd_file = dir.join("commands.sql");
    std::fs::write(&cmd_file, "ORA-00942: table or view does not exist\n").expect("write");

    let mut handler = handler(&runner, cmd_file, &["ORA-", "SP2-"]);
    handler.connect().await.expect("connect");

    let first = handler.submit(&command("c1")).await;
    assert!(!first.success);
    assert!(first.output.starts_with("ORA-00942"));

    let second = handler.submit(&command("c2")).await;
    assert!(!second.success);
    assert!(second.output.contains("c1"));
    handler.close().await;
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn non_zero_exit_fails_and_clean_run_succeeds() {
    let dir = tmp_dir("behemoth-local");
    let cmd_file = dir.join("commands.sh");
    std::fs::write(&cmd_file, "echo fine\n").expect("write");

    let failing = write_script(&dir, "failing", "echo boom\nexit 3");
    let mut handler_fail = handler(&failing, cmd_file.clone(), &[]);
    handler_fail.connect().await.expect("connect");
    let outcome = handler_fail.submit(&command("c1")).await;
    assert!(!outcome.success);
    assert_eq!(outcome.output, "boom");

    let passing = write_script(&dir, "passing", "sh \"$1\"");
    let mut handler_ok = handler(&passing, cmd_file, &["ORA-"]);
    handler_ok.connect().await.expect("connect");
    let first = handler_ok.submit(&command("c1")).await;
    let second = handler_ok.submit(&command("c2")).await;
    assert!(first.success);
    assert_eq!(first.output, "fine");
    assert!(second.success);
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn mysql_client_gets_password_in_env_and_banner_is_stripped() {
    let dir = tmp_dir("behemoth-local");
    let body = r#"[ "$MYSQL_PWD" = "s3cret-pw" ] || { echo "ERROR 1045 (28000): Access denied"; exit 1; }
for a in "$@"; do last="$a"; done
echo "--------------"
echo "$last"
echo "--------------"
echo
echo "last=$last"
echo
echo "Bye""#;
    let mysql = write_script(&dir, "mysql", body);
    let cmd_file = dir.join("commands.sql");
    std::fs::write(&cmd_file, "SELECT 1;\n").expect("write");

    let mut handler = handler(&mysql, cmd_file.clone(), &["ERROR "]);
    handler.connect().await.expect("connect");
    let outcome = handler.submit(&command("c1")).await;
    assert!(outcome.success, "{:?}", outcome.output);
    assert_eq!(outcome.output, format!("last=source {}", path_str(&cmd_file)));
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn zip_bundle_runs_entry_from_its_directory() {
    let dir = tmp_dir("behemoth-local");
    let archive = dir.join("bundle.zip");
    {
        let file = std::fs::File::create(&archive).expect("create zip");
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("entry.bs", SimpleFileOptions::default())
            .expect("entry");
        writer.write_all(b"scripts/main.sh\n").expect("write entry");
        writer
            .start_file("scripts/main.sh", SimpleFileOptions::default())
            .expect("main");
        writer.write_all(b"echo bundle-body\n").expect("write main");
        writer.finish().expect("finish");
    }
    let runner = write_script(&dir, "runner", "basename \"$(pwd)\"\nsh \"$1\"");

    let mut handler = handler(&runner, archive, &[]);
    handler.connect().await.expect("connect");
    let outcome = handler.submit(&command("c1")).await;
    assert!(outcome.success, "{:?}", outcome.output);
    assert_eq!(outcome.output, "scripts\nbundle-body");
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn missing_interpreter_is_a_connection_error() {
    let dir = tmp_dir("behemoth-local");
    let mut handler = handler(
        Path::new("definitely-not-an-installed-cli"),
        dir.join("commands.sql"),
        &[],
    );
    let err = handler.connect().await.err().expect("missing interpreter");
    assert_eq!(err.kind, ErrorKind::Connection);
    let _ = std::fs::remove_dir_all(dir);
}
