use async_trait::async_trait;
use oracle::{Connection, Connector, Privilege};

use crate::errors::AgentError;
use crate::services::command_executor::{CommandHandler, CommandOutcome};
use crate::services::logger::Logger;
use crate::services::plan::{Auth, BackendType, Command};

pub fn connect_string(auth: &Auth) -> String {
    format!("{}:{}/{}", auth.address, auth.port, auth.db_name)
}

fn map_oracle_error(err: oracle::Error) -> AgentError {
    AgentError::connection(format!("Oracle error: {}", err))
}

fn join_error(err: tokio::task::JoinError) -> AgentError {
    AgentError::internal(format!("Oracle worker failed: {}", err))
}

fn open_connection(auth: &Auth) -> Result<Connection, AgentError> {
    let mut connector = Connector::new(
        auth.username.as_str(),
        auth.password.as_str(),
        connect_string(auth),
    );
    if auth.privileged {
        connector.privilege(Privilege::Sysdba);
    }
    let conn = connector.connect().map_err(map_oracle_error)?;
    if let Err(err) = conn.ping() {
        let _ = conn.close();
        return Err(map_oracle_error(err));
    }
    Ok(conn)
}

fn execute(conn: &Connection, sql: &str) -> Result<u64, oracle::Error> {
    let stmt = conn.execute(sql, &[])?;
    let affected = stmt.row_count()?;
    conn.commit()?;
    Ok(affected)
}

/// The driver is blocking; every call runs on the blocking pool and the
/// connection is moved there and back.
pub struct OracleHandler {
    logger: Logger,
    auth: Auth,
    conn: Option<Connection>,
}

impl OracleHandler {
    pub fn new(logger: Logger, auth: Auth) -> Self {
        Self {
            logger: logger.child("oracle"),
            auth,
            conn: None,
        }
    }
}

#[async_trait]
impl CommandHandler for OracleHandler {
    fn backend(&self) -> BackendType {
        BackendType::Oracle
    }

    async fn connect(&mut self) -> Result<(), AgentError> {
        let auth = self.auth.clone();
        let conn = tokio::task::spawn_blocking(move || open_connection(&auth))
            .await
            .map_err(join_error)??;
        self.logger.debug(
            "Connected",
            Some(&serde_json::json!({
                "connect_string": connect_string(&self.auth),
                "sysdba": self.auth.privileged,
            })),
        );
        self.conn = Some(conn);
        Ok(())
    }

    async fn submit(&mut self, command: &Command) -> CommandOutcome {
        let Some(conn) = self.conn.take() else {
            return CommandOutcome::failure("Oracle connection is not open");
        };
        let sql = command.input.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let result = execute(&conn, &sql);
            (conn, result)
        })
        .await;
        match joined {
            Ok((conn, result)) => {
                self.conn = Some(conn);
                match result {
                    Ok(affected) => CommandOutcome::success(format!("Affected rows: {}", affected)),
                    Err(err) => CommandOutcome::failure(err.to_string()),
                }
            }
            Err(err) => join_error(err).into(),
        }
    }

    async fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let closed = tokio::task::spawn_blocking(move || conn.close()).await;
        if let Ok(Err(err)) = closed {
            self.logger.warn(
                "Close failed",
                Some(&serde_json::json!({"error": err.to_string()})),
            );
        }
    }
}
