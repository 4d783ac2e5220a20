//! Connection plus a stack of open transactions.
//!
//! The first `begin_transaction` opens a real transaction; nested calls
//! open savepoints on top of it. Statements always run on the innermost
//! open transaction, or on the bare connection when none is open.

use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction, DbErr, ExecResult,
    QueryResult, Statement, StatementBuilder, TransactionTrait,
};
use tracing::debug;

pub struct Session {
    conn: DatabaseConnection,
    transactions: Vec<DatabaseTransaction>,
    connected: bool,
}

enum Executor<'a> {
    Conn(&'a DatabaseConnection),
    Txn(&'a DatabaseTransaction),
}

impl Executor<'_> {
    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        match self {
            Executor::Conn(c) => c.execute(stmt).await,
            Executor::Txn(t) => t.execute(stmt).await,
        }
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        match self {
            Executor::Conn(c) => c.execute_unprepared(sql).await,
            Executor::Txn(t) => t.execute_unprepared(sql).await,
        }
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        match self {
            Executor::Conn(c) => c.query_all(stmt).await,
            Executor::Txn(t) => t.query_all(stmt).await,
        }
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        match self {
            Executor::Conn(c) => c.query_one(stmt).await,
            Executor::Txn(t) => t.query_one(stmt).await,
        }
    }
}

impl Session {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self {
            conn,
            transactions: Vec::new(),
            connected: true,
        }
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.conn.get_database_backend()
    }

    pub fn build<S: StatementBuilder>(&self, stmt: &S) -> Statement {
        self.backend().build(stmt)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Verifies the connection after a `close`; a no-op while connected.
    pub async fn connect(&mut self) -> Result<(), DbErr> {
        if !self.connected {
            self.conn.ping().await?;
            self.connected = true;
            debug!("Session reconnected");
        }
        Ok(())
    }

    /// Rolls back whatever is still open and marks the session closed.
    ///
    /// The pool itself stays alive so in-memory databases keep their
    /// contents; the next statement reconnects.
    pub async fn close(&mut self) {
        while let Some(txn) = self.transactions.pop() {
            if let Err(e) = txn.rollback().await {
                debug!(error = %e, "rollback during close failed");
            }
        }
        self.connected = false;
        debug!("Session closed");
    }

    pub fn transaction_nesting_level(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_transaction_active(&self) -> bool {
        !self.transactions.is_empty()
    }

    pub async fn begin_transaction(&mut self) -> Result<(), DbErr> {
        self.connect().await?;
        let txn = match self.transactions.last() {
            Some(outer) => outer.begin().await?,
            None => self.conn.begin().await?,
        };
        self.transactions.push(txn);
        debug!(level = self.transactions.len(), "Transaction started");
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<(), DbErr> {
        let txn = self.pop_transaction()?;
        let level = self.transactions.len();
        txn.commit().await?;
        debug!(level, "Transaction committed");
        Ok(())
    }

    /// Rolls back the innermost transaction only.
    pub async fn rollback(&mut self) -> Result<(), DbErr> {
        let txn = self.pop_transaction()?;
        let level = self.transactions.len();
        txn.rollback().await?;
        debug!(level, "Transaction rolled back");
        Ok(())
    }

    fn pop_transaction(&mut self) -> Result<DatabaseTransaction, DbErr> {
        self.transactions
            .pop()
            .ok_or_else(|| DbErr::Custom("no active transaction".to_string()))
    }

    async fn executor(&mut self) -> Result<Executor<'_>, DbErr> {
        self.connect().await?;
        Ok(match self.transactions.last() {
            Some(txn) => Executor::Txn(txn),
            None => Executor::Conn(&self.conn),
        })
    }

    pub async fn execute(&mut self, stmt: Statement) -> Result<ExecResult, DbErr> {
        self.executor().await?.execute(stmt).await
    }

    /// Runs raw SQL without parameters.
    pub async fn execute_sql(&mut self, sql: &str) -> Result<ExecResult, DbErr> {
        self.executor().await?.execute_unprepared(sql).await
    }

    pub async fn query_all(&mut self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        self.executor().await?.query_all(stmt).await
    }

    pub async fn query_one(&mut self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        self.executor().await?.query_one(stmt).await
    }
}
