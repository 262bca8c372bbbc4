//! Raw database handles backed by a CLI subprocess (`sqlite3`, `psql`).
//!
//! Used for scripts the query interface cannot run (dumps, restores).
//! Lifecycle: one open, any number of serialized `do_with` calls, and an
//! idempotent `close`.

use std::io::Write;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::DbConfig;
use crate::error::SQLError;

/// A live raw connection.
pub trait RawConnection: Send {
    /// Send a script to the connection.
    fn execute(&mut self, script: &str) -> Result<(), SQLError>;

    /// Terminate the connection. Calling it twice is a no-op.
    fn close(&mut self) -> Result<(), SQLError>;
}

/// Opens raw connections for a DB config.
pub type RawOpener = Arc<dyn Fn(&DbConfig) -> Result<Box<dyn RawConnection>, SQLError> + Send + Sync>;

/// A CLI client running as a child process, fed through stdin.
pub struct CommandConnection {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    quit: &'static str,
    grace: Duration,
}

impl CommandConnection {
    /// Spawn `program args...` and keep its stdin open.
    /// `quit` is written on close before waiting for the process.
    pub fn spawn(program: &str, args: &[String], quit: &'static str) -> Result<Self, SQLError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| SQLError::Raw(format!("spawn {program}: {e}")))?;
        let stdin = child.stdin.take();
        debug!(program, "raw connection started");
        Ok(Self {
            child: Some(child),
            stdin,
            quit,
            grace: Duration::from_millis(500),
        })
    }
}

impl RawConnection for CommandConnection {
    fn execute(&mut self, script: &str) -> Result<(), SQLError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SQLError::Raw("connection closed".into()))?;
        stdin
            .write_all(script.as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(|e| SQLError::Raw(e.to_string()))
    }

    fn close(&mut self) -> Result<(), SQLError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Some(mut stdin) = self.stdin.take() {
            // The process may already be gone; the wait below still reaps it.
            let _ = stdin.write_all(self.quit.as_bytes());
        }

        let deadline = Instant::now() + self.grace;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return Ok(()),
                Ok(None) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(20)),
                Ok(None) => break,
                Err(e) => return Err(SQLError::Raw(e.to_string())),
            }
        }
        warn!("raw connection did not quit in time, killing");
        child.kill().map_err(|e| SQLError::Raw(e.to_string()))?;
        child.wait().map_err(|e| SQLError::Raw(e.to_string()))?;
        Ok(())
    }
}

impl Drop for CommandConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "closing raw connection on drop");
        }
    }
}

/// Mutex-guarded raw handle of one site database.
pub struct RawDb {
    config: DbConfig,
    opener: RawOpener,
    conn: Mutex<Option<Box<dyn RawConnection>>>,
}

impl RawDb {
    pub fn new(config: DbConfig, opener: RawOpener) -> Self {
        Self {
            config,
            opener,
            conn: Mutex::new(None),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Box<dyn RawConnection>>>, SQLError> {
        self.conn.lock().map_err(|e| SQLError::Raw(e.to_string()))
    }

    /// Open the connection. Fails if it is already open.
    pub fn open(&self) -> Result<(), SQLError> {
        let mut conn = self.lock()?;
        if conn.is_some() {
            return Err(SQLError::Raw(format!("raw DB {:?} already open", self.config.name)));
        }
        *conn = Some((self.opener)(&self.config)?);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    /// Run `f` with exclusive access to the connection, opening it first if needed.
    pub fn do_with<R>(
        &self,
        f: impl FnOnce(&mut dyn RawConnection) -> Result<R, SQLError>,
    ) -> Result<R, SQLError> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some((self.opener)(&self.config)?);
        }
        match guard.as_mut() {
            Some(conn) => f(conn.as_mut()),
            None => Err(SQLError::Raw("connection unavailable".into())),
        }
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) -> Result<(), SQLError> {
        let mut guard = self.lock()?;
        match guard.take() {
            Some(mut conn) => conn.close(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
        closed: bool,
    }

    impl RawConnection for Recorder {
        fn execute(&mut self, script: &str) -> Result<(), SQLError> {
            self.log.lock().unwrap().push(script.to_string());
            Ok(())
        }

        fn close(&mut self) -> Result<(), SQLError> {
            if !self.closed {
                self.closed = true;
                self.log.lock().unwrap().push("<close>".into());
            }
            Ok(())
        }
    }

    fn recorder_db() -> (RawDb, Arc<Mutex<Vec<String>>>, Arc<AtomicUsize>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let opens = Arc::new(AtomicUsize::new(0));
        let (l, o) = (log.clone(), opens.clone());
        let opener: RawOpener = Arc::new(move |_: &DbConfig| {
            o.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Recorder {
                log: l.clone(),
                closed: false,
            }) as Box<dyn RawConnection>)
        });
        (RawDb::new(DbConfig::sqlite("x.db"), opener), log, opens)
    }

    #[test]
    fn open_twice_fails() {
        let (db, _, _) = recorder_db();
        db.open().unwrap();
        assert!(db.open().is_err());
    }

    #[test]
    fn do_opens_lazily_once_and_close_is_idempotent() {
        let (db, log, opens) = recorder_db();
        db.do_with(|c| c.execute("select 1;")).unwrap();
        db.do_with(|c| c.execute("select 2;")).unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        db.close().unwrap();
        db.close().unwrap();
        assert!(!db.is_open());
        assert_eq!(*log.lock().unwrap(), vec!["select 1;", "select 2;", "<close>"]);
    }
}
