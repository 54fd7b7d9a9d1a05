use std::thread;
use tokio::sync::{mpsc, oneshot};
use anyhow::{Context, Result};
use shared::types::{AvailableRange, Entry};
use uuid::Uuid;
use super::db::EntryDb;

/// Commands sent to the store thread
pub enum StoreCommand {
    Latest(oneshot::Sender<Result<Option<Entry>>>),
    Create {
        ip: String,
        timestamp: i64,
        last_updated: i64,
        changed_after: i64,
        reply: oneshot::Sender<Result<Entry>>,
    },
    Touch {
        id: Uuid,
        timestamp: i64,
        reply: oneshot::Sender<Result<Entry>>,
    },
    AvailableRange(oneshot::Sender<Result<AvailableRange>>),
    FindInRange {
        from: Option<i64>,
        to: Option<i64>,
        reply: oneshot::Sender<Result<Vec<Entry>>>,
    },
    Shutdown,
}

/// Handle to the entry store. The SQLite connection lives on its own thread;
/// every clone talks to that thread over a command channel.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Spawn the store thread owning `db`
    pub fn spawn(db: EntryDb) -> Result<Self> {
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(256);

        thread::Builder::new()
            .name("entry-store".to_string())
            .spawn(move || {
                while let Some(cmd) = rx.blocking_recv() {
                    match cmd {
                        StoreCommand::Latest(reply) => {
                            let _ = reply.send(db.latest());
                        }
                        StoreCommand::Create { ip, timestamp, last_updated, changed_after, reply } => {
                            let result = db.create(&ip, timestamp, last_updated, changed_after);
                            let _ = reply.send(result);
                        }
                        StoreCommand::Touch { id, timestamp, reply } => {
                            let _ = reply.send(db.touch(id, timestamp));
                        }
                        StoreCommand::AvailableRange(reply) => {
                            let _ = reply.send(db.available_range());
                        }
                        StoreCommand::FindInRange { from, to, reply } => {
                            let _ = reply.send(db.find_in_range(from, to));
                        }
                        StoreCommand::Shutdown => {
                            tracing::info!("Store thread shutting down");
                            break;
                        }
                    }
                }
            })
            .context("Failed to spawn entry store thread")?;

        Ok(Self { tx })
    }

    /// Open the database at `path` and spawn its thread
    #[cfg(test)]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = EntryDb::open(path)?;
        Self::spawn(db)
    }

    /// Entry with the greatest timestamp
    pub async fn latest(&self) -> Result<Option<Entry>> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::Latest(reply)).await?;
        rx.await?
    }

    pub async fn create(
        &self,
        ip: String,
        timestamp: i64,
        last_updated: i64,
        changed_after: i64,
    ) -> Result<Entry> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::Create { ip, timestamp, last_updated, changed_after, reply })
            .await?;
        rx.await?
    }

    /// Advance `last_updated` of an existing entry
    pub async fn touch(&self, id: Uuid, timestamp: i64) -> Result<Entry> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::Touch { id, timestamp, reply }).await?;
        rx.await?
    }

    pub async fn available_range(&self) -> Result<AvailableRange> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::AvailableRange(reply)).await?;
        rx.await?
    }

    pub async fn find_in_range(&self, from: Option<i64>, to: Option<i64>) -> Result<Vec<Entry>> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::FindInRange { from, to, reply }).await?;
        rx.await?
    }

    /// Shutdown the store thread
    pub async fn shutdown(&self) -> Result<()> {
        self.send(StoreCommand::Shutdown).await
    }

    async fn send(&self, cmd: StoreCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| anyhow::anyhow!("entry store thread has stopped"))
    }
}
