use anyhow::{bail, ensure, Result};
use features::Feature;
use futures::channel::mpsc::UnboundedSender;
use log::debug;
use parking_lot::Mutex;
use types::{execution::Header, primitives::ExecutionBlockHash};

use crate::{BadBlockMessage, Downloader, SyncMode};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SyncRequest {
    Sync {
        mode: SyncMode,
        head: ExecutionBlockHash,
        finalized: Option<ExecutionBlockHash>,
    },
    Extend {
        mode: SyncMode,
        head: ExecutionBlockHash,
    },
}

/// Records sync requests instead of contacting peers.
///
/// A sync stays in progress until it is retargeted. Extensions must build on the current target.
#[derive(Default)]
pub struct DevDownloader {
    target: Mutex<Option<Header>>,
    requests: Mutex<Vec<SyncRequest>>,
    bad_block_tx: Option<UnboundedSender<BadBlockMessage>>,
}

impl DevDownloader {
    #[must_use]
    pub fn new(bad_block_tx: UnboundedSender<BadBlockMessage>) -> Self {
        Self {
            bad_block_tx: Some(bad_block_tx),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn target(&self) -> Option<Header> {
        self.target.lock().clone()
    }

    /// Reports a block that failed to import while syncing towards `origin`.
    pub fn report_bad_block(&self, invalid: Header, origin: Header) {
        let Some(tx) = &self.bad_block_tx else {
            return;
        };

        if let Err(error) = tx.unbounded_send(BadBlockMessage { invalid, origin }) {
            debug!("send to bad block receiver failed because the receiver was dropped: {error:?}");
        }
    }
}

impl Downloader for DevDownloader {
    fn beacon_sync(&self, mode: SyncMode, head: &Header, finalized: Option<&Header>) -> Result<()> {
        if Feature::InjectSyncFailures.is_enabled() {
            bail!("sync towards {:?} rejected", head.hash());
        }

        self.requests.lock().push(SyncRequest::Sync {
            mode,
            head: head.hash(),
            finalized: finalized.map(Header::hash),
        });

        *self.target.lock() = Some(head.clone());

        Ok(())
    }

    fn beacon_extend(&self, mode: SyncMode, head: &Header) -> Result<()> {
        let mut target = self.target.lock();

        let Some(current) = target.as_ref() else {
            bail!("no sync in progress");
        };

        ensure!(
            current.hash() == head.parent_hash,
            "head {:?} does not extend sync target {:?}",
            head.hash(),
            current.hash(),
        );

        self.requests.lock().push(SyncRequest::Extend {
            mode,
            head: head.hash(),
        });

        *target = Some(head.clone());

        Ok(())
    }
}
