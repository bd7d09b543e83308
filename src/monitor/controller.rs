use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::driver::PageDriver;
use crate::push::PushClient;
use crate::settings::Settings;

use super::loop_worker::monitor_loop;

/// Owns the background monitor task: spawn on start, cancel and join on
/// stop. There is never more than one loop running.
pub struct MonitorController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl MonitorController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start(
        &mut self,
        driver: Arc<dyn PageDriver>,
        db: Database,
        push: Arc<PushClient>,
        settings: Arc<Settings>,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("monitor loop already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        let handle = tokio::spawn(monitor_loop(driver, db, push, settings, token_clone));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        info!("Monitor loop started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("monitor loop task failed to join")
                .map(|()| ())
        } else {
            Ok(())
        }
    }
}
